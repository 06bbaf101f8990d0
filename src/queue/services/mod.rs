//! Queue manager: the `queue:*` operations over the queue repository.

use crate::error::{EntityRef, OrchestrationError, OrchestrationResult};
use crate::events::{DomainEvent, EventBus};
use crate::queue::domain::{QueueCounts, QueueError, QueueItem, QueueState};
use crate::queue::ports::QueueRepository;
use crate::session::domain::SessionId;
use crate::session::ports::SessionRepository;
use crate::task::domain::{TaskId, TaskSessionStatus, TaskStatus};
use crate::task::ports::{AssociationRepository, ProjectRepository, TaskRepository};
use crate::task::services::TaskService;
use mockable::Clock;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Runs queue operations and mirrors them into task state.
#[derive(Clone)]
pub struct QueueService<R, C>
where
    R: QueueRepository
        + TaskRepository
        + ProjectRepository
        + AssociationRepository
        + SessionRepository,
    C: Clock + Send + Sync,
{
    repository: Arc<R>,
    tasks: TaskService<R, C>,
    bus: Arc<EventBus>,
    clock: Arc<C>,
}

impl<R, C> QueueService<R, C>
where
    R: QueueRepository
        + TaskRepository
        + ProjectRepository
        + AssociationRepository
        + SessionRepository,
    C: Clock + Send + Sync,
{
    /// Creates a queue service.
    #[must_use]
    pub fn new(repository: Arc<R>, bus: Arc<EventBus>, clock: Arc<C>) -> Self {
        Self {
            tasks: TaskService::new(Arc::clone(&repository), Arc::clone(&bus), Arc::clone(&clock)),
            repository,
            bus,
            clock,
        }
    }

    /// Creates the queue for a session, holding `task_ids` in order.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for a missing task and `StateConflict` when the
    /// session already has a queue.
    pub async fn create(
        &self,
        session_id: SessionId,
        task_ids: &[TaskId],
    ) -> OrchestrationResult<QueueState> {
        self.tasks.get_many(task_ids).await?;
        let queue = QueueState::new(session_id, task_ids.iter().copied(), &*self.clock);
        self.repository.create_queue(&queue).await?;
        for item in queue.items() {
            self.tasks
                .record_activity(item.task_id, None, TaskSessionStatus::Queued)
                .await?;
        }
        info!(session_id = %session_id, items = queue.items().len(), "queue created");
        self.publish(&queue);
        Ok(queue)
    }

    /// Returns the queue for a session.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` when the session has no queue.
    pub async fn get(&self, session_id: SessionId) -> OrchestrationResult<QueueState> {
        self.repository
            .find_queue(session_id)
            .await?
            .ok_or_else(|| OrchestrationError::not_found(EntityRef::queue(session_id)))
    }

    /// Peeks at the next queued item without changing anything.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` when the session has no queue.
    pub async fn top(&self, session_id: SessionId) -> OrchestrationResult<Option<QueueItem>> {
        Ok(self.get(session_id).await?.top().cloned())
    }

    /// Claims the next queued item and moves its task to `in_progress`.
    ///
    /// # Errors
    ///
    /// Returns `StateConflict` when the queue is empty, an item is already
    /// processing, the task cannot start, or a concurrent claim won.
    pub async fn start(&self, session_id: SessionId) -> OrchestrationResult<QueueItem> {
        let mut queue = self.get(session_id).await?;
        let item = queue.start(&*self.clock)?.clone();
        let task = self.tasks.get(item.task_id).await?;
        if task.status() != TaskStatus::InProgress
            && !task.status().can_transition_to(TaskStatus::InProgress)
        {
            return Err(OrchestrationError::state_conflict(format!(
                "task {} is {} and cannot be started",
                task.id(),
                task.status()
            ))
            .with_entity(EntityRef::task(task.id())));
        }
        self.commit(&queue).await?;
        self.tasks
            .record_activity(
                item.task_id,
                Some(TaskStatus::InProgress),
                TaskSessionStatus::Working,
            )
            .await?;
        info!(session_id = %session_id, task_id = %item.task_id, "queue item claimed");
        Ok(item)
    }

    /// Closes the processing item as completed and completes its task.
    ///
    /// # Errors
    ///
    /// Returns `StateConflict` when nothing is processing or the task still
    /// has open descendants.
    pub async fn complete(&self, session_id: SessionId) -> OrchestrationResult<QueueItem> {
        let mut queue = self.get(session_id).await?;
        let task_id = queue
            .processing()
            .map(|item| item.task_id)
            .ok_or(QueueError::NoActiveItem(session_id))?;
        let task = self.tasks.get(task_id).await?;
        self.tasks.ensure_completable(&task).await?;
        let item = queue.complete(&*self.clock)?.clone();
        self.commit(&queue).await?;
        self.tasks
            .record_activity(
                task_id,
                Some(TaskStatus::Completed),
                TaskSessionStatus::Completed,
            )
            .await?;
        info!(session_id = %session_id, task_id = %task_id, "queue item completed");
        Ok(item)
    }

    /// Closes the processing item as failed. Nothing is retried.
    ///
    /// # Errors
    ///
    /// Returns `StateConflict` when nothing is processing.
    pub async fn fail(&self, session_id: SessionId, reason: &str) -> OrchestrationResult<QueueItem> {
        let mut queue = self.get(session_id).await?;
        let item = queue.fail(reason, &*self.clock)?.clone();
        self.commit(&queue).await?;
        self.tasks
            .record_activity(item.task_id, None, TaskSessionStatus::Failed)
            .await?;
        warn!(session_id = %session_id, task_id = %item.task_id, reason, "queue item failed");
        Ok(item)
    }

    /// Skips the processing item, or the next queued one.
    ///
    /// # Errors
    ///
    /// Returns `StateConflict` when nothing is left to skip.
    pub async fn skip(&self, session_id: SessionId) -> OrchestrationResult<QueueItem> {
        let mut queue = self.get(session_id).await?;
        let item = queue.skip(&*self.clock)?.clone();
        self.commit(&queue).await?;
        self.tasks
            .record_activity(item.task_id, None, TaskSessionStatus::Skipped)
            .await?;
        debug!(session_id = %session_id, task_id = %item.task_id, "queue item skipped");
        Ok(item)
    }

    /// Appends a task to the queue.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for a missing task and `StateConflict` when the
    /// task is already queued or processing.
    pub async fn push(
        &self,
        session_id: SessionId,
        task_id: TaskId,
    ) -> OrchestrationResult<QueueItem> {
        self.tasks.get(task_id).await?;
        let mut queue = self.get(session_id).await?;
        let item = queue.push(task_id, &*self.clock)?.clone();
        self.commit(&queue).await?;
        self.tasks.link(task_id, session_id).await?;
        self.tasks
            .record_activity(task_id, None, TaskSessionStatus::Queued)
            .await?;
        debug!(session_id = %session_id, task_id = %task_id, "queue item pushed");
        Ok(item)
    }

    /// Returns aggregate counts.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` when the session has no queue.
    pub async fn status(&self, session_id: SessionId) -> OrchestrationResult<QueueCounts> {
        Ok(self.get(session_id).await?.counts())
    }

    async fn commit(&self, queue: &QueueState) -> OrchestrationResult<QueueState> {
        let stored = self.repository.update_queue(queue).await?;
        self.publish(&stored);
        Ok(stored)
    }

    fn publish(&self, queue: &QueueState) {
        self.bus.publish(
            DomainEvent::QueueUpdated(Box::new(queue.clone())),
            self.clock.utc(),
        );
    }
}
