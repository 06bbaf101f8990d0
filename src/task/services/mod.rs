//! Task service: the only path through which tasks change.
//!
//! Per-task rules live on [`Task`]; this service adds the checks that need
//! the whole project forest (parent completion, parent cycles, dependency
//! cycles) and publishes a domain event after every successful write.

use crate::error::{EntityRef, OrchestrationError, OrchestrationResult};
use crate::events::{DomainEvent, EventBus};
use crate::session::domain::SessionId;
use crate::session::ports::SessionRepository;
use crate::strategy::DependencyGraph;
use crate::task::domain::{
    ChildOutcome, ChildVerification, NewTask, ProjectId, Task, TaskForest, TaskId, TaskPatch,
    TaskSessionStatus, TaskStatus, VerificationReport,
};
use crate::task::ports::{
    AssociationChange, AssociationRepository, ProjectRepository, TaskRepository,
};
use mockable::Clock;
use std::sync::Arc;
use tracing::{debug, info};

/// Creates, queries, and mutates tasks.
#[derive(Clone)]
pub struct TaskService<R, C>
where
    R: TaskRepository + ProjectRepository + AssociationRepository + SessionRepository,
    C: Clock + Send + Sync,
{
    repository: Arc<R>,
    bus: Arc<EventBus>,
    clock: Arc<C>,
}

impl<R, C> TaskService<R, C>
where
    R: TaskRepository + ProjectRepository + AssociationRepository + SessionRepository,
    C: Clock + Send + Sync,
{
    /// Creates a task service.
    #[must_use]
    pub const fn new(repository: Arc<R>, bus: Arc<EventBus>, clock: Arc<C>) -> Self {
        Self {
            repository,
            bus,
            clock,
        }
    }

    /// Creates a task.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` when the project, parent, or a dependency is
    /// missing and `Validation` when any of them lives in another project or
    /// the title is blank.
    pub async fn create(&self, request: NewTask) -> OrchestrationResult<Task> {
        if self
            .repository
            .find_project(request.project_id)
            .await?
            .is_none()
        {
            return Err(OrchestrationError::not_found(EntityRef::project(
                request.project_id,
            )));
        }
        if let Some(parent_id) = request.parent_id {
            let parent = self.get(parent_id).await?;
            ensure_same_project(&parent, request.project_id)?;
            let forest = self.forest(request.project_id).await?;
            ensure_open_lineage(&forest, parent_id, "a new task cannot be added")?;
        }
        self.ensure_dependencies(request.project_id, &request.dependencies)
            .await?;
        let task = Task::new(request, &*self.clock)?;
        self.repository.store(&task).await?;
        info!(task_id = %task.id(), project_id = %task.project_id(), "task created");
        self.publish(DomainEvent::TaskCreated(Box::new(task.clone())));
        Ok(task)
    }

    /// Fetches one task.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` when the task does not exist.
    pub async fn get(&self, id: TaskId) -> OrchestrationResult<Task> {
        self.repository
            .find_by_id(id)
            .await?
            .ok_or_else(|| OrchestrationError::not_found(EntityRef::task(id)))
    }

    /// Fetches several tasks, failing on the first missing one.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` naming the first missing task.
    pub async fn get_many(&self, ids: &[TaskId]) -> OrchestrationResult<Vec<Task>> {
        let found = self.repository.find_many(ids).await?;
        if let Some(missing) = ids
            .iter()
            .find(|id| !found.iter().any(|task| task.id() == **id))
        {
            return Err(OrchestrationError::not_found(EntityRef::task(missing)));
        }
        Ok(found)
    }

    /// Lists a project's tasks in creation order.
    ///
    /// # Errors
    ///
    /// Returns a storage error when the repository fails.
    pub async fn list(&self, project_id: ProjectId) -> OrchestrationResult<Vec<Task>> {
        Ok(self.repository.list_by_project(project_id).await?)
    }

    /// Lists the direct children of a task.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` when the task does not exist.
    pub async fn children(&self, id: TaskId) -> OrchestrationResult<Vec<Task>> {
        self.get(id).await?;
        Ok(self.repository.find_children(id).await?)
    }

    /// Builds the forest index for a project.
    ///
    /// # Errors
    ///
    /// Returns a storage error when the repository fails.
    pub async fn forest(&self, project_id: ProjectId) -> OrchestrationResult<TaskForest> {
        Ok(TaskForest::new(self.list(project_id).await?))
    }

    /// Returns the subtree rooted at `id` as `(depth, task)` pairs in
    /// depth-first order, the root first.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` when the task does not exist.
    pub async fn subtree(&self, id: TaskId) -> OrchestrationResult<Vec<(usize, Task)>> {
        let root = self.get(id).await?;
        let forest = self.forest(root.project_id()).await?;
        Ok(forest
            .walk(id)
            .into_iter()
            .map(|(depth, task)| (depth, task.clone()))
            .collect())
    }

    /// Applies field changes.
    ///
    /// # Errors
    ///
    /// Returns `NotFound`, `Validation` for a blank title, or
    /// `StateConflict` on a concurrent change.
    pub async fn update(&self, id: TaskId, patch: TaskPatch) -> OrchestrationResult<Task> {
        let mut task = self.get(id).await?;
        task.apply(patch, &*self.clock)?;
        self.commit(&task).await
    }

    /// Moves a task under another parent, or to the top level.
    ///
    /// # Errors
    ///
    /// Returns `Validation` when the move would make the task its own
    /// ancestor or crosses projects.
    pub async fn reparent(
        &self,
        id: TaskId,
        parent_id: Option<TaskId>,
    ) -> OrchestrationResult<Task> {
        let mut task = self.get(id).await?;
        if let Some(new_parent) = parent_id {
            let parent = self.get(new_parent).await?;
            ensure_same_project(&parent, task.project_id())?;
            let forest = self.forest(task.project_id()).await?;
            if forest.would_create_parent_cycle(id, new_parent) {
                return Err(OrchestrationError::validation(format!(
                    "moving task {id} under {new_parent} would create a cycle"
                ))
                .with_entity(EntityRef::task(id)));
            }
            if !task.is_terminal() || !forest.open_descendants(id).is_empty() {
                ensure_open_lineage(&forest, new_parent, &format!("open task {id} cannot move"))?;
            }
        }
        task.reparent(parent_id, &*self.clock)?;
        self.commit(&task).await
    }

    /// Replaces a task's dependency edges.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for a missing dependency, `Validation` for a
    /// self-dependency or one in another project, and `StateConflict` when
    /// the new edges close a cycle.
    pub async fn set_dependencies(
        &self,
        id: TaskId,
        dependencies: Vec<TaskId>,
    ) -> OrchestrationResult<Task> {
        let mut task = self.get(id).await?;
        task.replace_dependencies(dependencies, &*self.clock)?;
        self.ensure_dependencies(task.project_id(), task.dependencies())
            .await?;
        let mut project_tasks = self.list(task.project_id()).await?;
        for existing in &mut project_tasks {
            if existing.id() == id {
                existing.clone_from(&task);
            }
        }
        DependencyGraph::build_scoped(&project_tasks)?;
        self.commit(&task).await
    }

    /// Changes a task's lifecycle status.
    ///
    /// # Errors
    ///
    /// Returns `StateConflict` when the state machine forbids the change or
    /// when completing a task whose descendants are still open.
    pub async fn set_status(&self, id: TaskId, status: TaskStatus) -> OrchestrationResult<Task> {
        let mut task = self.get(id).await?;
        self.ensure_status_change(&task, status).await?;
        task.transition_to(status, &*self.clock)?;
        let stored = self.commit(&task).await?;
        info!(task_id = %id, status = %status, "task status changed");
        Ok(stored)
    }

    /// Records session activity against a task, optionally moving its status.
    ///
    /// Staying in the current status is not an error.
    ///
    /// # Errors
    ///
    /// Returns `StateConflict` under the same rules as
    /// [`TaskService::set_status`].
    pub async fn record_activity(
        &self,
        id: TaskId,
        status: Option<TaskStatus>,
        session_status: TaskSessionStatus,
    ) -> OrchestrationResult<Task> {
        let mut task = self.get(id).await?;
        if let Some(target) = status.filter(|target| *target != task.status()) {
            self.ensure_status_change(&task, target).await?;
            task.transition_to(target, &*self.clock)?;
        }
        task.record_session_status(session_status, &*self.clock);
        debug!(task_id = %id, session_status = %session_status, "task activity recorded");
        self.commit(&task).await
    }

    /// Fails unless every descendant of `task` is terminal.
    ///
    /// # Errors
    ///
    /// Returns `StateConflict` naming the task and its open descendant count.
    pub async fn ensure_completable(&self, task: &Task) -> OrchestrationResult<()> {
        let forest = self.forest(task.project_id()).await?;
        let open = forest.open_descendants(task.id()).len();
        if open > 0 {
            return Err(OrchestrationError::state_conflict(format!(
                "task {} cannot complete: {open} descendant(s) still open",
                task.id()
            ))
            .with_entity(EntityRef::task(task.id())));
        }
        Ok(())
    }

    /// Deletes a task that has no children and no dependents. Finished
    /// sessions are unlinked first; a live session keeps the task.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` or `StateConflict` when other tasks still refer to
    /// it or a linked session has not finished.
    pub async fn delete(&self, id: TaskId) -> OrchestrationResult<Task> {
        let task = self.get(id).await?;
        let project_tasks = self.list(task.project_id()).await?;
        if let Some(other) = project_tasks
            .iter()
            .find(|other| other.parent_id() == Some(id) || other.dependencies().contains(&id))
        {
            return Err(OrchestrationError::state_conflict(format!(
                "task {id} is still referenced by task {}",
                other.id()
            ))
            .with_entity(EntityRef::task(id)));
        }
        let sessions = self.repository.find_sessions(task.session_ids()).await?;
        if let Some(live) = sessions.iter().find(|session| !session.is_terminal()) {
            return Err(OrchestrationError::state_conflict(format!(
                "task {id} is still held by {} session {}",
                live.status(),
                live.id()
            ))
            .with_entity(EntityRef::task(id)));
        }
        for session in &sessions {
            let change = self.unlink(id, session.id()).await?;
            if change.changed {
                self.publish(DomainEvent::SessionUpdated(Box::new(change.session)));
            }
        }
        let deleted = self.repository.delete(id).await?;
        info!(task_id = %id, "task deleted");
        self.publish(DomainEvent::TaskDeleted {
            task_id: id,
            project_id: deleted.project_id(),
        });
        Ok(deleted)
    }

    /// Reports the outcome of every direct child of `id`.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` when the task does not exist.
    pub async fn verify(&self, id: TaskId) -> OrchestrationResult<VerificationReport> {
        let task = self.get(id).await?;
        let forest = self.forest(task.project_id()).await?;
        let children = forest
            .children(id)
            .into_iter()
            .map(|child| ChildVerification {
                task_id: child.id(),
                title: child.title().to_owned(),
                status: child.status(),
                outcome: ChildOutcome::of(child),
            })
            .collect();
        Ok(VerificationReport {
            task_id: id,
            status: task.status(),
            children,
            open_descendants: forest.open_descendants(id).len(),
        })
    }

    /// Links a task and a session.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` when either side is missing and `Validation` when
    /// they belong to different projects.
    pub async fn link(
        &self,
        task_id: TaskId,
        session_id: SessionId,
    ) -> OrchestrationResult<AssociationChange> {
        let change = self.repository.link(task_id, session_id).await?;
        if change.changed {
            self.publish(DomainEvent::TaskSessionLinked {
                task_id,
                session_id,
            });
        }
        Ok(change)
    }

    /// Unlinks a task and a session.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` when either side is missing.
    pub async fn unlink(
        &self,
        task_id: TaskId,
        session_id: SessionId,
    ) -> OrchestrationResult<AssociationChange> {
        let change = self.repository.unlink(task_id, session_id).await?;
        if change.changed {
            self.publish(DomainEvent::TaskSessionUnlinked {
                task_id,
                session_id,
            });
        }
        Ok(change)
    }

    /// Completing needs every descendant terminal; reopening needs every
    /// ancestor open.
    async fn ensure_status_change(&self, task: &Task, target: TaskStatus) -> OrchestrationResult<()> {
        if target == TaskStatus::Completed {
            return self.ensure_completable(task).await;
        }
        if let Some(parent_id) = task.parent_id().filter(|_| task.is_terminal() && !target.is_terminal()) {
            let forest = self.forest(task.project_id()).await?;
            ensure_open_lineage(&forest, parent_id, &format!("task {} cannot reopen", task.id()))?;
        }
        Ok(())
    }

    async fn ensure_dependencies(
        &self,
        project_id: ProjectId,
        dependencies: &[TaskId],
    ) -> OrchestrationResult<()> {
        for dependency in self.get_many(dependencies).await? {
            ensure_same_project(&dependency, project_id)?;
        }
        Ok(())
    }

    async fn commit(&self, task: &Task) -> OrchestrationResult<Task> {
        let stored = self.repository.update(task).await?;
        self.publish(DomainEvent::TaskUpdated(Box::new(stored.clone())));
        Ok(stored)
    }

    fn publish(&self, event: DomainEvent) {
        self.bus.publish(event, self.clock.utc());
    }
}

fn ensure_open_lineage(forest: &TaskForest, start: TaskId, action: &str) -> OrchestrationResult<()> {
    let Some(completed) = forest.completed_lineage(start) else {
        return Ok(());
    };
    Err(OrchestrationError::state_conflict(format!(
        "{action} under completed task {}",
        completed.id()
    ))
    .with_entity(EntityRef::task(completed.id())))
}

fn ensure_same_project(task: &Task, project_id: ProjectId) -> OrchestrationResult<()> {
    if task.project_id() == project_id {
        return Ok(());
    }
    Err(OrchestrationError::validation(format!(
        "task {} belongs to another project",
        task.id()
    ))
    .with_entity(EntityRef::task(task.id())))
}
