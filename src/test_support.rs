//! Shared fixtures for unit tests.

use crate::adapters::{InMemoryStore, RecordingSpawner, StaticSkillCatalog};
use crate::events::{BusMessage, EventBus};
use crate::queue::services::QueueService;
use crate::session::domain::SessionStatus;
use crate::session::services::{SessionSupervisor, SupervisorSettings};
use crate::strategy::AgentRole;
use crate::task::domain::{NewTask, Project, Task, TaskId};
use crate::task::ports::{ProjectRepository, TaskRepository};
use crate::task::services::TaskService;
use crate::team::services::TeamService;
use mockable::DefaultClock;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Supervisor over the in-memory store and the recording spawner.
pub type TestSupervisor =
    SessionSupervisor<InMemoryStore, StaticSkillCatalog, RecordingSpawner, DefaultClock>;

/// Store, bus, and clock around one project.
pub struct Harness {
    pub store: Arc<InMemoryStore>,
    pub bus: Arc<EventBus>,
    pub clock: Arc<DefaultClock>,
    pub spawner: Arc<RecordingSpawner>,
    pub skills: Arc<StaticSkillCatalog>,
    pub project: Project,
}

impl Harness {
    pub async fn new() -> eyre::Result<Self> {
        let store = Arc::new(InMemoryStore::new());
        let project = Project::new("maestro", "/work/maestro", &DefaultClock)?
            .with_description("Agent orchestration");
        store.store_project(&project).await?;
        Ok(Self {
            store,
            bus: Arc::new(EventBus::new(256)),
            clock: Arc::new(DefaultClock),
            spawner: Arc::new(RecordingSpawner::new()),
            skills: Arc::new(StaticSkillCatalog::default().with_skill("review", "/skills/review")),
            project,
        })
    }

    /// Stores a task built from `request`.
    pub async fn store_task(&self, request: NewTask) -> eyre::Result<Task> {
        let task = Task::new(request, &*self.clock)?;
        self.store.store(&task).await?;
        Ok(task)
    }

    /// Stores a root task with the given title.
    pub async fn root(&self, title: &str) -> eyre::Result<Task> {
        self.store_task(NewTask::new(self.project.id(), title)).await
    }

    /// Stores a child of `parent`.
    pub async fn child(&self, parent: &Task, title: &str) -> eyre::Result<Task> {
        self.store_task(NewTask::new(self.project.id(), title).with_parent(parent.id()))
            .await
    }

    /// Task service over the harness store.
    pub fn tasks(&self) -> TaskService<InMemoryStore, DefaultClock> {
        TaskService::new(
            Arc::clone(&self.store),
            Arc::clone(&self.bus),
            Arc::clone(&self.clock),
        )
    }

    /// Queue service over the harness store.
    pub fn queues(&self) -> QueueService<InMemoryStore, DefaultClock> {
        QueueService::new(
            Arc::clone(&self.store),
            Arc::clone(&self.bus),
            Arc::clone(&self.clock),
        )
    }

    /// Team roster service over the harness store.
    pub fn team(&self) -> TeamService<InMemoryStore, DefaultClock> {
        TeamService::new(
            Arc::clone(&self.store),
            Arc::clone(&self.bus),
            Arc::clone(&self.clock),
        )
    }

    /// Session supervisor that keeps manifests in the store only.
    pub fn supervisor(&self) -> TestSupervisor {
        SessionSupervisor::new(
            Arc::clone(&self.store),
            Arc::clone(&self.skills),
            Arc::clone(&self.spawner),
            Arc::clone(&self.bus),
            Arc::clone(&self.clock),
            SupervisorSettings {
                write_manifests: false,
                ..SupervisorSettings::default()
            },
        )
    }

    /// Plays the agent side of every child worker: once its process is
    /// started, the worker reports an error if it holds one of `failing`
    /// and completes otherwise. Each task in `failing` fails once.
    pub fn simulate_workers(&self, failing: Vec<TaskId>) -> JoinHandle<()> {
        let supervisor = self.supervisor();
        let mut subscription = self.bus.subscribe();
        tokio::spawn(async move {
            let mut remaining = failing;
            while let Some(message) = subscription.next().await {
                let BusMessage::Event(envelope) = message else {
                    continue;
                };
                let Some(session) = envelope.event.session() else {
                    continue;
                };
                if session.role() != AgentRole::Worker
                    || session.status() != SessionStatus::Idle
                    || session.parent_session_id().is_none()
                {
                    continue;
                }
                let before = remaining.len();
                remaining.retain(|task_id| !session.task_ids().contains(task_id));
                let outcome = if remaining.len() < before {
                    supervisor.report_error(session.id(), "simulated failure").await
                } else {
                    supervisor.report_complete(session.id(), "done").await
                };
                if let Err(error) = outcome {
                    tracing::warn!(error = %error, "simulated worker report failed");
                }
            }
        })
    }
}
