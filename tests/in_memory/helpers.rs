//! Shared fixtures: an orchestrator over the in-memory store and the
//! recording spawner, plus a stand-in for the agent side of each worker.

use maestro::{OrchestrationResult, Orchestrator};
use maestro::adapters::{InMemoryStore, RecordingSpawner, StaticSkillCatalog};
use maestro::config::OrchestratorConfig;
use maestro::events::BusMessage;
use maestro::messaging::{AgentCommand, CommandResponse};
use maestro::session::domain::{Session, SessionId, SessionStatus};
use maestro::strategy::{AgentRole, CommandName};
use maestro::task::domain::{NewTask, Project, Task, TaskId};
use mockable::DefaultClock;
use serde_json::Value;
use std::sync::Arc;
use tokio::task::JoinHandle;

pub type TestOrchestrator =
    Orchestrator<InMemoryStore, StaticSkillCatalog, RecordingSpawner, DefaultClock>;

/// An orchestrator with one registered project.
pub struct Fixture {
    pub orchestrator: TestOrchestrator,
    pub spawner: Arc<RecordingSpawner>,
    pub project: Project,
}

impl Fixture {
    pub async fn new() -> eyre::Result<Self> {
        let mut config = OrchestratorConfig::default();
        config.manifest.write = false;
        let spawner = Arc::new(RecordingSpawner::new());
        let orchestrator = Orchestrator::new(
            config,
            Arc::new(InMemoryStore::new()),
            Arc::new(StaticSkillCatalog::default().with_skill("review", "/skills/review")),
            Arc::clone(&spawner),
            Arc::new(DefaultClock),
        );
        let project = orchestrator
            .create_project("maestro", "/work/maestro")
            .await?;
        Ok(Self {
            orchestrator,
            spawner,
            project,
        })
    }

    /// Creates a root task.
    pub async fn root(&self, title: &str) -> eyre::Result<Task> {
        Ok(self
            .orchestrator
            .tasks()
            .create(NewTask::new(self.project.id(), title))
            .await?)
    }

    /// Creates a child of `parent` depending on `dependencies`.
    pub async fn child(
        &self,
        parent: &Task,
        title: &str,
        dependencies: &[TaskId],
    ) -> eyre::Result<Task> {
        Ok(self
            .orchestrator
            .tasks()
            .create(
                NewTask::new(self.project.id(), title)
                    .with_parent(parent.id())
                    .with_dependencies(dependencies.iter().copied()),
            )
            .await?)
    }

    /// Sends one command through the gateway.
    pub async fn send(
        &self,
        session: &Session,
        command: CommandName,
        payload: Value,
    ) -> OrchestrationResult<CommandResponse> {
        self.orchestrator
            .gateway()
            .handle(session.id(), &AgentCommand::new(command).with_payload(payload))
            .await
    }

    pub async fn session(&self, id: SessionId) -> eyre::Result<Session> {
        Ok(self.orchestrator.supervisor().get(id).await?)
    }

    pub async fn task(&self, id: TaskId) -> eyre::Result<Task> {
        Ok(self.orchestrator.tasks().get(id).await?)
    }

    /// Plays every child worker: once started, it reports an error when it
    /// holds a task in `failing` and completes otherwise.
    pub fn simulate_workers(&self, failing: Vec<TaskId>) -> JoinHandle<()> {
        let supervisor = Arc::clone(self.orchestrator.supervisor());
        let mut subscription = self.orchestrator.subscribe();
        tokio::spawn(async move {
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
                let fails = session
                    .task_ids()
                    .iter()
                    .any(|task_id| failing.contains(task_id));
                let outcome = if fails {
                    supervisor.report_error(session.id(), "tests failed").await
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
