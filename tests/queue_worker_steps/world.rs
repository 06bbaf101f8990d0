//! Shared world state for queue worker BDD scenarios.

use std::collections::BTreeMap;
use std::sync::Arc;

use maestro::adapters::{InMemoryStore, RecordingSpawner, StaticSkillCatalog};
use maestro::config::OrchestratorConfig;
use maestro::messaging::{AgentCommand, CommandResponse};
use maestro::session::domain::Session;
use maestro::strategy::CommandName;
use maestro::task::domain::{Project, Task};
use maestro::{OrchestrationResult, Orchestrator};
use mockable::DefaultClock;
use rstest::fixture;
use serde_json::Value;

/// Orchestrator type used by the BDD world.
pub type TestOrchestrator =
    Orchestrator<InMemoryStore, StaticSkillCatalog, RecordingSpawner, DefaultClock>;

/// Scenario world for queue worker behaviour tests.
pub struct QueueWorld {
    /// Orchestrator under test.
    pub orchestrator: TestOrchestrator,
    /// Scenario project.
    pub project: Option<Project>,
    /// Tasks keyed by title.
    pub tasks: BTreeMap<String, Task>,
    /// Queue worker session.
    pub session: Option<Session>,
    /// Outcome of the most recent command.
    pub last_result: Option<OrchestrationResult<CommandResponse>>,
}

impl QueueWorld {
    /// Creates a world over an empty store.
    #[must_use]
    pub fn new() -> Self {
        let mut config = OrchestratorConfig::default();
        config.manifest.write = false;
        let orchestrator = Orchestrator::new(
            config,
            Arc::new(InMemoryStore::new()),
            Arc::new(StaticSkillCatalog::default()),
            Arc::new(RecordingSpawner::new()),
            Arc::new(DefaultClock),
        );
        Self {
            orchestrator,
            project: None,
            tasks: BTreeMap::new(),
            session: None,
            last_result: None,
        }
    }

    /// Returns the task created under `title`.
    pub fn task(&self, title: &str) -> Result<&Task, eyre::Report> {
        self.tasks
            .get(title)
            .ok_or_else(|| eyre::eyre!("no task titled {title} in scenario world"))
    }

    /// Returns the worker session.
    pub fn session(&self) -> Result<&Session, eyre::Report> {
        self.session
            .as_ref()
            .ok_or_else(|| eyre::eyre!("missing worker session in scenario world"))
    }

    /// Sends one command as the worker and records the outcome.
    pub fn send(&mut self, command: CommandName, payload: Value) -> Result<(), eyre::Report> {
        let session_id = self.session()?.id();
        let result = run_async(
            self.orchestrator
                .gateway()
                .handle(session_id, &AgentCommand::new(command).with_payload(payload)),
        );
        self.last_result = Some(result);
        Ok(())
    }

    /// Fails unless the last command succeeded.
    pub fn expect_success(&self) -> Result<&CommandResponse, eyre::Report> {
        match self.last_result.as_ref() {
            Some(Ok(response)) => Ok(response),
            Some(Err(error)) => Err(eyre::eyre!("last command failed: {error}")),
            None => Err(eyre::eyre!("no command sent yet")),
        }
    }
}

impl Default for QueueWorld {
    fn default() -> Self {
        Self::new()
    }
}

/// Fixture that creates a new scenario world.
#[fixture]
pub fn world() -> QueueWorld {
    QueueWorld::default()
}

/// Runs an async operation within sync step definitions.
pub fn run_async<T>(future: impl std::future::Future<Output = T>) -> T {
    tokio::task::block_in_place(|| tokio::runtime::Handle::current().block_on(future))
}
