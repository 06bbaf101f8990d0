//! Composition root.
//!
//! [`Orchestrator`] owns the event bus and wires one store, skill catalog,
//! spawner, and clock into the services. Every service it hands out shares
//! the same bus, so observers see each committed change exactly once.

use crate::adapters::{AgentProcessSpawner, DirectorySkillCatalog, InMemoryStore};
use crate::config::OrchestratorConfig;
use crate::error::OrchestrationResult;
use crate::events::{EventBus, EventSink, EventSubscription};
use crate::manifest::ports::SkillCatalog;
use crate::messaging::{CommandGateway, CommandResponse};
use crate::queue::services::QueueService;
use crate::session::domain::SessionId;
use crate::session::ports::ProcessSpawner;
use crate::session::services::SessionSupervisor;
use crate::store::EntityStore;
use crate::task::domain::Project;
use crate::task::ports::ProjectRepository;
use crate::task::services::TaskService;
use crate::team::services::TeamService;
use mockable::{Clock, DefaultClock};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Orchestrator over the in-memory store and real agent processes.
pub type LocalOrchestrator =
    Orchestrator<InMemoryStore, DirectorySkillCatalog, AgentProcessSpawner, DefaultClock>;

/// Owns the event bus and the services built on it.
pub struct Orchestrator<R, K, S, C>
where
    R: EntityStore,
    K: SkillCatalog,
    S: ProcessSpawner,
    C: Clock + Send + Sync,
{
    config: OrchestratorConfig,
    store: Arc<R>,
    bus: Arc<EventBus>,
    clock: Arc<C>,
    supervisor: Arc<SessionSupervisor<R, K, S, C>>,
    gateway: CommandGateway<R, K, S, C>,
    shutdown: CancellationToken,
}

impl LocalOrchestrator {
    /// Builds an orchestrator from configuration alone: an empty in-memory
    /// store, the configured skill directory, and the configured agent
    /// binary.
    #[must_use]
    pub fn from_config(config: OrchestratorConfig) -> Self {
        let skills = Arc::new(DirectorySkillCatalog::new(config.manifest.skills_dir.clone()));
        let spawner = Arc::new(AgentProcessSpawner::new(
            config.spawn.binary.clone(),
            config.spawn.args.clone(),
        ));
        Self::new(
            config,
            Arc::new(InMemoryStore::new()),
            skills,
            spawner,
            Arc::new(DefaultClock),
        )
    }
}

impl<R, K, S, C> Orchestrator<R, K, S, C>
where
    R: EntityStore,
    K: SkillCatalog,
    S: ProcessSpawner,
    C: Clock + Send + Sync,
{
    /// Wires the services around the given adapters.
    #[must_use]
    pub fn new(
        config: OrchestratorConfig,
        store: Arc<R>,
        skills: Arc<K>,
        spawner: Arc<S>,
        clock: Arc<C>,
    ) -> Self {
        let bus = Arc::new(EventBus::new(config.events.capacity));
        let supervisor = Arc::new(SessionSupervisor::new(
            Arc::clone(&store),
            skills,
            spawner,
            Arc::clone(&bus),
            Arc::clone(&clock),
            config.supervisor_settings(),
        ));
        let shutdown = CancellationToken::new();
        let gateway = CommandGateway::new(Arc::clone(&supervisor), shutdown.child_token());
        info!(
            capacity = config.events.capacity,
            manifest_dir = %config.manifest.dir.display(),
            "orchestrator ready"
        );
        Self {
            config,
            store,
            bus,
            clock,
            supervisor,
            gateway,
            shutdown,
        }
    }

    /// Active configuration.
    #[must_use]
    pub const fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Shared store.
    #[must_use]
    pub const fn store(&self) -> &Arc<R> {
        &self.store
    }

    /// Shared event bus.
    #[must_use]
    pub const fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    /// Session supervisor.
    #[must_use]
    pub const fn supervisor(&self) -> &Arc<SessionSupervisor<R, K, S, C>> {
        &self.supervisor
    }

    /// Command gateway for agent processes.
    #[must_use]
    pub const fn gateway(&self) -> &CommandGateway<R, K, S, C> {
        &self.gateway
    }

    /// Task service.
    #[must_use]
    pub fn tasks(&self) -> &TaskService<R, C> {
        self.supervisor.tasks()
    }

    /// Queue service.
    #[must_use]
    pub fn queues(&self) -> &QueueService<R, C> {
        self.supervisor.queues()
    }

    /// Team roster service.
    #[must_use]
    pub fn team(&self) -> TeamService<R, C> {
        TeamService::new(
            Arc::clone(&self.store),
            Arc::clone(&self.bus),
            Arc::clone(&self.clock),
        )
    }

    /// Subscribes to every subsequent domain event.
    #[must_use]
    pub fn subscribe(&self) -> EventSubscription {
        self.bus.subscribe()
    }

    /// Forwards every subsequent domain event to `sink`.
    pub fn attach_sink(&self, sink: Arc<dyn EventSink>) {
        self.bus.attach_sink(sink);
    }

    /// Token cancelled by [`Orchestrator::shutdown`]; long waits started
    /// through the gateway observe it.
    #[must_use]
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Registers a project.
    ///
    /// # Errors
    ///
    /// Returns `Validation` for a blank name and `Storage` when the store
    /// rejects the project.
    pub async fn create_project(
        &self,
        name: &str,
        working_dir: &str,
    ) -> OrchestrationResult<Project> {
        let project = Project::new(name, working_dir, &*self.clock)?;
        self.store.store_project(&project).await?;
        info!(project_id = %project.id(), name = %project.name(), "project created");
        Ok(project)
    }

    /// Handles one raw JSON command from an agent process.
    pub async fn handle_command(&self, session_id: SessionId, raw: &str) -> CommandResponse {
        self.gateway.handle_json(session_id, raw).await
    }

    /// Cancels pending watches and coordinator runs, then drains the bus.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        self.bus.shutdown().await;
        info!("orchestrator shut down");
    }
}
