//! Coordinator runs: the engine spawns workers through the supervisor.

use super::SessionSupervisor;
use crate::error::{EntityRef, OrchestrationError, OrchestrationResult};
use crate::manifest::domain::ManifestRequest;
use crate::manifest::ports::SkillCatalog;
use crate::session::domain::{Session, SessionDomainError, SessionId, WatchOutcome};
use crate::session::ports::ProcessSpawner;
use crate::store::EntityStore;
use crate::strategy::{
    AgentRole, CoordinatorEngine, OrchestrationReport, Strategy, WorkerLauncher,
};
use crate::task::domain::{Task, TaskId};
use async_trait::async_trait;
use mockable::Clock;
use std::collections::BTreeSet;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// [`WorkerLauncher`] that spawns worker sessions as children of one
/// coordinator.
pub struct SupervisorLauncher<'a, R, K, S, C>
where
    R: EntityStore,
    K: SkillCatalog,
    S: ProcessSpawner,
    C: Clock + Send + Sync,
{
    supervisor: &'a SessionSupervisor<R, K, S, C>,
    coordinator: Session,
}

impl<'a, R, K, S, C> SupervisorLauncher<'a, R, K, S, C>
where
    R: EntityStore,
    K: SkillCatalog,
    S: ProcessSpawner,
    C: Clock + Send + Sync,
{
    /// Creates a launcher for `coordinator`.
    #[must_use]
    pub const fn new(supervisor: &'a SessionSupervisor<R, K, S, C>, coordinator: Session) -> Self {
        Self {
            supervisor,
            coordinator,
        }
    }
}

#[async_trait]
impl<R, K, S, C> WorkerLauncher for SupervisorLauncher<'_, R, K, S, C>
where
    R: EntityStore,
    K: SkillCatalog,
    S: ProcessSpawner,
    C: Clock + Send + Sync,
{
    async fn launch(&self, task_id: TaskId) -> OrchestrationResult<SessionId> {
        let request = ManifestRequest::new(
            self.coordinator.project_id(),
            vec![task_id],
            AgentRole::Worker,
        )
        .with_parent_session(self.coordinator.id());
        let worker = self.supervisor.spawn(&request).await?;
        Ok(worker.id())
    }

    async fn watch_all(
        &self,
        sessions: &[SessionId],
        cancel: &CancellationToken,
    ) -> OrchestrationResult<WatchOutcome> {
        self.supervisor.watch(sessions, cancel).await
    }

    async fn watch_any(
        &self,
        sessions: &[SessionId],
        cancel: &CancellationToken,
    ) -> OrchestrationResult<WatchOutcome> {
        self.supervisor.watch_any(sessions, cancel).await
    }
}

impl<R, K, S, C> SessionSupervisor<R, K, S, C>
where
    R: EntityStore,
    K: SkillCatalog,
    S: ProcessSpawner,
    C: Clock + Send + Sync,
{
    /// Runs a coordinator's strategy over the children of its linked tasks.
    ///
    /// Dependency cycles among the children are rejected before any worker
    /// is spawned. Failed workers are retried according to the configured
    /// policy for the coordinator's strategy.
    ///
    /// # Errors
    ///
    /// Returns `PermissionDenied` for a worker session, `StateConflict` for
    /// an ended coordinator, a dependency cycle, or a deadlock, and
    /// `Validation` when the linked tasks have no children.
    pub async fn orchestrate(
        &self,
        coordinator_id: SessionId,
        cancel: &CancellationToken,
    ) -> OrchestrationResult<OrchestrationReport> {
        let coordinator = self.get(coordinator_id).await?;
        let Strategy::Coordinator(strategy) = coordinator.strategy() else {
            return Err(OrchestrationError::permission_denied(format!(
                "session {coordinator_id} runs in {} mode and cannot orchestrate",
                coordinator.mode()
            ))
            .with_entity(EntityRef::session(coordinator_id)));
        };
        if coordinator.is_terminal() {
            return Err(SessionDomainError::Inactive(coordinator_id).into());
        }
        let children = self.child_tasks(&coordinator).await?;
        if children.is_empty() {
            return Err(OrchestrationError::validation(format!(
                "coordinator {coordinator_id} has no child tasks to orchestrate"
            ))
            .with_entity(EntityRef::session(coordinator_id)));
        }
        let engine = CoordinatorEngine::new(self.settings.retry.for_strategy(strategy));
        info!(
            session_id = %coordinator_id,
            strategy = %coordinator.strategy(),
            children = children.len(),
            "orchestration started"
        );
        let launcher = SupervisorLauncher::new(self, coordinator);
        let report = engine.run(strategy, &children, &launcher, cancel).await?;
        info!(
            session_id = %coordinator_id,
            succeeded = report.succeeded(),
            rounds = report.rounds.len(),
            "orchestration finished"
        );
        Ok(report)
    }

    async fn child_tasks(&self, coordinator: &Session) -> OrchestrationResult<Vec<Task>> {
        let mut seen = BTreeSet::new();
        let mut children = Vec::new();
        for task_id in coordinator.task_ids() {
            for child in self.tasks.children(*task_id).await? {
                if seen.insert(child.id()) {
                    children.push(child);
                }
            }
        }
        Ok(children)
    }
}
