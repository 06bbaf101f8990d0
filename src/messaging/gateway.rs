//! Command gateway: authorises agent commands and dispatches them.

use super::command::{
    AgentCommand, CommandResponse, CreateTaskPayload, OptionalTaskTarget, QueueFailPayload,
    QueuePushPayload, ReportPayload, SpawnPayload, StopPayload, TaskTarget, UpdateTaskPayload,
    WatchPayload,
};
use crate::error::{EntityRef, OrchestrationError, OrchestrationResult};
use crate::manifest::domain::ManifestRequest;
use crate::manifest::ports::SkillCatalog;
use crate::session::domain::{Session, SessionDomainError, SessionId};
use crate::session::ports::ProcessSpawner;
use crate::session::services::SessionSupervisor;
use crate::store::EntityStore;
use crate::strategy::{AgentRole, CommandName, Phase, SessionMode, TreePlan};
use crate::task::domain::{Task, TaskId, TaskStatus};
use mockable::Clock;
use serde::Serialize;
use serde_json::{Value, json};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Result of one dispatched command.
struct Dispatched {
    data: Value,
    /// Keep the current phase instead of following the strategy.
    hold_phase: bool,
}

impl Dispatched {
    const fn data(data: Value) -> Self {
        Self {
            data,
            hold_phase: false,
        }
    }
}

/// Entry point for commands sent by agent processes.
///
/// A command is accepted only when the calling session is still running,
/// the command is on its compiled allowlist, and the strategy permits it in
/// the current phase. Commands granted beyond the strategy's own set are
/// accepted in any phase and never move it.
pub struct CommandGateway<R, K, S, C>
where
    R: EntityStore,
    K: SkillCatalog,
    S: ProcessSpawner,
    C: Clock + Send + Sync,
{
    supervisor: Arc<SessionSupervisor<R, K, S, C>>,
    shutdown: CancellationToken,
}

impl<R, K, S, C> CommandGateway<R, K, S, C>
where
    R: EntityStore,
    K: SkillCatalog,
    S: ProcessSpawner,
    C: Clock + Send + Sync,
{
    /// Creates a gateway. Long-running commands stop when `shutdown` fires.
    #[must_use]
    pub const fn new(
        supervisor: Arc<SessionSupervisor<R, K, S, C>>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            supervisor,
            shutdown,
        }
    }

    /// Handles one command and returns its structured response.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown session, `StateConflict` for an
    /// ended one, `PermissionDenied` when the command is not permitted, and
    /// any error the command itself raises.
    pub async fn handle(
        &self,
        session_id: SessionId,
        command: &AgentCommand,
    ) -> OrchestrationResult<CommandResponse> {
        let session = self.supervisor.get(session_id).await?;
        if session.is_terminal() {
            return Err(SessionDomainError::Inactive(session_id).into());
        }
        let next_phase = self.authorize(&session, command.command).await?;
        let dispatched = self.dispatch(&session, command).await?;
        let phase = if dispatched.hold_phase {
            session.phase()
        } else {
            next_phase
        };
        self.supervisor
            .record_command(session_id, command.command, phase)
            .await?;
        debug!(session_id = %session_id, command = %command.command, %phase, "command handled");
        Ok(CommandResponse::success(command.command, phase, dispatched.data))
    }

    /// Parses and handles a raw JSON command, folding every failure into
    /// the response.
    pub async fn handle_json(&self, session_id: SessionId, raw: &str) -> CommandResponse {
        let command = match AgentCommand::parse(raw) {
            Ok(command) => command,
            Err(error) => return CommandResponse::failure(None, error),
        };
        self.handle(session_id, &command)
            .await
            .unwrap_or_else(|error| CommandResponse::failure(Some(command.command), error))
    }

    async fn authorize(
        &self,
        session: &Session,
        command: CommandName,
    ) -> OrchestrationResult<Phase> {
        let strategy = session.strategy();
        let verdict = if session.mode() == SessionMode::Coordinate && command.is_direct_execution()
        {
            Err(format!("coordinators delegate {command} to workers"))
        } else if !session.permits(command) {
            Err(format!("{command} is not on the session allowlist"))
        } else if strategy.command_set().contains(&command) {
            strategy
                .authorize(session.phase(), command)
                .map_err(|err| err.to_string())
        } else {
            Ok(session.phase())
        };
        match verdict {
            Ok(phase) => Ok(phase),
            Err(reason) => {
                warn!(session_id = %session.id(), %command, phase = %session.phase(), %reason, "command denied");
                self.supervisor
                    .record_denial(session.id(), command, &reason)
                    .await?;
                Err(OrchestrationError::permission_denied(reason)
                    .with_entity(EntityRef::session(session.id())))
            }
        }
    }

    async fn dispatch(
        &self,
        session: &Session,
        command: &AgentCommand,
    ) -> OrchestrationResult<Dispatched> {
        let supervisor = &*self.supervisor;
        let tasks = supervisor.tasks();
        let queues = supervisor.queues();
        let session_id = session.id();
        let data = match command.command {
            CommandName::TaskGet => {
                let target: TaskTarget = command.payload()?;
                to_value(&self.visible_task(session, target.task_id).await?)?
            }
            CommandName::TaskList => to_value(&tasks.get_many(session.task_ids()).await?)?,
            CommandName::TaskChildren => {
                let target: TaskTarget = command.payload()?;
                self.visible_task(session, target.task_id).await?;
                to_value(&tasks.children(target.task_id).await?)?
            }
            CommandName::TaskTree => {
                let target: OptionalTaskTarget = command.payload()?;
                let root = self.target_or_first(session, target.task_id).await?;
                let nodes: Vec<Value> = tasks
                    .subtree(root)
                    .await?
                    .into_iter()
                    .map(|(depth, task)| json!({ "depth": depth, "task": task }))
                    .collect();
                Value::Array(nodes)
            }
            CommandName::TaskCreate => {
                let payload: CreateTaskPayload = command.payload()?;
                let request = payload.into_new_task(session.project_id());
                if let Some(parent_id) = request.parent_id {
                    self.writable_task(session, parent_id).await?;
                }
                to_value(&tasks.create(request).await?)?
            }
            CommandName::TaskUpdate => {
                let payload: UpdateTaskPayload = command.payload()?;
                let mut task = self.writable_task(session, payload.task_id).await?;
                if let Some(patch) = payload.patch() {
                    task = tasks.update(payload.task_id, patch).await?;
                }
                if let Some(dependencies) = payload.dependencies {
                    task = tasks.set_dependencies(payload.task_id, dependencies).await?;
                }
                to_value(&task)?
            }
            CommandName::TaskComplete => {
                let target: TaskTarget = command.payload()?;
                self.writable_task(session, target.task_id).await?;
                to_value(&tasks.set_status(target.task_id, TaskStatus::Completed).await?)?
            }
            CommandName::TaskBlock => {
                let target: TaskTarget = command.payload()?;
                self.writable_task(session, target.task_id).await?;
                to_value(&tasks.set_status(target.task_id, TaskStatus::Blocked).await?)?
            }
            CommandName::TaskVerify => {
                let target: OptionalTaskTarget = command.payload()?;
                let root = self.target_or_first(session, target.task_id).await?;
                to_value(&tasks.verify(root).await?)?
            }
            CommandName::ReportProgress => {
                let report: ReportPayload = command.payload()?;
                to_value(&supervisor.report_progress(session_id, &report.message).await?)?
            }
            CommandName::ReportBlocked => {
                let report: ReportPayload = command.payload()?;
                to_value(&supervisor.report_blocked(session_id, &report.message).await?)?
            }
            CommandName::ReportComplete => {
                let report: ReportPayload = command.payload()?;
                to_value(&supervisor.report_complete(session_id, &report.message).await?)?
            }
            CommandName::ReportError => {
                let report: ReportPayload = command.payload()?;
                to_value(&supervisor.report_error(session_id, &report.message).await?)?
            }
            CommandName::QueueTop => {
                let top = queues.top(session_id).await?;
                let empty = top.is_none();
                return Ok(Dispatched {
                    data: to_value(&top)?,
                    hold_phase: empty,
                });
            }
            CommandName::QueueStart => to_value(&queues.start(session_id).await?)?,
            CommandName::QueueComplete => to_value(&queues.complete(session_id).await?)?,
            CommandName::QueueFail => {
                let payload: QueueFailPayload = command.payload()?;
                to_value(&queues.fail(session_id, &payload.reason).await?)?
            }
            CommandName::QueueSkip => to_value(&queues.skip(session_id).await?)?,
            CommandName::QueuePush => {
                let payload: QueuePushPayload = command.payload()?;
                self.visible_task(session, payload.task_id).await?;
                to_value(&queues.push(session_id, payload.task_id).await?)?
            }
            CommandName::QueueStatus => to_value(&queues.status(session_id).await?)?,
            CommandName::SessionInfo => to_value(session)?,
            CommandName::SessionSpawn => {
                let payload: SpawnPayload = command.payload()?;
                to_value(&self.spawn_worker(session, payload).await?)?
            }
            CommandName::SessionWatch => {
                let payload: WatchPayload = command.payload()?;
                for watched in &payload.session_ids {
                    self.owned_child(session, *watched).await?;
                }
                let cancel = self.shutdown.child_token();
                let outcome = if payload.any {
                    supervisor.watch_any(&payload.session_ids, &cancel).await?
                } else {
                    supervisor.watch(&payload.session_ids, &cancel).await?
                };
                to_value(&outcome)?
            }
            CommandName::SessionList => to_value(&supervisor.list_children(session_id).await?)?,
            CommandName::SessionStop => {
                let payload: StopPayload = command.payload()?;
                self.owned_child(session, payload.session_id).await?;
                let reason = payload
                    .reason
                    .unwrap_or_else(|| format!("stopped by coordinator {session_id}"));
                to_value(&supervisor.stop(payload.session_id, &reason).await?)?
            }
            CommandName::TreePlan => {
                let target: OptionalTaskTarget = command.payload()?;
                let root = self.target_or_first(session, target.task_id).await?;
                let forest = tasks.forest(session.project_id()).await?;
                to_value(&TreePlan::compute(&forest, root)?)?
            }
            CommandName::OrchestrateRun => {
                let cancel = self.shutdown.child_token();
                to_value(&supervisor.orchestrate(session_id, &cancel).await?)?
            }
            CommandName::CodeExecute => json!({ "accepted": true }),
        };
        Ok(Dispatched::data(data))
    }

    async fn spawn_worker(
        &self,
        coordinator: &Session,
        payload: SpawnPayload,
    ) -> OrchestrationResult<Session> {
        let mut request = ManifestRequest::new(
            coordinator.project_id(),
            payload.task_ids,
            AgentRole::Worker,
        )
        .with_parent_session(coordinator.id())
        .with_skills(payload.skills);
        if let Some(strategy) = payload.strategy {
            request = request.with_strategy(strategy);
        }
        if let Some(member) = payload.team_member_id {
            request = request.with_team_member(member);
        }
        if let Some(model) = payload.model {
            request = request.with_model(model);
        }
        self.supervisor.spawn(&request).await
    }

    async fn visible_task(&self, session: &Session, task_id: TaskId) -> OrchestrationResult<Task> {
        let task = self.supervisor.tasks().get(task_id).await?;
        if task.project_id() != session.project_id() {
            return Err(OrchestrationError::permission_denied(format!(
                "task {task_id} belongs to another project"
            ))
            .with_entity(EntityRef::task(task_id)));
        }
        Ok(task)
    }

    /// Workers change only the tasks they hold and those tasks' descendants.
    async fn writable_task(&self, session: &Session, task_id: TaskId) -> OrchestrationResult<Task> {
        let task = self.visible_task(session, task_id).await?;
        if session.role() == AgentRole::Coordinator || session.task_ids().contains(&task_id) {
            return Ok(task);
        }
        let forest = self.supervisor.tasks().forest(session.project_id()).await?;
        if forest.descends_from_any(task_id, session.task_ids()) {
            return Ok(task);
        }
        Err(OrchestrationError::permission_denied(format!(
            "task {task_id} is outside the tasks held by session {}",
            session.id()
        ))
        .with_entity(EntityRef::task(task_id)))
    }

    async fn target_or_first(
        &self,
        session: &Session,
        task_id: Option<TaskId>,
    ) -> OrchestrationResult<TaskId> {
        let Some(target) = task_id.or_else(|| session.task_ids().first().copied()) else {
            return Err(OrchestrationError::validation(format!(
                "session {} has no task to act on",
                session.id()
            )));
        };
        Ok(self.visible_task(session, target).await?.id())
    }

    async fn owned_child(&self, coordinator: &Session, child_id: SessionId) -> OrchestrationResult<()> {
        let child = self.supervisor.get(child_id).await?;
        if child.parent_session_id() == Some(coordinator.id()) {
            return Ok(());
        }
        Err(OrchestrationError::permission_denied(format!(
            "session {child_id} was not spawned by {}",
            coordinator.id()
        ))
        .with_entity(EntityRef::session(child_id)))
    }
}

fn to_value<T: Serialize + ?Sized>(value: &T) -> OrchestrationResult<Value> {
    serde_json::to_value(value)
        .map_err(|err| OrchestrationError::storage(format!("cannot encode command result: {err}")))
}
