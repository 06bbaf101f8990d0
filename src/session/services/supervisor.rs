//! Session supervisor: spawns sessions and drives their lifecycle.

use crate::error::{EntityKind, EntityRef, OrchestrationError, OrchestrationResult};
use crate::events::{DomainEvent, EventBus};
use crate::manifest::domain::{CompiledPrompt, Manifest, ManifestRequest};
use crate::manifest::ports::SkillCatalog;
use crate::manifest::services::{ManifestBuilder, ManifestDefaults};
use crate::queue::services::QueueService;
use crate::session::domain::{
    NewSession, Session, SessionDomainError, SessionId, SessionStatus, SpawnHandle, TimelineKind,
};
use crate::session::ports::{ProcessSpawner, SpawnRequest};
use crate::store::EntityStore;
use crate::strategy::{
    CommandName, CoordinatorStrategy, Phase, RetryPolicies, SessionMode, Strategy,
};
use crate::task::domain::{ProjectId, Task, TaskId, TaskSessionStatus, TaskStatus};
use crate::task::services::TaskService;
use mockable::Clock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Supervisor settings, usually taken from the `[session]`, `[manifest]`,
/// and `[retry]` configuration sections.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisorSettings {
    /// Directory holding `<session id>.json` manifest files.
    pub manifest_dir: PathBuf,
    /// Write each manifest to `manifest_dir` before spawning.
    pub write_manifests: bool,
    /// Model and turn budget fallbacks.
    pub defaults: ManifestDefaults,
    /// Automatic retries for `orchestrate:run`.
    pub retry: RetryPolicies,
}

impl Default for SupervisorSettings {
    fn default() -> Self {
        Self {
            manifest_dir: PathBuf::from(".maestro/manifests"),
            write_manifests: true,
            defaults: ManifestDefaults::default(),
            retry: RetryPolicies::default(),
        }
    }
}

/// Owns every session lifecycle change.
pub struct SessionSupervisor<R, K, S, C>
where
    R: EntityStore,
    K: SkillCatalog,
    S: ProcessSpawner,
    C: Clock + Send + Sync,
{
    pub(super) store: Arc<R>,
    pub(super) builder: ManifestBuilder<R, K, C>,
    pub(super) tasks: TaskService<R, C>,
    pub(super) queues: QueueService<R, C>,
    pub(super) spawner: Arc<S>,
    pub(super) bus: Arc<EventBus>,
    pub(super) clock: Arc<C>,
    pub(super) settings: SupervisorSettings,
}

impl<R, K, S, C> SessionSupervisor<R, K, S, C>
where
    R: EntityStore,
    K: SkillCatalog,
    S: ProcessSpawner,
    C: Clock + Send + Sync,
{
    /// Creates a supervisor.
    #[must_use]
    pub fn new(
        store: Arc<R>,
        skills: Arc<K>,
        spawner: Arc<S>,
        bus: Arc<EventBus>,
        clock: Arc<C>,
        settings: SupervisorSettings,
    ) -> Self {
        Self {
            builder: ManifestBuilder::new(
                Arc::clone(&store),
                skills,
                Arc::clone(&bus),
                Arc::clone(&clock),
                settings.defaults.clone(),
            ),
            tasks: TaskService::new(Arc::clone(&store), Arc::clone(&bus), Arc::clone(&clock)),
            queues: QueueService::new(Arc::clone(&store), Arc::clone(&bus), Arc::clone(&clock)),
            store,
            spawner,
            bus,
            clock,
            settings,
        }
    }

    /// Returns the task service sharing this supervisor's store and bus.
    #[must_use]
    pub const fn tasks(&self) -> &TaskService<R, C> {
        &self.tasks
    }

    /// Returns the queue service sharing this supervisor's store and bus.
    #[must_use]
    pub const fn queues(&self) -> &QueueService<R, C> {
        &self.queues
    }

    /// Returns the supervisor settings.
    #[must_use]
    pub const fn settings(&self) -> &SupervisorSettings {
        &self.settings
    }

    /// Builds a manifest, creates the session, and starts its process.
    ///
    /// Validation happens before the session exists. Once it exists, a
    /// manifest or spawn failure leaves it `failed` and the error is
    /// returned.
    ///
    /// # Errors
    ///
    /// Returns `Validation` or `NotFound` for a bad request, `StateConflict`
    /// when the parent coordinator's strategy forbids the spawn right now,
    /// `ManifestGeneration` when compilation fails, and `Spawn` when the
    /// process cannot be started.
    pub async fn spawn(&self, request: &ManifestRequest) -> OrchestrationResult<Session> {
        let session_id = SessionId::new();
        let manifest = self.builder.build(session_id, request).await?;
        if let Some(parent_id) = request.parent_session_id {
            self.ensure_spawn_allowed(parent_id, &manifest).await?;
        }
        let session = Session::new(
            NewSession {
                id: session_id,
                project_id: request.project_id,
                role: manifest.role,
                strategy: manifest.strategy,
                team_member: manifest.team_member.clone(),
                parent_session_id: manifest.parent_session_id,
            },
            &*self.clock,
        )?;
        self.store.store_session(&session).await?;
        info!(
            session_id = %session_id,
            role = %manifest.role,
            strategy = %manifest.strategy,
            tasks = manifest.tasks.len(),
            "session created"
        );
        self.publish(DomainEvent::SessionCreated(Box::new(session.clone())));

        match self.launch(&manifest).await {
            Ok(started) => {
                info!(session_id = %session_id, status = %started.status(), "session spawned");
                Ok(started)
            }
            Err(error) => Err(self.abort_spawn(session_id, error).await),
        }
    }

    /// Fetches one session.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` when the session does not exist.
    pub async fn get(&self, session_id: SessionId) -> OrchestrationResult<Session> {
        self.store
            .find_session(session_id)
            .await?
            .ok_or_else(|| OrchestrationError::not_found(EntityRef::session(session_id)))
    }

    /// Lists a project's sessions.
    ///
    /// # Errors
    ///
    /// Returns a storage error when the repository fails.
    pub async fn list(&self, project_id: ProjectId) -> OrchestrationResult<Vec<Session>> {
        Ok(self.store.list_sessions(project_id).await?)
    }

    /// Lists the sessions spawned by a coordinator.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` when the coordinator does not exist.
    pub async fn list_children(&self, parent_id: SessionId) -> OrchestrationResult<Vec<Session>> {
        self.get(parent_id).await?;
        Ok(self.store.list_children(parent_id).await?)
    }

    /// Returns the stored manifest for a session.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` when no manifest was written for the session.
    pub async fn manifest(&self, session_id: SessionId) -> OrchestrationResult<Manifest> {
        self.store
            .find_manifest(session_id)
            .await?
            .ok_or_else(|| {
                OrchestrationError::not_found(EntityRef::new(EntityKind::Manifest, session_id))
            })
    }

    /// `report:progress`: the session is working.
    ///
    /// # Errors
    ///
    /// Returns `StateConflict` when the session already ended.
    pub async fn report_progress(
        &self,
        session_id: SessionId,
        message: &str,
    ) -> OrchestrationResult<Session> {
        let session = self
            .transition(session_id, SessionStatus::Working, message)
            .await?;
        if session.strategy() != Strategy::QUEUE {
            self.mirror(
                &session,
                Some(TaskStatus::InProgress),
                TaskSessionStatus::Working,
            )
            .await?;
        }
        Ok(session)
    }

    /// `report:blocked`: the session is waiting on something external.
    ///
    /// # Errors
    ///
    /// Returns `StateConflict` when the session already ended.
    pub async fn report_blocked(
        &self,
        session_id: SessionId,
        reason: &str,
    ) -> OrchestrationResult<Session> {
        let session = self
            .transition(session_id, SessionStatus::Idle, reason)
            .await?;
        if session.strategy() != Strategy::QUEUE {
            self.mirror(&session, Some(TaskStatus::Blocked), TaskSessionStatus::Blocked)
                .await?;
        }
        warn!(session_id = %session_id, reason, "session blocked");
        Ok(session)
    }

    /// `report:complete`: the session finished.
    ///
    /// Linked tasks are completed with the session, except for queue
    /// workers, whose tasks close through the queue. Every linked task must
    /// have only terminal descendants; otherwise nothing changes.
    ///
    /// # Errors
    ///
    /// Returns `StateConflict` when the session already ended or a linked
    /// task still has open descendants.
    pub async fn report_complete(
        &self,
        session_id: SessionId,
        summary: &str,
    ) -> OrchestrationResult<Session> {
        let session = self.get(session_id).await?;
        if session.is_terminal() {
            return Err(SessionDomainError::Inactive(session_id).into());
        }
        if session.strategy() == Strategy::QUEUE {
            let queue = self.queues.get(session_id).await?;
            if let Some(item) = queue.processing() {
                return Err(OrchestrationError::state_conflict(format!(
                    "queue item for task {} is still processing",
                    item.task_id
                ))
                .with_entity(EntityRef::queue(session_id)));
            }
        } else {
            let open = self.open_tasks(&session).await?;
            for task in &open {
                self.tasks.ensure_completable(task).await?;
            }
            for task in &open {
                self.tasks
                    .record_activity(
                        task.id(),
                        Some(TaskStatus::Completed),
                        TaskSessionStatus::Completed,
                    )
                    .await?;
            }
        }
        let completed = self
            .transition(session_id, SessionStatus::Completed, summary)
            .await?;
        info!(session_id = %session_id, "session completed");
        Ok(completed)
    }

    /// `report:error`: the session failed. Linked tasks keep their status
    /// and record the failure.
    ///
    /// # Errors
    ///
    /// Returns `StateConflict` when the session already ended.
    pub async fn report_error(
        &self,
        session_id: SessionId,
        reason: &str,
    ) -> OrchestrationResult<Session> {
        let session = self
            .transition(session_id, SessionStatus::Failed, reason)
            .await?;
        self.mirror_end(&session, TaskSessionStatus::Failed).await?;
        warn!(session_id = %session_id, reason, "session failed");
        Ok(session)
    }

    /// Stops a session and terminates its process.
    ///
    /// # Errors
    ///
    /// Returns `StateConflict` when the session already ended and `Spawn`
    /// when the process cannot be signalled.
    pub async fn stop(&self, session_id: SessionId, reason: &str) -> OrchestrationResult<Session> {
        let current = self.get(session_id).await?;
        if current.is_terminal() {
            return Err(SessionDomainError::Inactive(session_id).into());
        }
        if let Some(handle) = current.spawn_handle() {
            self.spawner.terminate(handle).await?;
        }
        let stopped = self
            .change(session_id, |session, clock| {
                session.transition_to(SessionStatus::Stopped, reason, clock)?;
                session.record(TimelineKind::Process, "process terminated", None, clock);
                Ok(())
            })
            .await?;
        self.mirror_end(&stopped, TaskSessionStatus::Stopped).await?;
        info!(session_id = %session_id, reason, "session stopped");
        Ok(stopped)
    }

    /// Deletes an ended session.
    ///
    /// # Errors
    ///
    /// Returns `StateConflict` while the session is still running.
    pub async fn delete(&self, session_id: SessionId) -> OrchestrationResult<Session> {
        let session = self.get(session_id).await?;
        if !session.is_terminal() {
            return Err(OrchestrationError::state_conflict(format!(
                "session {session_id} is still {}",
                session.status()
            ))
            .with_entity(EntityRef::session(session_id)));
        }
        let deleted = self.store.delete_session(session_id).await?;
        self.publish(DomainEvent::SessionDeleted {
            session_id,
            project_id: deleted.project_id(),
        });
        Ok(deleted)
    }

    /// Records an accepted command and moves the session to `phase`.
    ///
    /// # Errors
    ///
    /// Returns `StateConflict` on a concurrent change.
    pub async fn record_command(
        &self,
        session_id: SessionId,
        command: CommandName,
        phase: Phase,
    ) -> OrchestrationResult<Session> {
        self.change(session_id, |session, clock| {
            session.record(TimelineKind::Command, command.as_str(), None, clock);
            session.set_phase(phase, clock);
            Ok(())
        })
        .await
    }

    /// Records a rejected command.
    ///
    /// # Errors
    ///
    /// Returns `StateConflict` on a concurrent change.
    pub async fn record_denial(
        &self,
        session_id: SessionId,
        command: CommandName,
        reason: &str,
    ) -> OrchestrationResult<Session> {
        self.change(session_id, |session, clock| {
            session.record(
                TimelineKind::Denied,
                format!("{command} denied: {reason}"),
                None,
                clock,
            );
            Ok(())
        })
        .await
    }

    pub(super) fn publish(&self, event: DomainEvent) {
        self.bus.publish(event, self.clock.utc());
    }

    async fn transition(
        &self,
        session_id: SessionId,
        target: SessionStatus,
        reason: &str,
    ) -> OrchestrationResult<Session> {
        let session = self
            .change(session_id, |session, clock| {
                session.transition_to(target, reason, clock)?;
                Ok(())
            })
            .await?;
        debug!(session_id = %session_id, status = %session.status(), "session transitioned");
        Ok(session)
    }

    async fn change<F>(&self, session_id: SessionId, apply: F) -> OrchestrationResult<Session>
    where
        F: FnOnce(&mut Session, &C) -> OrchestrationResult<()> + Send,
    {
        let mut session = self.get(session_id).await?;
        apply(&mut session, &*self.clock)?;
        let stored = self.store.update_session(&session).await?;
        self.publish(DomainEvent::SessionUpdated(Box::new(stored.clone())));
        Ok(stored)
    }

    async fn launch(&self, manifest: &Manifest) -> OrchestrationResult<Session> {
        let session_id = manifest.session_id;
        for task_id in manifest.task_ids() {
            self.tasks.link(task_id, session_id).await?;
            self.tasks
                .record_activity(task_id, None, TaskSessionStatus::Spawning)
                .await?;
        }
        let prompt = self.prepare(manifest).await?;
        let configured = self
            .change(session_id, |session, clock| {
                let env = spawn_env(session, manifest, &self.manifest_path(session_id));
                session.configure(prompt.command_allowlist.clone(), env, clock);
                Ok(())
            })
            .await?;

        let spawn_request = SpawnRequest {
            session_id,
            system_prompt: prompt.system_prompt,
            task_prompt: prompt.task_prompt,
            model: manifest.session.model.clone(),
            skill_paths: manifest.skills.iter().map(|skill| skill.path.clone()).collect(),
            max_turns: manifest.session.max_turns,
            working_dir: manifest.session.working_dir.clone(),
            env: configured.env().clone(),
        };
        let handle = self.spawner.spawn(&spawn_request).await?;
        match self.mark_started(session_id, handle.clone()).await {
            Ok(started) => Ok(started),
            Err(error) => {
                if let Err(terminate_error) = self.spawner.terminate(&handle).await {
                    warn!(session_id = %session_id, error = %terminate_error, "orphaned process not terminated");
                }
                Err(error)
            }
        }
    }

    /// Attaches the process handle. The session moves to `idle` only while
    /// it is still `spawning`; a report the agent sent meanwhile stands.
    async fn mark_started(
        &self,
        session_id: SessionId,
        handle: SpawnHandle,
    ) -> OrchestrationResult<Session> {
        let started = self
            .change(session_id, |session, clock| {
                session.attach_process(handle, clock);
                if session.status() == SessionStatus::Spawning {
                    session.transition_to(SessionStatus::Idle, "process started", clock)?;
                }
                Ok(())
            })
            .await?;
        if started.status() == SessionStatus::Idle && started.strategy() != Strategy::QUEUE {
            for task in self.open_tasks(&started).await? {
                if task.session_status() == Some(TaskSessionStatus::Spawning) {
                    self.tasks
                        .record_activity(task.id(), None, TaskSessionStatus::Idle)
                        .await?;
                }
            }
        }
        Ok(started)
    }

    async fn prepare(&self, manifest: &Manifest) -> OrchestrationResult<CompiledPrompt> {
        self.builder.commit(manifest).await?;
        let prompt = self.builder.compile(manifest).await?;
        if manifest.strategy == Strategy::QUEUE {
            self.queues
                .create(manifest.session_id, &manifest.task_ids())
                .await?;
        }
        if self.settings.write_manifests {
            self.write_manifest(manifest).await?;
        }
        debug!(
            session_id = %manifest.session_id,
            digest = %prompt.system_prompt_digest,
            commands = prompt.command_allowlist.len(),
            "prompt compiled"
        );
        Ok(prompt)
    }

    async fn write_manifest(&self, manifest: &Manifest) -> OrchestrationResult<()> {
        let path = self.manifest_path(manifest.session_id);
        let body = serde_json::to_vec_pretty(manifest).map_err(|err| {
            OrchestrationError::manifest_generation(format!("cannot serialise manifest: {err}"))
        })?;
        tokio::fs::create_dir_all(&self.settings.manifest_dir)
            .await
            .map_err(|err| {
                OrchestrationError::manifest_generation(format!(
                    "cannot create {}: {err}",
                    self.settings.manifest_dir.display()
                ))
            })?;
        tokio::fs::write(&path, body).await.map_err(|err| {
            OrchestrationError::manifest_generation(format!(
                "cannot write {}: {err}",
                path.display()
            ))
        })
    }

    fn manifest_path(&self, session_id: SessionId) -> PathBuf {
        self.settings.manifest_dir.join(format!("{session_id}.json"))
    }

    async fn abort_spawn(
        &self,
        session_id: SessionId,
        error: OrchestrationError,
    ) -> OrchestrationError {
        warn!(session_id = %session_id, error = %error, "spawn aborted");
        match self
            .transition(session_id, SessionStatus::Failed, error.message())
            .await
        {
            Ok(session) => {
                if let Err(mirror_error) = self.mirror_end(&session, TaskSessionStatus::Failed).await
                {
                    warn!(session_id = %session_id, error = %mirror_error, "task status not updated");
                }
            }
            Err(transition_error) => {
                warn!(session_id = %session_id, error = %transition_error, "session not marked failed");
            }
        }
        error.with_entity(EntityRef::session(session_id))
    }

    async fn ensure_spawn_allowed(
        &self,
        parent_id: SessionId,
        manifest: &Manifest,
    ) -> OrchestrationResult<()> {
        let parent = self.get(parent_id).await?;
        if parent.mode() != SessionMode::Coordinate {
            return Err(OrchestrationError::permission_denied(format!(
                "session {parent_id} is not a coordinator"
            ))
            .with_entity(EntityRef::session(parent_id)));
        }
        if parent.is_terminal() {
            return Err(SessionDomainError::Inactive(parent_id).into());
        }
        match parent.strategy() {
            Strategy::Coordinator(CoordinatorStrategy::Default) => {
                let children = self.store.list_children(parent_id).await?;
                if let Some(running) = children.iter().find(|child| !child.is_terminal()) {
                    return Err(OrchestrationError::state_conflict(format!(
                        "default coordinator {parent_id} spawns sequentially; session {} is still {}",
                        running.id(),
                        running.status()
                    ))
                    .with_entity(EntityRef::session(running.id())));
                }
            }
            Strategy::Coordinator(CoordinatorStrategy::Dag) => {
                for snapshot in &manifest.tasks {
                    let dependencies = self.tasks.get_many(&snapshot.dependencies).await?;
                    if let Some(pending) = dependencies
                        .iter()
                        .find(|dependency| dependency.status() != TaskStatus::Completed)
                    {
                        return Err(OrchestrationError::state_conflict(format!(
                            "task {} is not ready: dependency {} is {}",
                            snapshot.id,
                            pending.id(),
                            pending.status()
                        ))
                        .with_entity(EntityRef::task(snapshot.id)));
                    }
                }
            }
            _ => {}
        }
        Ok(())
    }

    async fn open_tasks(&self, session: &Session) -> OrchestrationResult<Vec<Task>> {
        Ok(self
            .tasks
            .get_many(session.task_ids())
            .await?
            .into_iter()
            .filter(|task| !task.is_terminal())
            .collect())
    }

    async fn mirror(
        &self,
        session: &Session,
        status: Option<TaskStatus>,
        session_status: TaskSessionStatus,
    ) -> OrchestrationResult<()> {
        for task in self.open_tasks(session).await? {
            self.tasks
                .record_activity(task.id(), status, session_status)
                .await?;
        }
        Ok(())
    }

    async fn mirror_end(
        &self,
        session: &Session,
        session_status: TaskSessionStatus,
    ) -> OrchestrationResult<()> {
        if session.strategy() != Strategy::QUEUE {
            return self.mirror(session, None, session_status).await;
        }
        let Some(queue) = self.store.find_queue(session.id()).await? else {
            return Ok(());
        };
        if let Some(item) = queue.processing() {
            self.tasks
                .record_activity(item.task_id, None, session_status)
                .await?;
        }
        Ok(())
    }
}

fn spawn_env(
    session: &Session,
    manifest: &Manifest,
    manifest_path: &std::path::Path,
) -> BTreeMap<String, String> {
    let task_ids: Vec<String> = manifest
        .task_ids()
        .iter()
        .map(TaskId::to_string)
        .collect();
    BTreeMap::from([
        ("SESSION_ID".to_owned(), session.id().to_string()),
        ("TASK_IDS".to_owned(), task_ids.join(",")),
        ("PROJECT_ID".to_owned(), session.project_id().to_string()),
        ("ROLE".to_owned(), session.role().to_string()),
        ("STRATEGY".to_owned(), session.strategy().to_string()),
        (
            "MANIFEST_PATH".to_owned(),
            manifest_path.display().to_string(),
        ),
    ])
}
