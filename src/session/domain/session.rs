//! Session aggregate and its lifecycle state machine.

use super::{SessionDomainError, SessionId, SpawnHandle};
use crate::strategy::{AgentRole, CommandName, Phase, PhaseMachine, SessionMode, Strategy};
use crate::task::domain::{ProjectId, TaskId};
use crate::team::domain::TeamMemberSnapshot;
use chrono::{DateTime, Utc};
use mockable::Clock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Lifecycle status of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Manifest being built and process being started.
    Spawning,
    /// Running, waiting or blocked.
    Idle,
    /// Running and making progress.
    Working,
    /// Finished successfully.
    Completed,
    /// Finished unsuccessfully.
    Failed,
    /// Stopped by request.
    Stopped,
}

impl SessionStatus {
    /// Returns the canonical string representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Spawning => "spawning",
            Self::Idle => "idle",
            Self::Working => "working",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Stopped => "stopped",
        }
    }

    /// Returns `true` for `completed`, `failed`, and `stopped`.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Stopped)
    }

    /// Returns `true` when the state machine permits moving to `target`.
    ///
    /// Staying in `idle` or `working` is permitted and treated as a no-op.
    #[must_use]
    pub const fn can_transition_to(self, target: Self) -> bool {
        match self {
            Self::Spawning | Self::Idle | Self::Working => !matches!(target, Self::Spawning),
            Self::Completed | Self::Failed | Self::Stopped => false,
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Category of a timeline entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimelineKind {
    /// Session created.
    Created,
    /// Status changed.
    Status,
    /// Strategy phase changed.
    Phase,
    /// Agent command accepted.
    Command,
    /// Agent command rejected.
    Denied,
    /// Task linked or unlinked.
    Association,
    /// Process spawned or terminated.
    Process,
}

/// One append-only timeline record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelineEntry {
    /// When the entry was recorded.
    pub occurred_at: DateTime<Utc>,
    /// Entry category.
    pub kind: TimelineKind,
    /// Human-readable description.
    pub message: String,
    /// Task the entry concerns, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<TaskId>,
}

/// Parameters for a new session.
#[derive(Debug, Clone)]
pub struct NewSession {
    /// Pre-allocated identifier, so manifest paths can be derived up front.
    pub id: SessionId,
    /// Owning project.
    pub project_id: ProjectId,
    /// Agent role.
    pub role: AgentRole,
    /// Selected strategy.
    pub strategy: Strategy,
    /// Team member captured at spawn.
    pub team_member: Option<TeamMemberSnapshot>,
    /// Coordinator that requested the spawn.
    pub parent_session_id: Option<SessionId>,
}

/// Session aggregate root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    id: SessionId,
    project_id: ProjectId,
    task_ids: Vec<TaskId>,
    status: SessionStatus,
    role: AgentRole,
    strategy: Strategy,
    phase: Phase,
    team_member: Option<TeamMemberSnapshot>,
    command_allowlist: Vec<CommandName>,
    env: BTreeMap<String, String>,
    parent_session_id: Option<SessionId>,
    spawn_handle: Option<SpawnHandle>,
    timeline: Vec<TimelineEntry>,
    revision: u64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    ended_at: Option<DateTime<Utc>>,
}

impl Session {
    /// Creates a session in `spawning`, at the strategy's initial phase.
    ///
    /// # Errors
    ///
    /// Returns [`SessionDomainError::RoleModeMismatch`] when the role does
    /// not match the strategy's mode.
    pub fn new(request: NewSession, clock: &impl Clock) -> Result<Self, SessionDomainError> {
        if request.role.mode() != request.strategy.mode() {
            return Err(SessionDomainError::RoleModeMismatch {
                role: request.role,
                strategy: request.strategy,
            });
        }
        let timestamp = clock.utc();
        Ok(Self {
            id: request.id,
            project_id: request.project_id,
            task_ids: Vec::new(),
            status: SessionStatus::Spawning,
            role: request.role,
            strategy: request.strategy,
            phase: request.strategy.initial_phase(),
            team_member: request.team_member,
            command_allowlist: Vec::new(),
            env: BTreeMap::new(),
            parent_session_id: request.parent_session_id,
            spawn_handle: None,
            timeline: vec![TimelineEntry {
                occurred_at: timestamp,
                kind: TimelineKind::Created,
                message: format!("{} session created ({})", request.role, request.strategy),
                task_id: None,
            }],
            revision: 0,
            created_at: timestamp,
            updated_at: timestamp,
            ended_at: None,
        })
    }

    /// Returns the session identifier.
    #[must_use]
    pub const fn id(&self) -> SessionId {
        self.id
    }

    /// Returns the owning project.
    #[must_use]
    pub const fn project_id(&self) -> ProjectId {
        self.project_id
    }

    /// Returns the linked tasks.
    #[must_use]
    pub fn task_ids(&self) -> &[TaskId] {
        &self.task_ids
    }

    /// Returns the lifecycle status.
    #[must_use]
    pub const fn status(&self) -> SessionStatus {
        self.status
    }

    /// Returns the agent role.
    #[must_use]
    pub const fn role(&self) -> AgentRole {
        self.role
    }

    /// Returns the session mode.
    #[must_use]
    pub const fn mode(&self) -> SessionMode {
        self.strategy.mode()
    }

    /// Returns the strategy.
    #[must_use]
    pub const fn strategy(&self) -> Strategy {
        self.strategy
    }

    /// Returns the current strategy phase.
    #[must_use]
    pub const fn phase(&self) -> Phase {
        self.phase
    }

    /// Returns the team member captured at spawn.
    #[must_use]
    pub const fn team_member(&self) -> Option<&TeamMemberSnapshot> {
        self.team_member.as_ref()
    }

    /// Returns the compiled command allowlist.
    #[must_use]
    pub fn command_allowlist(&self) -> &[CommandName] {
        &self.command_allowlist
    }

    /// Returns the spawn environment.
    #[must_use]
    pub const fn env(&self) -> &BTreeMap<String, String> {
        &self.env
    }

    /// Returns the coordinator that spawned this session.
    #[must_use]
    pub const fn parent_session_id(&self) -> Option<SessionId> {
        self.parent_session_id
    }

    /// Returns the process handle once spawned.
    #[must_use]
    pub const fn spawn_handle(&self) -> Option<&SpawnHandle> {
        self.spawn_handle.as_ref()
    }

    /// Returns the timeline.
    #[must_use]
    pub fn timeline(&self) -> &[TimelineEntry] {
        &self.timeline
    }

    /// Returns the optimistic-concurrency revision.
    #[must_use]
    pub const fn revision(&self) -> u64 {
        self.revision
    }

    /// Returns the creation timestamp.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns the latest modification timestamp.
    #[must_use]
    pub const fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Returns when the session reached a terminal status.
    #[must_use]
    pub const fn ended_at(&self) -> Option<DateTime<Utc>> {
        self.ended_at
    }

    /// Returns `true` once the session has ended.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Returns `true` when `command` is on the compiled allowlist.
    #[must_use]
    pub fn permits(&self, command: CommandName) -> bool {
        self.command_allowlist.contains(&command)
    }

    /// Returns a copy stamped with the given revision.
    #[must_use]
    pub const fn with_revision(mut self, revision: u64) -> Self {
        self.revision = revision;
        self
    }

    /// Records the compiled allowlist and spawn environment.
    pub fn configure(
        &mut self,
        command_allowlist: Vec<CommandName>,
        env: BTreeMap<String, String>,
        clock: &impl Clock,
    ) {
        self.command_allowlist = command_allowlist;
        self.env = env;
        self.touch(clock);
    }

    /// Records the spawned process.
    pub fn attach_process(&mut self, handle: SpawnHandle, clock: &impl Clock) {
        let message = handle.pid.map_or_else(
            || format!("process {} started", handle.id),
            |pid| format!("process {} started (pid {pid})", handle.id),
        );
        self.spawn_handle = Some(handle);
        self.record(TimelineKind::Process, message, None, clock);
    }

    /// Moves to `target`. Returns `false` when already there.
    ///
    /// # Errors
    ///
    /// Returns [`SessionDomainError::InvalidStatusTransition`] when the state
    /// machine forbids the change.
    pub fn transition_to(
        &mut self,
        target: SessionStatus,
        reason: &str,
        clock: &impl Clock,
    ) -> Result<bool, SessionDomainError> {
        if self.status == target && !target.is_terminal() {
            return Ok(false);
        }
        if !self.status.can_transition_to(target) {
            return Err(SessionDomainError::InvalidStatusTransition {
                session_id: self.id,
                from: self.status,
                to: target,
            });
        }
        let from = self.status;
        self.status = target;
        if target.is_terminal() {
            self.ended_at = Some(clock.utc());
        }
        let message = if reason.is_empty() {
            format!("{from} -> {target}")
        } else {
            format!("{from} -> {target}: {reason}")
        };
        self.record(TimelineKind::Status, message, None, clock);
        Ok(true)
    }

    /// Moves the strategy to `phase`. Returns `false` when already there.
    pub fn set_phase(&mut self, phase: Phase, clock: &impl Clock) -> bool {
        if self.phase == phase {
            return false;
        }
        let message = format!("phase {} -> {phase}", self.phase);
        self.phase = phase;
        self.record(TimelineKind::Phase, message, None, clock);
        true
    }

    /// Appends a timeline entry.
    pub fn record(
        &mut self,
        kind: TimelineKind,
        message: impl Into<String>,
        task_id: Option<TaskId>,
        clock: &impl Clock,
    ) {
        let occurred_at = clock.utc();
        self.timeline.push(TimelineEntry {
            occurred_at,
            kind,
            message: message.into(),
            task_id,
        });
        self.updated_at = occurred_at;
    }

    /// Adds a task reference. Returns `false` if it was already present.
    ///
    /// Only association adapters call this, together with the mirrored
    /// task-side change.
    pub fn attach_task(&mut self, task_id: TaskId) -> bool {
        if self.task_ids.contains(&task_id) {
            return false;
        }
        self.task_ids.push(task_id);
        true
    }

    /// Removes a task reference. Returns `false` if it was absent.
    pub fn detach_task(&mut self, task_id: TaskId) -> bool {
        let before = self.task_ids.len();
        self.task_ids.retain(|id| *id != task_id);
        before != self.task_ids.len()
    }

    fn touch(&mut self, clock: &impl Clock) {
        self.updated_at = clock.utc();
    }
}
