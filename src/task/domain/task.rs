//! Task aggregate root and related task lifecycle types.

use super::{ParseTaskFieldError, ProjectId, TaskDomainError, TaskId};
use crate::session::domain::SessionId;
use crate::team::domain::TeamMemberId;
use chrono::{DateTime, Utc};
use mockable::Clock;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Task lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Work has not started.
    Todo,
    /// Work is underway.
    InProgress,
    /// Work finished successfully.
    Completed,
    /// Work was abandoned.
    Cancelled,
    /// Work is waiting on something external.
    Blocked,
}

impl TaskStatus {
    /// Returns the canonical storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Todo => "todo",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::Blocked => "blocked",
        }
    }

    /// Returns `true` for `completed` and `cancelled`.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }

    /// Returns whether the status may change to `target`.
    ///
    /// Terminal tasks may only be reopened to `todo`.
    #[must_use]
    pub const fn can_transition_to(self, target: Self) -> bool {
        match (self, target) {
            (Self::Todo, Self::Todo)
            | (Self::InProgress, Self::InProgress)
            | (Self::Blocked, Self::Blocked) => false,
            (Self::Completed | Self::Cancelled, Self::Todo) => true,
            (Self::Completed | Self::Cancelled, _) => false,
            _ => true,
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for TaskStatus {
    type Error = ParseTaskFieldError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.trim().to_ascii_lowercase().as_str() {
            "todo" => Ok(Self::Todo),
            "in_progress" => Ok(Self::InProgress),
            "completed" => Ok(Self::Completed),
            "cancelled" => Ok(Self::Cancelled),
            "blocked" => Ok(Self::Blocked),
            _ => Err(ParseTaskFieldError {
                field: "status",
                value: value.to_owned(),
            }),
        }
    }
}

/// Task priority.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    /// Low priority.
    Low,
    /// Default priority.
    #[default]
    Medium,
    /// High priority.
    High,
    /// Must be handled first.
    Critical,
}

impl TaskPriority {
    /// Returns the canonical storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for TaskPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for TaskPriority {
    type Error = ParseTaskFieldError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            "critical" => Ok(Self::Critical),
            _ => Err(ParseTaskFieldError {
                field: "priority",
                value: value.to_owned(),
            }),
        }
    }
}

/// Most recent session activity recorded against a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskSessionStatus {
    /// Waiting in a worker queue.
    Queued,
    /// A session is being spawned for the task.
    Spawning,
    /// The session is alive but not actively working.
    Idle,
    /// The session is working on the task.
    Working,
    /// The session reported it is blocked.
    Blocked,
    /// The session finished the task.
    Completed,
    /// The session failed while working on the task.
    Failed,
    /// The queue skipped the task.
    Skipped,
    /// The session was stopped.
    Stopped,
}

impl TaskSessionStatus {
    /// Returns the canonical storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Spawning => "spawning",
            Self::Idle => "idle",
            Self::Working => "working",
            Self::Blocked => "blocked",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
            Self::Stopped => "stopped",
        }
    }
}

impl fmt::Display for TaskSessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parameter object for creating a task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTask {
    /// Owning project.
    pub project_id: ProjectId,
    /// Parent task, if this is a subtask.
    pub parent_id: Option<TaskId>,
    /// Task title.
    pub title: String,
    /// Free-form description.
    pub description: String,
    /// Task priority.
    pub priority: TaskPriority,
    /// Acceptance criteria, one per entry.
    pub acceptance_criteria: Vec<String>,
    /// Tasks that must complete before this one can start.
    pub dependencies: Vec<TaskId>,
    /// Assigned team member, if any.
    pub team_member_id: Option<TeamMemberId>,
}

impl NewTask {
    /// Creates a request with the required fields.
    #[must_use]
    pub fn new(project_id: ProjectId, title: impl Into<String>) -> Self {
        Self {
            project_id,
            parent_id: None,
            title: title.into(),
            description: String::new(),
            priority: TaskPriority::default(),
            acceptance_criteria: Vec::new(),
            dependencies: Vec::new(),
            team_member_id: None,
        }
    }

    /// Sets the parent task.
    #[must_use]
    pub const fn with_parent(mut self, parent_id: TaskId) -> Self {
        self.parent_id = Some(parent_id);
        self
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Sets the priority.
    #[must_use]
    pub const fn with_priority(mut self, priority: TaskPriority) -> Self {
        self.priority = priority;
        self
    }

    /// Sets the acceptance criteria.
    #[must_use]
    pub fn with_acceptance_criteria(
        mut self,
        criteria: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.acceptance_criteria = criteria.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the dependency edges.
    #[must_use]
    pub fn with_dependencies(mut self, dependencies: impl IntoIterator<Item = TaskId>) -> Self {
        self.dependencies = dependencies.into_iter().collect();
        self
    }

    /// Assigns a team member.
    #[must_use]
    pub fn with_team_member(mut self, team_member_id: TeamMemberId) -> Self {
        self.team_member_id = Some(team_member_id);
        self
    }
}

/// Partial update applied to an existing task.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskPatch {
    /// Replacement title.
    pub title: Option<String>,
    /// Replacement description.
    pub description: Option<String>,
    /// Replacement priority.
    pub priority: Option<TaskPriority>,
    /// Replacement acceptance criteria.
    pub acceptance_criteria: Option<Vec<String>>,
    /// Replacement team member assignment.
    pub team_member_id: Option<Option<TeamMemberId>>,
}

/// Task aggregate root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    id: TaskId,
    project_id: ProjectId,
    parent_id: Option<TaskId>,
    title: String,
    description: String,
    status: TaskStatus,
    priority: TaskPriority,
    acceptance_criteria: Vec<String>,
    dependencies: Vec<TaskId>,
    session_ids: Vec<SessionId>,
    team_member_id: Option<TeamMemberId>,
    session_status: Option<TaskSessionStatus>,
    revision: u64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Task {
    /// Creates a new `todo` task.
    ///
    /// # Errors
    ///
    /// Returns [`TaskDomainError::EmptyTitle`] when the title is blank.
    pub fn new(request: NewTask, clock: &impl Clock) -> Result<Self, TaskDomainError> {
        let title = request.title.trim();
        if title.is_empty() {
            return Err(TaskDomainError::EmptyTitle);
        }
        let timestamp = clock.utc();
        let mut dependencies = request.dependencies;
        dependencies.dedup();

        Ok(Self {
            id: TaskId::new(),
            project_id: request.project_id,
            parent_id: request.parent_id,
            title: title.to_owned(),
            description: request.description,
            status: TaskStatus::Todo,
            priority: request.priority,
            acceptance_criteria: request.acceptance_criteria,
            dependencies,
            session_ids: Vec::new(),
            team_member_id: request.team_member_id,
            session_status: None,
            revision: 0,
            created_at: timestamp,
            updated_at: timestamp,
        })
    }

    /// Returns the task identifier.
    #[must_use]
    pub const fn id(&self) -> TaskId {
        self.id
    }

    /// Returns the owning project.
    #[must_use]
    pub const fn project_id(&self) -> ProjectId {
        self.project_id
    }

    /// Returns the parent task, if any.
    #[must_use]
    pub const fn parent_id(&self) -> Option<TaskId> {
        self.parent_id
    }

    /// Returns the title.
    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Returns the description.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Returns the lifecycle status.
    #[must_use]
    pub const fn status(&self) -> TaskStatus {
        self.status
    }

    /// Returns the priority.
    #[must_use]
    pub const fn priority(&self) -> TaskPriority {
        self.priority
    }

    /// Returns the acceptance criteria.
    #[must_use]
    pub fn acceptance_criteria(&self) -> &[String] {
        &self.acceptance_criteria
    }

    /// Returns the dependency edges.
    #[must_use]
    pub fn dependencies(&self) -> &[TaskId] {
        &self.dependencies
    }

    /// Returns the linked sessions.
    #[must_use]
    pub fn session_ids(&self) -> &[SessionId] {
        &self.session_ids
    }

    /// Returns the assigned team member.
    #[must_use]
    pub const fn team_member_id(&self) -> Option<&TeamMemberId> {
        self.team_member_id.as_ref()
    }

    /// Returns the most recent session activity.
    #[must_use]
    pub const fn session_status(&self) -> Option<TaskSessionStatus> {
        self.session_status
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

    /// Returns `true` when the status is terminal.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Returns a copy stamped with the given revision.
    ///
    /// Repository adapters call this when persisting an update.
    #[must_use]
    pub const fn with_revision(mut self, revision: u64) -> Self {
        self.revision = revision;
        self
    }

    /// Changes the lifecycle status.
    ///
    /// Only the state machine is checked here; the descendant check for
    /// completion lives in the task service because it needs the subtree.
    ///
    /// # Errors
    ///
    /// Returns [`TaskDomainError::InvalidStatusTransition`] when the status
    /// machine forbids the change.
    pub fn transition_to(
        &mut self,
        target: TaskStatus,
        clock: &impl Clock,
    ) -> Result<(), TaskDomainError> {
        if !self.status.can_transition_to(target) {
            return Err(TaskDomainError::InvalidStatusTransition {
                task_id: self.id,
                from: self.status,
                to: target,
            });
        }
        self.status = target;
        self.touch(clock);
        Ok(())
    }

    /// Records the latest session activity.
    pub fn record_session_status(&mut self, status: TaskSessionStatus, clock: &impl Clock) {
        self.session_status = Some(status);
        self.touch(clock);
    }

    /// Applies a partial update.
    ///
    /// # Errors
    ///
    /// Returns [`TaskDomainError::EmptyTitle`] when the new title is blank.
    pub fn apply(&mut self, patch: TaskPatch, clock: &impl Clock) -> Result<(), TaskDomainError> {
        if let Some(title) = patch.title {
            let trimmed = title.trim();
            if trimmed.is_empty() {
                return Err(TaskDomainError::EmptyTitle);
            }
            self.title = trimmed.to_owned();
        }
        if let Some(description) = patch.description {
            self.description = description;
        }
        if let Some(priority) = patch.priority {
            self.priority = priority;
        }
        if let Some(criteria) = patch.acceptance_criteria {
            self.acceptance_criteria = criteria;
        }
        if let Some(team_member_id) = patch.team_member_id {
            self.team_member_id = team_member_id;
        }
        self.touch(clock);
        Ok(())
    }

    /// Replaces the dependency edges.
    ///
    /// # Errors
    ///
    /// Returns [`TaskDomainError::SelfDependency`] when the list contains the
    /// task itself.
    pub fn replace_dependencies(
        &mut self,
        dependencies: Vec<TaskId>,
        clock: &impl Clock,
    ) -> Result<(), TaskDomainError> {
        if dependencies.contains(&self.id) {
            return Err(TaskDomainError::SelfDependency(self.id));
        }
        let mut unique = Vec::with_capacity(dependencies.len());
        for dependency in dependencies {
            if !unique.contains(&dependency) {
                unique.push(dependency);
            }
        }
        self.dependencies = unique;
        self.touch(clock);
        Ok(())
    }

    /// Moves the task under `parent_id`, or to the top level for `None`.
    ///
    /// Forest-wide cycle checks belong to the task service.
    ///
    /// # Errors
    ///
    /// Returns [`TaskDomainError::SelfParent`] when `parent_id` is the task
    /// itself.
    pub fn reparent(
        &mut self,
        parent_id: Option<TaskId>,
        clock: &impl Clock,
    ) -> Result<(), TaskDomainError> {
        if parent_id == Some(self.id) {
            return Err(TaskDomainError::SelfParent(self.id));
        }
        self.parent_id = parent_id;
        self.touch(clock);
        Ok(())
    }

    /// Adds a session reference. Returns `false` if it was already present.
    ///
    /// Only association adapters call this, together with the mirrored
    /// session-side change.
    pub fn attach_session(&mut self, session_id: SessionId) -> bool {
        if self.session_ids.contains(&session_id) {
            return false;
        }
        self.session_ids.push(session_id);
        true
    }

    /// Removes a session reference. Returns `false` if it was absent.
    pub fn detach_session(&mut self, session_id: SessionId) -> bool {
        let before = self.session_ids.len();
        self.session_ids.retain(|id| *id != session_id);
        before != self.session_ids.len()
    }

    fn touch(&mut self, clock: &impl Clock) {
        self.updated_at = clock.utc();
    }
}
