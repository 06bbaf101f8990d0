//! Team member records, defaults, and project overrides.

use super::TeamDomainError;
use crate::strategy::{AgentRole, SessionMode, Strategy};
use crate::task::domain::ProjectId;
use chrono::{DateTime, Utc};
use mockable::Clock;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a team member.
///
/// Defaults use stable slugs (`worker`, `coordinator`, `batch-coordinator`);
/// custom members get a generated `member-<uuid>` identifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TeamMemberId(String);

impl TeamMemberId {
    /// Wraps an identifier.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Generates an identifier for a custom member.
    #[must_use]
    pub fn generate() -> Self {
        Self(format!("member-{}", uuid::Uuid::new_v4()))
    }

    /// Returns the identifier text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TeamMemberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle status of a team member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TeamMemberStatus {
    /// Available for assignment.
    Active,
    /// Hidden from assignment.
    Archived,
}

/// Whether a member is code-defined or user-created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TeamMemberKind {
    /// Code-defined; editable only through project overrides.
    Default,
    /// User-created; fully mutable.
    Custom,
}

/// Field changes for a team member. `None` keeps the current value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamMemberPatch {
    /// Display name.
    pub name: Option<String>,
    /// Strategy, which also fixes the mode.
    pub strategy: Option<Strategy>,
    /// Identity text injected into prompts.
    pub identity: Option<String>,
    /// Capability tags.
    pub capabilities: Option<Vec<String>>,
    /// Model identifier.
    pub model: Option<String>,
}

impl TeamMemberPatch {
    /// Returns `true` when the patch changes nothing.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.strategy.is_none()
            && self.identity.is_none()
            && self.capabilities.is_none()
            && self.model.is_none()
    }

    /// Layers `newer` on top of this patch, field by field.
    #[must_use]
    pub fn merged(mut self, newer: &Self) -> Self {
        if newer.name.is_some() {
            self.name.clone_from(&newer.name);
        }
        if newer.strategy.is_some() {
            self.strategy = newer.strategy;
        }
        if newer.identity.is_some() {
            self.identity.clone_from(&newer.identity);
        }
        if newer.capabilities.is_some() {
            self.capabilities.clone_from(&newer.capabilities);
        }
        if newer.model.is_some() {
            self.model.clone_from(&newer.model);
        }
        self
    }
}

/// Project-scoped override stored for a default member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamMemberOverride {
    /// Project the override applies to.
    pub project_id: ProjectId,
    /// Default member being overridden.
    pub member_id: TeamMemberId,
    /// Overridden fields.
    pub patch: TeamMemberPatch,
    /// Overridden status.
    pub status: Option<TeamMemberStatus>,
    /// Optimistic-concurrency revision.
    pub revision: u64,
}

/// Parameters for a custom team member.
#[derive(Debug, Clone)]
pub struct NewTeamMember {
    /// Owning project.
    pub project_id: ProjectId,
    /// Display name.
    pub name: String,
    /// Strategy, which also fixes the mode.
    pub strategy: Strategy,
    /// Identity text.
    pub identity: String,
    /// Capability tags.
    pub capabilities: Vec<String>,
    /// Model identifier.
    pub model: Option<String>,
}

/// A resolved team member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamMember {
    id: TeamMemberId,
    project_id: ProjectId,
    name: String,
    strategy: Strategy,
    identity: String,
    capabilities: Vec<String>,
    model: Option<String>,
    status: TeamMemberStatus,
    kind: TeamMemberKind,
    revision: u64,
    updated_at: Option<DateTime<Utc>>,
}

impl TeamMember {
    /// Creates a custom member.
    ///
    /// # Errors
    ///
    /// Returns [`TeamDomainError::EmptyName`] when the name is blank.
    pub fn custom(request: NewTeamMember, clock: &impl Clock) -> Result<Self, TeamDomainError> {
        let name = request.name.trim();
        if name.is_empty() {
            return Err(TeamDomainError::EmptyName);
        }
        Ok(Self {
            id: TeamMemberId::generate(),
            project_id: request.project_id,
            name: name.to_owned(),
            strategy: request.strategy,
            identity: request.identity,
            capabilities: request.capabilities,
            model: request.model,
            status: TeamMemberStatus::Active,
            kind: TeamMemberKind::Custom,
            revision: 0,
            updated_at: Some(clock.utc()),
        })
    }

    /// Returns the code-defined defaults for a project.
    #[must_use]
    pub fn defaults(project_id: ProjectId) -> Vec<Self> {
        vec![
            Self::default_member(
                project_id,
                "worker",
                "Worker",
                Strategy::SIMPLE,
                "You implement the tasks assigned to you and report progress as you go.",
            ),
            Self::default_member(
                project_id,
                "coordinator",
                "Coordinator",
                Strategy::DEFAULT,
                "You break work into subtasks and delegate each one to a worker.",
            ),
            Self::default_member(
                project_id,
                "batch-coordinator",
                "Batch Coordinator",
                Strategy::BATCHING,
                "You group independent subtasks into batches and run each batch in parallel.",
            ),
        ]
    }

    fn default_member(
        project_id: ProjectId,
        id: &str,
        name: &str,
        strategy: Strategy,
        identity: &str,
    ) -> Self {
        Self {
            id: TeamMemberId::new(id),
            project_id,
            name: name.to_owned(),
            strategy,
            identity: identity.to_owned(),
            capabilities: Vec::new(),
            model: None,
            status: TeamMemberStatus::Active,
            kind: TeamMemberKind::Default,
            revision: 0,
            updated_at: None,
        }
    }

    /// Returns the identifier.
    #[must_use]
    pub const fn id(&self) -> &TeamMemberId {
        &self.id
    }

    /// Returns the owning project.
    #[must_use]
    pub const fn project_id(&self) -> ProjectId {
        self.project_id
    }

    /// Returns the display name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the mode implied by the strategy.
    #[must_use]
    pub const fn mode(&self) -> SessionMode {
        self.strategy.mode()
    }

    /// Returns the role implied by the strategy.
    #[must_use]
    pub const fn role(&self) -> AgentRole {
        self.strategy.mode().role()
    }

    /// Returns the strategy.
    #[must_use]
    pub const fn strategy(&self) -> Strategy {
        self.strategy
    }

    /// Returns the identity text.
    #[must_use]
    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// Returns the capability tags.
    #[must_use]
    pub fn capabilities(&self) -> &[String] {
        &self.capabilities
    }

    /// Returns the model identifier.
    #[must_use]
    pub fn model(&self) -> Option<&str> {
        self.model.as_deref()
    }

    /// Returns the lifecycle status.
    #[must_use]
    pub const fn status(&self) -> TeamMemberStatus {
        self.status
    }

    /// Returns whether the member is a default or custom.
    #[must_use]
    pub const fn kind(&self) -> TeamMemberKind {
        self.kind
    }

    /// Returns `true` for archived members.
    #[must_use]
    pub fn is_archived(&self) -> bool {
        self.status == TeamMemberStatus::Archived
    }

    /// Returns the optimistic-concurrency revision.
    #[must_use]
    pub const fn revision(&self) -> u64 {
        self.revision
    }

    /// Returns the latest modification timestamp; `None` for untouched
    /// defaults.
    #[must_use]
    pub const fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }

    /// Returns a copy stamped with the given revision.
    #[must_use]
    pub const fn with_revision(mut self, revision: u64) -> Self {
        self.revision = revision;
        self
    }

    /// Applies field changes.
    ///
    /// # Errors
    ///
    /// Returns [`TeamDomainError::EmptyName`] when the new name is blank.
    pub fn apply(&mut self, patch: &TeamMemberPatch, clock: &impl Clock) -> Result<(), TeamDomainError> {
        if let Some(name) = &patch.name {
            let trimmed = name.trim();
            if trimmed.is_empty() {
                return Err(TeamDomainError::EmptyName);
            }
            trimmed.clone_into(&mut self.name);
        }
        if let Some(strategy) = patch.strategy {
            self.strategy = strategy;
        }
        if let Some(identity) = &patch.identity {
            identity.clone_into(&mut self.identity);
        }
        if let Some(capabilities) = &patch.capabilities {
            capabilities.clone_into(&mut self.capabilities);
        }
        if let Some(model) = &patch.model {
            self.model = Some(model.clone());
        }
        self.updated_at = Some(clock.utc());
        Ok(())
    }

    /// Sets the lifecycle status.
    pub fn set_status(&mut self, status: TeamMemberStatus, clock: &impl Clock) {
        self.status = status;
        self.updated_at = Some(clock.utc());
    }

    /// Applies a stored override to a default member.
    ///
    /// # Errors
    ///
    /// Returns [`TeamDomainError::EmptyName`] when the override carries a
    /// blank name.
    pub fn with_override(
        mut self,
        record: &TeamMemberOverride,
        clock: &impl Clock,
    ) -> Result<Self, TeamDomainError> {
        self.apply(&record.patch, clock)?;
        if let Some(status) = record.status {
            self.status = status;
        }
        self.revision = record.revision;
        Ok(self)
    }

    /// Captures the fields a session keeps for its lifetime.
    #[must_use]
    pub fn snapshot(&self) -> TeamMemberSnapshot {
        TeamMemberSnapshot {
            id: self.id.clone(),
            name: self.name.clone(),
            mode: self.mode(),
            strategy: self.strategy,
            identity: self.identity.clone(),
            capabilities: self.capabilities.clone(),
            model: self.model.clone(),
        }
    }
}

/// Immutable copy of a team member captured at spawn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamMemberSnapshot {
    /// Member identifier.
    pub id: TeamMemberId,
    /// Display name.
    pub name: String,
    /// Mode at spawn.
    pub mode: SessionMode,
    /// Strategy at spawn.
    pub strategy: Strategy,
    /// Identity text.
    pub identity: String,
    /// Capability tags.
    pub capabilities: Vec<String>,
    /// Model identifier.
    pub model: Option<String>,
}
