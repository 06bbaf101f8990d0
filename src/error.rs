//! Crate-wide error taxonomy.
//!
//! Every context keeps its own `thiserror` enum for precise matching inside
//! the context. At service boundaries those errors convert into
//! [`OrchestrationError`], which carries the taxonomy kind, a message, and the
//! offending entity so CLI and UI layers can render failures uniformly.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Result type for orchestration-level operations.
pub type OrchestrationResult<T> = Result<T, OrchestrationError>;

/// Error taxonomy shared by every service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Malformed request, rejected before any mutation.
    Validation,
    /// A referenced task, session, project, template, or member is missing.
    NotFound,
    /// Command outside the session allowlist, or a coordinator attempting
    /// direct execution.
    PermissionDenied,
    /// The request conflicts with current state (double claim, open
    /// children, dependency cycle, stale revision).
    StateConflict,
    /// Manifest assembly or prompt compilation failed.
    ManifestGeneration,
    /// The worker process could not be spawned.
    Spawn,
    /// The backing store failed.
    Storage,
}

impl ErrorKind {
    /// Returns the canonical string representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Validation => "validation_error",
            Self::NotFound => "not_found",
            Self::PermissionDenied => "permission_denied",
            Self::StateConflict => "state_conflict",
            Self::ManifestGeneration => "manifest_generation_failure",
            Self::Spawn => "spawn_failure",
            Self::Storage => "storage_error",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of entity an error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    /// A task record.
    Task,
    /// A session record.
    Session,
    /// A project record.
    Project,
    /// A team member record.
    TeamMember,
    /// A prompt template.
    Template,
    /// The queue attached to a session.
    Queue,
    /// A spawn manifest.
    Manifest,
    /// A skill from the skill catalog.
    Skill,
    /// An agent command.
    Command,
}

impl EntityKind {
    /// Returns the canonical string representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Task => "task",
            Self::Session => "session",
            Self::Project => "project",
            Self::TeamMember => "team_member",
            Self::Template => "template",
            Self::Queue => "queue",
            Self::Manifest => "manifest",
            Self::Skill => "skill",
            Self::Command => "command",
        }
    }
}

/// Reference to the entity an error is about.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityRef {
    /// Entity kind.
    pub kind: EntityKind,
    /// Entity identifier in display form.
    pub id: String,
}

impl EntityRef {
    /// Creates an entity reference.
    #[must_use]
    pub fn new(kind: EntityKind, id: impl fmt::Display) -> Self {
        Self {
            kind,
            id: id.to_string(),
        }
    }

    /// Creates a task reference.
    #[must_use]
    pub fn task(id: impl fmt::Display) -> Self {
        Self::new(EntityKind::Task, id)
    }

    /// Creates a session reference.
    #[must_use]
    pub fn session(id: impl fmt::Display) -> Self {
        Self::new(EntityKind::Session, id)
    }

    /// Creates a project reference.
    #[must_use]
    pub fn project(id: impl fmt::Display) -> Self {
        Self::new(EntityKind::Project, id)
    }

    /// Creates a team member reference.
    #[must_use]
    pub fn team_member(id: impl fmt::Display) -> Self {
        Self::new(EntityKind::TeamMember, id)
    }

    /// Creates a template reference.
    #[must_use]
    pub fn template(id: impl fmt::Display) -> Self {
        Self::new(EntityKind::Template, id)
    }

    /// Creates a queue reference keyed by its session.
    #[must_use]
    pub fn queue(session_id: impl fmt::Display) -> Self {
        Self::new(EntityKind::Queue, session_id)
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind.as_str(), self.id)
    }
}

/// Structured orchestration error: kind, message, and offending entity.
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize, Deserialize)]
#[error("{kind}: {message}")]
pub struct OrchestrationError {
    kind: ErrorKind,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    entity: Option<EntityRef>,
}

impl OrchestrationError {
    /// Creates an error with an explicit kind.
    #[must_use]
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            entity: None,
        }
    }

    /// Attaches the offending entity.
    #[must_use]
    pub fn with_entity(mut self, entity: EntityRef) -> Self {
        self.entity = Some(entity);
        self
    }

    /// Creates a validation error.
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    /// Creates a not-found error for the given entity.
    #[must_use]
    pub fn not_found(entity: EntityRef) -> Self {
        Self::new(ErrorKind::NotFound, format!("{entity} not found")).with_entity(entity)
    }

    /// Creates a permission error.
    #[must_use]
    pub fn permission_denied(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::PermissionDenied, message)
    }

    /// Creates a state conflict error.
    #[must_use]
    pub fn state_conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::StateConflict, message)
    }

    /// Creates a manifest generation failure.
    #[must_use]
    pub fn manifest_generation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ManifestGeneration, message)
    }

    /// Creates a spawn failure.
    #[must_use]
    pub fn spawn(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Spawn, message)
    }

    /// Creates a storage failure.
    #[must_use]
    pub fn storage(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Storage, message)
    }

    /// Returns the taxonomy kind.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns the human-readable message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns the offending entity, if known.
    #[must_use]
    pub const fn entity(&self) -> Option<&EntityRef> {
        self.entity.as_ref()
    }

    /// Returns `true` when the error has the given kind.
    #[must_use]
    pub fn is(&self, kind: ErrorKind) -> bool {
        self.kind == kind
    }
}

#[cfg(test)]
mod tests {
    use super::{EntityRef, ErrorKind, OrchestrationError};
    use rstest::rstest;

    #[rstest]
    fn not_found_names_the_entity() {
        let error = OrchestrationError::not_found(EntityRef::task("t-1"));

        assert_eq!(error.kind(), ErrorKind::NotFound);
        assert_eq!(error.message(), "task:t-1 not found");
        assert_eq!(error.entity(), Some(&EntityRef::task("t-1")));
    }

    #[rstest]
    fn display_prefixes_the_kind() {
        let error = OrchestrationError::state_conflict("queue item already processing");

        assert_eq!(
            error.to_string(),
            "state_conflict: queue item already processing"
        );
    }

    #[rstest]
    fn serialises_kind_message_and_entity() {
        let error = OrchestrationError::permission_denied("nope")
            .with_entity(EntityRef::session("s-1"));

        let json = serde_json::to_value(&error).expect("error should serialise");

        assert_eq!(json["kind"], "permission_denied");
        assert_eq!(json["message"], "nope");
        assert_eq!(json["entity"]["kind"], "session");
        assert_eq!(json["entity"]["id"], "s-1");
    }
}
