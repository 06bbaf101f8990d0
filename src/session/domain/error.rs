//! Error types for session domain validation.

use super::{SessionId, SessionStatus};
use crate::error::{EntityRef, OrchestrationError};
use crate::strategy::{AgentRole, Strategy};
use thiserror::Error;

/// Errors returned while constructing or mutating sessions.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SessionDomainError {
    /// The role and the strategy's mode disagree.
    #[error("role {role} cannot run strategy {strategy}")]
    RoleModeMismatch {
        /// Requested role.
        role: AgentRole,
        /// Requested strategy.
        strategy: Strategy,
    },

    /// The requested status change is not permitted.
    #[error("invalid status transition for session {session_id}: {from} -> {to}")]
    InvalidStatusTransition {
        /// Session identifier.
        session_id: SessionId,
        /// Current status.
        from: SessionStatus,
        /// Requested status.
        to: SessionStatus,
    },

    /// The session already ended.
    #[error("session {0} is no longer active")]
    Inactive(SessionId),
}

impl From<SessionDomainError> for OrchestrationError {
    fn from(error: SessionDomainError) -> Self {
        match error {
            SessionDomainError::RoleModeMismatch { .. } => Self::validation(error.to_string()),
            SessionDomainError::InvalidStatusTransition { session_id, .. }
            | SessionDomainError::Inactive(session_id) => {
                Self::state_conflict(error.to_string()).with_entity(EntityRef::session(session_id))
            }
        }
    }
}
