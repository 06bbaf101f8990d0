//! Error types for team member validation.

use super::TeamMemberId;
use crate::error::{EntityRef, OrchestrationError};
use thiserror::Error;

/// Errors returned while constructing or changing team members.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TeamDomainError {
    /// The member name is empty after trimming.
    #[error("team member name must not be empty")]
    EmptyName,

    /// Only archived custom members may be deleted.
    #[error("team member {0} must be a custom, archived member to be deleted")]
    NotDeletable(TeamMemberId),

    /// Default members cannot be removed, only reset.
    #[error("team member {0} is a default member")]
    DefaultMember(TeamMemberId),

    /// The operation only applies to default members.
    #[error("team member {0} is not a default member")]
    NotDefault(TeamMemberId),
}

impl From<TeamDomainError> for OrchestrationError {
    fn from(error: TeamDomainError) -> Self {
        match error {
            TeamDomainError::EmptyName => Self::validation(error.to_string()),
            TeamDomainError::NotDeletable(ref id) | TeamDomainError::DefaultMember(ref id) => {
                let entity = EntityRef::team_member(id);
                Self::state_conflict(error.to_string()).with_entity(entity)
            }
            TeamDomainError::NotDefault(ref id) => {
                let entity = EntityRef::team_member(id);
                Self::validation(error.to_string()).with_entity(entity)
            }
        }
    }
}
