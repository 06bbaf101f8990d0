//! Port contract for team member and override persistence.

use crate::error::{EntityRef, OrchestrationError};
use crate::task::domain::ProjectId;
use crate::team::domain::{TeamMember, TeamMemberId, TeamMemberOverride};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Result type for team repository operations.
pub type TeamRepositoryResult<T> = Result<T, TeamRepositoryError>;

/// Persistence for custom members and default-member overrides.
///
/// Default members themselves are never stored.
#[async_trait]
pub trait TeamRepository: Send + Sync {
    /// Stores a new custom member.
    ///
    /// # Errors
    ///
    /// Returns [`TeamRepositoryError::DuplicateMember`] when the ID exists.
    async fn store_member(&self, member: &TeamMember) -> TeamRepositoryResult<()>;

    /// Persists changes to a custom member (revision compare-and-swap).
    ///
    /// # Errors
    ///
    /// Returns [`TeamRepositoryError::NotFound`] or
    /// [`TeamRepositoryError::RevisionConflict`].
    async fn update_member(&self, member: &TeamMember) -> TeamRepositoryResult<TeamMember>;

    /// Deletes a custom member.
    ///
    /// # Errors
    ///
    /// Returns [`TeamRepositoryError::NotFound`] when absent.
    async fn delete_member(
        &self,
        project_id: ProjectId,
        id: &TeamMemberId,
    ) -> TeamRepositoryResult<TeamMember>;

    /// Finds a custom member.
    async fn find_member(
        &self,
        project_id: ProjectId,
        id: &TeamMemberId,
    ) -> TeamRepositoryResult<Option<TeamMember>>;

    /// Lists custom members of a project.
    async fn list_members(&self, project_id: ProjectId) -> TeamRepositoryResult<Vec<TeamMember>>;

    /// Inserts or replaces an override (revision compare-and-swap when one
    /// exists) and returns the stored copy.
    ///
    /// # Errors
    ///
    /// Returns [`TeamRepositoryError::RevisionConflict`] on a stale write.
    async fn save_override(
        &self,
        record: &TeamMemberOverride,
    ) -> TeamRepositoryResult<TeamMemberOverride>;

    /// Finds the override for a default member.
    async fn find_override(
        &self,
        project_id: ProjectId,
        id: &TeamMemberId,
    ) -> TeamRepositoryResult<Option<TeamMemberOverride>>;

    /// Removes an override. Returns `false` when none existed.
    async fn delete_override(
        &self,
        project_id: ProjectId,
        id: &TeamMemberId,
    ) -> TeamRepositoryResult<bool>;
}

/// Errors returned by team repository implementations.
#[derive(Debug, Clone, Error)]
pub enum TeamRepositoryError {
    /// A member with the same identifier already exists.
    #[error("duplicate team member identifier: {0}")]
    DuplicateMember(TeamMemberId),

    /// The member was not found.
    #[error("team member not found: {0}")]
    NotFound(TeamMemberId),

    /// The record changed since it was read.
    #[error("team member {id} revision conflict: expected {expected}, found {found}")]
    RevisionConflict {
        /// Member identifier.
        id: TeamMemberId,
        /// Revision carried by the write.
        expected: u64,
        /// Revision currently stored.
        found: u64,
    },

    /// Persistence-layer failure.
    #[error("persistence error: {0}")]
    Persistence(Arc<dyn std::error::Error + Send + Sync>),
}

impl TeamRepositoryError {
    /// Wraps a persistence error.
    pub fn persistence(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Persistence(Arc::new(err))
    }
}

impl From<TeamRepositoryError> for OrchestrationError {
    fn from(error: TeamRepositoryError) -> Self {
        match error {
            TeamRepositoryError::DuplicateMember(ref id)
            | TeamRepositoryError::RevisionConflict { ref id, .. } => {
                let entity = EntityRef::team_member(id);
                Self::state_conflict(error.to_string()).with_entity(entity)
            }
            TeamRepositoryError::NotFound(ref id) => Self::not_found(EntityRef::team_member(id)),
            TeamRepositoryError::Persistence(_) => Self::storage(error.to_string()),
        }
    }
}
