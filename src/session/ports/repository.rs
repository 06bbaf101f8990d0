//! Repository port for session persistence.

use crate::error::{EntityRef, OrchestrationError};
use crate::session::domain::{Session, SessionId};
use crate::task::domain::ProjectId;
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Result type for session repository operations.
pub type SessionRepositoryResult<T> = Result<T, SessionRepositoryError>;

/// Session persistence contract.
///
/// `update` is compare-and-swap on the session revision, like
/// [`crate::task::ports::TaskRepository::update`].
#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// Stores a new session.
    ///
    /// # Errors
    ///
    /// Returns [`SessionRepositoryError::DuplicateSession`] when the ID exists.
    async fn store_session(&self, session: &Session) -> SessionRepositoryResult<()>;

    /// Persists changes to an existing session and returns the stored copy.
    ///
    /// # Errors
    ///
    /// Returns [`SessionRepositoryError::NotFound`] or
    /// [`SessionRepositoryError::RevisionConflict`].
    async fn update_session(&self, session: &Session) -> SessionRepositoryResult<Session>;

    /// Deletes a session and detaches it from every linked task in the same
    /// unit of work.
    ///
    /// # Errors
    ///
    /// Returns [`SessionRepositoryError::NotFound`] when the session does not
    /// exist.
    async fn delete_session(&self, id: SessionId) -> SessionRepositoryResult<Session>;

    /// Finds a session by identifier.
    async fn find_session(&self, id: SessionId) -> SessionRepositoryResult<Option<Session>>;

    /// Returns the sessions that exist among `ids`, in the order given.
    async fn find_sessions(&self, ids: &[SessionId]) -> SessionRepositoryResult<Vec<Session>>;

    /// Returns the sessions spawned by a coordinator, oldest first.
    async fn list_children(&self, parent_id: SessionId) -> SessionRepositoryResult<Vec<Session>>;

    /// Returns every session in a project, oldest first.
    async fn list_sessions(&self, project_id: ProjectId) -> SessionRepositoryResult<Vec<Session>>;
}

/// Errors returned by session repository implementations.
#[derive(Debug, Clone, Error)]
pub enum SessionRepositoryError {
    /// A session with the same identifier already exists.
    #[error("duplicate session identifier: {0}")]
    DuplicateSession(SessionId),

    /// The session was not found.
    #[error("session not found: {0}")]
    NotFound(SessionId),

    /// The session changed since it was read.
    #[error("session {id} revision conflict: expected {expected}, found {found}")]
    RevisionConflict {
        /// Session identifier.
        id: SessionId,
        /// Revision carried by the write.
        expected: u64,
        /// Revision currently stored.
        found: u64,
    },

    /// Persistence-layer failure.
    #[error("persistence error: {0}")]
    Persistence(Arc<dyn std::error::Error + Send + Sync>),
}

impl SessionRepositoryError {
    /// Wraps a persistence error.
    pub fn persistence(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Persistence(Arc::new(err))
    }
}

impl From<SessionRepositoryError> for OrchestrationError {
    fn from(error: SessionRepositoryError) -> Self {
        match error {
            SessionRepositoryError::DuplicateSession(id)
            | SessionRepositoryError::RevisionConflict { id, .. } => {
                Self::state_conflict(error.to_string()).with_entity(EntityRef::session(id))
            }
            SessionRepositoryError::NotFound(id) => Self::not_found(EntityRef::session(id)),
            SessionRepositoryError::Persistence(_) => Self::storage(error.to_string()),
        }
    }
}
