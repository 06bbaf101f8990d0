//! Port contract for queue persistence.

use crate::error::{EntityRef, OrchestrationError};
use crate::queue::domain::QueueState;
use crate::session::domain::SessionId;
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Result type for queue repository operations.
pub type QueueRepositoryResult<T> = Result<T, QueueRepositoryError>;

/// Queue persistence contract, keyed by session.
///
/// `update_queue` is compare-and-swap on the queue revision; two concurrent
/// claims read the same revision and only one write succeeds.
#[async_trait]
pub trait QueueRepository: Send + Sync {
    /// Stores a new queue.
    ///
    /// # Errors
    ///
    /// Returns [`QueueRepositoryError::DuplicateQueue`] when the session
    /// already has one.
    async fn create_queue(&self, queue: &QueueState) -> QueueRepositoryResult<()>;

    /// Finds the queue for a session.
    async fn find_queue(&self, session_id: SessionId) -> QueueRepositoryResult<Option<QueueState>>;

    /// Persists a changed queue and returns the stored copy.
    ///
    /// # Errors
    ///
    /// Returns [`QueueRepositoryError::NotFound`] or
    /// [`QueueRepositoryError::RevisionConflict`].
    async fn update_queue(&self, queue: &QueueState) -> QueueRepositoryResult<QueueState>;
}

/// Errors returned by queue repository implementations.
#[derive(Debug, Clone, Error)]
pub enum QueueRepositoryError {
    /// The session already has a queue.
    #[error("session {0} already has a queue")]
    DuplicateQueue(SessionId),

    /// The session has no queue.
    #[error("no queue for session {0}")]
    NotFound(SessionId),

    /// The queue changed since it was read.
    #[error("queue for session {session_id} revision conflict: expected {expected}, found {found}")]
    RevisionConflict {
        /// Queue owner.
        session_id: SessionId,
        /// Revision carried by the write.
        expected: u64,
        /// Revision currently stored.
        found: u64,
    },

    /// Persistence-layer failure.
    #[error("persistence error: {0}")]
    Persistence(Arc<dyn std::error::Error + Send + Sync>),
}

impl QueueRepositoryError {
    /// Wraps a persistence error.
    pub fn persistence(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Persistence(Arc::new(err))
    }
}

impl From<QueueRepositoryError> for OrchestrationError {
    fn from(error: QueueRepositoryError) -> Self {
        match error {
            QueueRepositoryError::DuplicateQueue(session_id)
            | QueueRepositoryError::RevisionConflict { session_id, .. } => {
                Self::state_conflict(error.to_string()).with_entity(EntityRef::queue(session_id))
            }
            QueueRepositoryError::NotFound(session_id) => {
                Self::not_found(EntityRef::queue(session_id))
            }
            QueueRepositoryError::Persistence(_) => Self::storage(error.to_string()),
        }
    }
}
