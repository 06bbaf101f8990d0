//! Port for the task/session many-to-many association.
//!
//! `Task::session_ids` and `Session::task_ids` are two views of one
//! association. Adapters must change both records in a single unit of work so
//! a failure can never leave them divergent.

use crate::error::{EntityRef, OrchestrationError};
use crate::session::domain::{Session, SessionId};
use crate::task::domain::{Task, TaskId};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Result type for association operations.
pub type AssociationResult<T> = Result<T, AssociationError>;

/// Both sides of an association after a link or unlink.
#[derive(Debug, Clone, PartialEq)]
pub struct AssociationChange {
    /// Task after the change.
    pub task: Task,
    /// Session after the change.
    pub session: Session,
    /// `false` when the association was already in the requested state.
    pub changed: bool,
}

/// Association persistence contract.
#[async_trait]
pub trait AssociationRepository: Send + Sync {
    /// Links a task and a session, updating both records atomically.
    ///
    /// Linking an existing pair is a no-op reported through
    /// [`AssociationChange::changed`].
    ///
    /// # Errors
    ///
    /// Returns [`AssociationError::TaskNotFound`] or
    /// [`AssociationError::SessionNotFound`] when either side is missing; in
    /// that case neither record is modified.
    async fn link(
        &self,
        task_id: TaskId,
        session_id: SessionId,
    ) -> AssociationResult<AssociationChange>;

    /// Removes the association between a task and a session atomically.
    ///
    /// # Errors
    ///
    /// Returns [`AssociationError::TaskNotFound`] or
    /// [`AssociationError::SessionNotFound`] when either side is missing.
    async fn unlink(
        &self,
        task_id: TaskId,
        session_id: SessionId,
    ) -> AssociationResult<AssociationChange>;
}

/// Errors returned by association adapters.
#[derive(Debug, Clone, Error)]
pub enum AssociationError {
    /// The task side is missing.
    #[error("task not found: {0}")]
    TaskNotFound(TaskId),

    /// The session side is missing.
    #[error("session not found: {0}")]
    SessionNotFound(SessionId),

    /// The task and session belong to different projects.
    #[error("task {task_id} and session {session_id} belong to different projects")]
    ProjectMismatch {
        /// Task identifier.
        task_id: TaskId,
        /// Session identifier.
        session_id: SessionId,
    },

    /// Persistence-layer failure.
    #[error("persistence error: {0}")]
    Persistence(Arc<dyn std::error::Error + Send + Sync>),
}

impl AssociationError {
    /// Wraps a persistence error.
    pub fn persistence(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Persistence(Arc::new(err))
    }
}

impl From<AssociationError> for OrchestrationError {
    fn from(error: AssociationError) -> Self {
        match error {
            AssociationError::TaskNotFound(id) => Self::not_found(EntityRef::task(id)),
            AssociationError::SessionNotFound(id) => Self::not_found(EntityRef::session(id)),
            AssociationError::ProjectMismatch { task_id, .. } => {
                Self::validation(error.to_string()).with_entity(EntityRef::task(task_id))
            }
            AssociationError::Persistence(_) => Self::storage(error.to_string()),
        }
    }
}
