//! Queue errors and their place in the taxonomy.

use crate::error::{EntityRef, ErrorKind, OrchestrationError};
use crate::session::domain::SessionId;
use crate::task::domain::TaskId;
use thiserror::Error;

/// Errors returned by queue operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum QueueError {
    /// Nothing is queued.
    #[error("queue for session {0} is empty")]
    EmptyQueue(SessionId),

    /// No item is being processed.
    #[error("queue for session {0} has no item in progress")]
    NoActiveItem(SessionId),

    /// The task is already queued or processing.
    #[error("task {task_id} is already in the queue for session {session_id}")]
    DuplicateItem {
        /// Queue owner.
        session_id: SessionId,
        /// Duplicate task.
        task_id: TaskId,
    },

    /// Another item is already being processed.
    #[error("queue for session {session_id} is already processing task {task_id}")]
    AlreadyProcessing {
        /// Queue owner.
        session_id: SessionId,
        /// Item in progress.
        task_id: TaskId,
    },
}

impl QueueError {
    /// Returns the taxonomy kind; every queue error is a state conflict.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        ErrorKind::StateConflict
    }

    /// Returns the queue owner.
    #[must_use]
    pub const fn session_id(&self) -> SessionId {
        match self {
            Self::EmptyQueue(session_id)
            | Self::NoActiveItem(session_id)
            | Self::DuplicateItem { session_id, .. }
            | Self::AlreadyProcessing { session_id, .. } => *session_id,
        }
    }
}

impl From<QueueError> for OrchestrationError {
    fn from(error: QueueError) -> Self {
        let entity = match &error {
            QueueError::DuplicateItem { task_id, .. }
            | QueueError::AlreadyProcessing { task_id, .. } => EntityRef::task(task_id),
            QueueError::EmptyQueue(_) | QueueError::NoActiveItem(_) => {
                EntityRef::queue(error.session_id())
            }
        };
        Self::new(error.kind(), error.to_string()).with_entity(entity)
    }
}
