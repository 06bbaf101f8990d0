//! Error types for task domain validation and parsing.

use super::{TaskId, TaskStatus};
use crate::error::{EntityRef, OrchestrationError};
use thiserror::Error;

/// Errors returned while constructing or mutating task values.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TaskDomainError {
    /// The task title is empty after trimming.
    #[error("task title must not be empty")]
    EmptyTitle,

    /// The project name is empty after trimming.
    #[error("project name must not be empty")]
    EmptyProjectName,

    /// A task cannot depend on itself.
    #[error("task {0} cannot depend on itself")]
    SelfDependency(TaskId),

    /// A task cannot be its own parent.
    #[error("task {0} cannot be its own parent")]
    SelfParent(TaskId),

    /// The requested status change is not permitted.
    #[error("invalid status transition for task {task_id}: {from} -> {to}")]
    InvalidStatusTransition {
        /// Task identifier.
        task_id: TaskId,
        /// Current status.
        from: TaskStatus,
        /// Requested status.
        to: TaskStatus,
    },
}

impl From<TaskDomainError> for OrchestrationError {
    fn from(error: TaskDomainError) -> Self {
        match error {
            TaskDomainError::InvalidStatusTransition { task_id, .. } => {
                Self::state_conflict(error.to_string()).with_entity(EntityRef::task(task_id))
            }
            TaskDomainError::SelfDependency(task_id) | TaskDomainError::SelfParent(task_id) => {
                Self::validation(error.to_string()).with_entity(EntityRef::task(task_id))
            }
            TaskDomainError::EmptyTitle | TaskDomainError::EmptyProjectName => {
                Self::validation(error.to_string())
            }
        }
    }
}

/// Error returned while parsing task enumerations from strings.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown task {field}: {value}")]
pub struct ParseTaskFieldError {
    /// Field being parsed.
    pub field: &'static str,
    /// Rejected value.
    pub value: String,
}

impl From<ParseTaskFieldError> for OrchestrationError {
    fn from(error: ParseTaskFieldError) -> Self {
        Self::validation(error.to_string())
    }
}
