//! Repository ports for task and project persistence.

use crate::error::{EntityRef, OrchestrationError};
use crate::task::domain::{Project, ProjectId, Task, TaskId};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Result type for task repository operations.
pub type TaskRepositoryResult<T> = Result<T, TaskRepositoryError>;

/// Task persistence contract.
///
/// `update` is compare-and-swap: the stored revision must equal the revision
/// carried by the task being written, and the stored copy comes back with the
/// revision bumped.
#[async_trait]
pub trait TaskRepository: Send + Sync {
    /// Stores a new task.
    ///
    /// # Errors
    ///
    /// Returns [`TaskRepositoryError::DuplicateTask`] when the ID exists.
    async fn store(&self, task: &Task) -> TaskRepositoryResult<()>;

    /// Persists changes to an existing task and returns the stored copy.
    ///
    /// # Errors
    ///
    /// Returns [`TaskRepositoryError::NotFound`] when the task does not exist
    /// and [`TaskRepositoryError::RevisionConflict`] when the task was
    /// modified since it was read.
    async fn update(&self, task: &Task) -> TaskRepositoryResult<Task>;

    /// Deletes a task and detaches it from every linked session in the same
    /// unit of work. Returns the deleted task.
    ///
    /// # Errors
    ///
    /// Returns [`TaskRepositoryError::NotFound`] when the task does not exist.
    async fn delete(&self, id: TaskId) -> TaskRepositoryResult<Task>;

    /// Finds a task by identifier.
    async fn find_by_id(&self, id: TaskId) -> TaskRepositoryResult<Option<Task>>;

    /// Returns the tasks that exist among `ids`, in the order given.
    async fn find_many(&self, ids: &[TaskId]) -> TaskRepositoryResult<Vec<Task>>;

    /// Returns every task in a project.
    async fn list_by_project(&self, project_id: ProjectId) -> TaskRepositoryResult<Vec<Task>>;

    /// Returns the direct children of a task.
    async fn find_children(&self, parent_id: TaskId) -> TaskRepositoryResult<Vec<Task>>;
}

/// Errors returned by task repository implementations.
#[derive(Debug, Clone, Error)]
pub enum TaskRepositoryError {
    /// A task with the same identifier already exists.
    #[error("duplicate task identifier: {0}")]
    DuplicateTask(TaskId),

    /// The task was not found.
    #[error("task not found: {0}")]
    NotFound(TaskId),

    /// The task changed since it was read.
    #[error("task {id} revision conflict: expected {expected}, found {found}")]
    RevisionConflict {
        /// Task identifier.
        id: TaskId,
        /// Revision carried by the write.
        expected: u64,
        /// Revision currently stored.
        found: u64,
    },

    /// Persistence-layer failure.
    #[error("persistence error: {0}")]
    Persistence(Arc<dyn std::error::Error + Send + Sync>),
}

impl TaskRepositoryError {
    /// Wraps a persistence error.
    pub fn persistence(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Persistence(Arc::new(err))
    }
}

impl From<TaskRepositoryError> for OrchestrationError {
    fn from(error: TaskRepositoryError) -> Self {
        match error {
            TaskRepositoryError::DuplicateTask(id) => {
                Self::state_conflict(error.to_string()).with_entity(EntityRef::task(id))
            }
            TaskRepositoryError::NotFound(id) => Self::not_found(EntityRef::task(id)),
            TaskRepositoryError::RevisionConflict { id, .. } => {
                Self::state_conflict(error.to_string()).with_entity(EntityRef::task(id))
            }
            TaskRepositoryError::Persistence(_) => Self::storage(error.to_string()),
        }
    }
}

/// Result type for project repository operations.
pub type ProjectRepositoryResult<T> = Result<T, ProjectRepositoryError>;

/// Project persistence contract.
#[async_trait]
pub trait ProjectRepository: Send + Sync {
    /// Stores a new project.
    ///
    /// # Errors
    ///
    /// Returns [`ProjectRepositoryError::DuplicateProject`] when the ID exists.
    async fn store_project(&self, project: &Project) -> ProjectRepositoryResult<()>;

    /// Finds a project by identifier.
    async fn find_project(&self, id: ProjectId) -> ProjectRepositoryResult<Option<Project>>;

    /// Lists every project.
    async fn list_projects(&self) -> ProjectRepositoryResult<Vec<Project>>;
}

/// Errors returned by project repository implementations.
#[derive(Debug, Clone, Error)]
pub enum ProjectRepositoryError {
    /// A project with the same identifier already exists.
    #[error("duplicate project identifier: {0}")]
    DuplicateProject(ProjectId),

    /// Persistence-layer failure.
    #[error("persistence error: {0}")]
    Persistence(Arc<dyn std::error::Error + Send + Sync>),
}

impl ProjectRepositoryError {
    /// Wraps a persistence error.
    pub fn persistence(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Persistence(Arc::new(err))
    }
}

impl From<ProjectRepositoryError> for OrchestrationError {
    fn from(error: ProjectRepositoryError) -> Self {
        match error {
            ProjectRepositoryError::DuplicateProject(id) => {
                Self::state_conflict(error.to_string()).with_entity(EntityRef::project(id))
            }
            ProjectRepositoryError::Persistence(_) => Self::storage(error.to_string()),
        }
    }
}
