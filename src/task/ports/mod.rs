//! Port contracts for task, project, and association persistence.

pub mod association;
pub mod repository;

pub use association::{
    AssociationChange, AssociationError, AssociationRepository, AssociationResult,
};
pub use repository::{
    ProjectRepository, ProjectRepositoryError, ProjectRepositoryResult, TaskRepository,
    TaskRepositoryError, TaskRepositoryResult,
};
