//! Domain model for tasks and projects.
//!
//! Tasks form a forest through `parent_id` and a DAG through `dependencies`.
//! The domain owns per-task invariants; subtree-wide invariants such as
//! "a parent completes only after its descendants" are enforced by the task
//! service, which can see the whole forest.

mod error;
mod ids;
mod project;
mod task;
mod tree;
mod verify;

pub use error::{ParseTaskFieldError, TaskDomainError};
pub use ids::{ProjectId, TaskId};
pub use project::Project;
pub use task::{NewTask, Task, TaskPatch, TaskPriority, TaskSessionStatus, TaskStatus};
pub use tree::TaskForest;
pub use verify::{ChildOutcome, ChildVerification, VerificationReport};
