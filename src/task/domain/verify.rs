//! Verification of a coordinator's subtree.

use super::{Task, TaskId, TaskSessionStatus, TaskStatus};
use serde::{Deserialize, Serialize};

/// Outcome of one child task, as seen by `verify`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChildOutcome {
    /// The task completed.
    Completed,
    /// The task was cancelled.
    Cancelled,
    /// The last session on the task failed or was stopped.
    Failed,
    /// Still open with no failed session.
    Pending,
}

impl ChildOutcome {
    /// Classifies a task.
    #[must_use]
    pub const fn of(task: &Task) -> Self {
        match (task.status(), task.session_status()) {
            (TaskStatus::Completed, _) => Self::Completed,
            (TaskStatus::Cancelled, _) => Self::Cancelled,
            (_, Some(TaskSessionStatus::Failed | TaskSessionStatus::Stopped)) => Self::Failed,
            _ => Self::Pending,
        }
    }
}

/// One line of a verification report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChildVerification {
    /// Child task.
    pub task_id: TaskId,
    /// Child title.
    pub title: String,
    /// Child status.
    pub status: TaskStatus,
    /// Classified outcome.
    pub outcome: ChildOutcome,
}

/// Per-child outcomes under a parent task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationReport {
    /// Verified parent.
    pub task_id: TaskId,
    /// Parent status.
    pub status: TaskStatus,
    /// Direct children in creation order.
    pub children: Vec<ChildVerification>,
    /// Number of descendants, at any depth, that are not terminal.
    pub open_descendants: usize,
}

impl VerificationReport {
    /// Returns the outcome recorded for `task_id`.
    #[must_use]
    pub fn outcome_of(&self, task_id: TaskId) -> Option<ChildOutcome> {
        self.children
            .iter()
            .find(|child| child.task_id == task_id)
            .map(|child| child.outcome)
    }

    /// Returns `true` when the parent may be completed.
    #[must_use]
    pub const fn is_completable(&self) -> bool {
        self.open_descendants == 0
    }

    /// Returns `true` when every child completed or was cancelled.
    #[must_use]
    pub fn all_succeeded(&self) -> bool {
        self.children
            .iter()
            .all(|child| matches!(child.outcome, ChildOutcome::Completed | ChildOutcome::Cancelled))
    }
}
