//! Execution plan for the tree worker strategy.

use super::{DependencyGraph, StrategyError};
use crate::task::domain::{TaskForest, TaskId, TaskStatus};
use serde::{Deserialize, Serialize};

/// One node of a tree plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanStep {
    /// Task to work on.
    pub task_id: TaskId,
    /// Parent in the subtree; `None` for the root.
    pub parent_id: Option<TaskId>,
    /// Depth below the root.
    pub depth: usize,
    /// Task title.
    pub title: String,
    /// Status when the plan was computed.
    pub status: TaskStatus,
}

/// Dependency-ordered walk over a task subtree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreePlan {
    /// Subtree root.
    pub root: TaskId,
    /// Steps in execution order: children before their parent, siblings in
    /// dependency order.
    pub steps: Vec<PlanStep>,
}

impl TreePlan {
    /// Computes the plan for the subtree under `root`.
    ///
    /// Siblings are ordered topologically over the dependency edges between
    /// them; ties keep creation order. Each parent follows its children,
    /// since a parent only completes once every descendant is terminal.
    ///
    /// # Errors
    ///
    /// Returns [`StrategyError::DependencyCycle`] when siblings depend on each
    /// other in a cycle.
    pub fn compute(forest: &TaskForest, root: TaskId) -> Result<Self, StrategyError> {
        let mut steps = Vec::new();
        Self::visit(forest, root, None, 0, &mut steps)?;
        Ok(Self { root, steps })
    }

    /// Returns the steps that are not yet terminal.
    #[must_use]
    pub fn open_steps(&self) -> Vec<&PlanStep> {
        self.steps
            .iter()
            .filter(|step| !step.status.is_terminal())
            .collect()
    }

    fn visit(
        forest: &TaskForest,
        id: TaskId,
        parent_id: Option<TaskId>,
        depth: usize,
        steps: &mut Vec<PlanStep>,
    ) -> Result<(), StrategyError> {
        let Some(task) = forest.get(id) else {
            return Ok(());
        };
        let children = forest.children(id);
        let order = DependencyGraph::build_scoped(children.iter().copied())?.execution_order();
        for child in order {
            Self::visit(forest, child, Some(id), depth + 1, steps)?;
        }
        steps.push(PlanStep {
            task_id: id,
            parent_id,
            depth,
            title: task.title().to_owned(),
            status: task.status(),
        });
        Ok(())
    }
}
