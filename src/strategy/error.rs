//! Error types for strategy selection, phase checks, and scheduling.

use super::{CommandName, Phase, SessionMode, Strategy};
use crate::error::{EntityKind, EntityRef, OrchestrationError};
use crate::task::domain::TaskId;
use thiserror::Error;

/// Errors raised by the strategy engine.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StrategyError {
    /// Mode name is not recognised.
    #[error("unknown session mode: {0}")]
    UnknownMode(String),

    /// Role name is not recognised.
    #[error("unknown agent role: {0}")]
    UnknownRole(String),

    /// Strategy name is not recognised.
    #[error("unknown strategy: {0}")]
    UnknownStrategy(String),

    /// Command name is not recognised.
    #[error("unknown command: {0}")]
    UnknownCommand(String),

    /// Strategy belongs to the other mode.
    #[error("strategy {strategy} is not valid for mode {mode}")]
    IncompatibleStrategy {
        /// Requested strategy.
        strategy: Strategy,
        /// Session mode.
        mode: SessionMode,
    },

    /// Command is outside the current phase's allowlist.
    #[error("command {command} is not allowed in phase {phase} of strategy {strategy}")]
    CommandNotAllowed {
        /// Session strategy.
        strategy: Strategy,
        /// Current phase.
        phase: Phase,
        /// Rejected command.
        command: CommandName,
    },

    /// A coordinator attempted to execute work itself.
    #[error("coordinator strategy {strategy} cannot run {command}; delegate to a worker")]
    DirectExecutionForbidden {
        /// Session strategy.
        strategy: Strategy,
        /// Rejected command.
        command: CommandName,
    },

    /// The dependency graph contains a cycle.
    #[error("dependency cycle detected at task {0}")]
    DependencyCycle(TaskId),

    /// A dependency points at a task outside the planned set.
    #[error("task {task} depends on {dependency}, which is not part of the plan")]
    UnknownDependency {
        /// Dependent task.
        task: TaskId,
        /// Missing dependency.
        dependency: TaskId,
    },

    /// Nodes remain but none is ready or running.
    #[error("scheduling deadlock: {pending} task(s) can never become ready")]
    Deadlock {
        /// Number of unresolved nodes.
        pending: usize,
    },
}

impl From<StrategyError> for OrchestrationError {
    fn from(error: StrategyError) -> Self {
        match error {
            StrategyError::UnknownMode(_)
            | StrategyError::UnknownRole(_)
            | StrategyError::UnknownStrategy(_)
            | StrategyError::IncompatibleStrategy { .. } => Self::validation(error.to_string()),
            StrategyError::UnknownCommand(ref name) => {
                let entity = EntityRef::new(EntityKind::Command, name);
                Self::validation(error.to_string()).with_entity(entity)
            }
            StrategyError::CommandNotAllowed { command, .. }
            | StrategyError::DirectExecutionForbidden { command, .. } => {
                Self::permission_denied(error.to_string())
                    .with_entity(EntityRef::new(EntityKind::Command, command))
            }
            StrategyError::DependencyCycle(task_id) => {
                Self::state_conflict(error.to_string()).with_entity(EntityRef::task(task_id))
            }
            StrategyError::UnknownDependency { task, .. } => {
                Self::validation(error.to_string()).with_entity(EntityRef::task(task))
            }
            StrategyError::Deadlock { .. } => Self::state_conflict(error.to_string()),
        }
    }
}
