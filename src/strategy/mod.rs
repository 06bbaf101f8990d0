//! Strategy engine: how worker and coordinator sessions organise their work.
//!
//! A [`Strategy`] is a closed tagged variant selected once when a session's
//! manifest is compiled. Each strategy implements [`PhaseMachine`]: an ordered
//! list of phases, a command allowlist per phase, and a transition function.
//! Coordinator strategies also have executors ([`CoordinatorEngine`]) that
//! run the spawn and monitor loop over a [`WorkerLauncher`].
//!
//! - [`kinds`]: modes, roles, and strategy identifiers
//! - [`command`]: the agent command vocabulary
//! - [`phase`]: phase machines and allowlists
//! - [`dag`], [`tree`]: planners over task dependencies
//! - [`engine`]: coordinator executors

pub mod command;
pub mod dag;
pub mod engine;
mod error;
pub mod kinds;
pub mod phase;
pub mod tree;

#[cfg(test)]
mod tests;

pub use command::CommandName;
pub use dag::{DagScheduler, DependencyGraph, NodeState};
pub use engine::{
    CoordinatorEngine, OrchestrationReport, RetryPolicies, RetryPolicy, SpawnAttempt,
    WorkerLauncher,
};
pub use error::StrategyError;
pub use kinds::{AgentRole, CoordinatorStrategy, SessionMode, Strategy, WorkerStrategy};
pub use phase::{ALWAYS_ALLOWED, Phase, PhaseMachine};
pub use tree::{PlanStep, TreePlan};
