//! Tasks, projects, and the task/session association.
//!
//! Tasks form a forest through their parent links and a dependency graph
//! through their `dependencies`. The context follows the hexagonal layout:
//!
//! - Domain types in [`domain`]
//! - Port contracts in [`ports`]
//! - The task service in [`services`]
//!
//! The in-memory adapter lives in [`crate::adapters::memory`].

pub mod domain;
pub mod ports;
pub mod services;

#[cfg(test)]
mod tests;
