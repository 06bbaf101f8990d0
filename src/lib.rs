//! Maestro: orchestration core for fleets of AI agent processes.
//!
//! The crate turns a hierarchy of tasks into agent sessions. Each spawn is
//! configured by a manifest compiled into a deterministic system prompt; a
//! strategy decides how a session works its tasks (one at a time, through a
//! queue, down a tree, or, for coordinators, by delegating to workers in
//! sequence, in dependency batches, or as a DAG). Sessions report back
//! through a command gateway that enforces each strategy's phase allowlist.
//!
//! # Architecture
//!
//! Each bounded context follows hexagonal architecture:
//!
//! - **Domain**: pure types and invariants with no infrastructure
//! - **Ports**: async repository, spawner, and catalog traits
//! - **Services**: orchestration over the ports
//! - **Adapters**: the in-memory store, process spawners, and skill catalogs
//!
//! # Modules
//!
//! - [`task`]: tasks, projects, and the task/session association
//! - [`team`]: the per-project team roster
//! - [`manifest`]: manifest builder and prompt compiler
//! - [`strategy`]: phase machines and coordinator executors
//! - [`queue`]: work queues for queue workers
//! - [`session`]: the session supervisor and watch
//! - [`messaging`]: the agent command gateway
//! - [`events`]: the domain event bus
//! - [`orchestrator`]: the composition root

pub mod adapters;
pub mod config;
pub mod error;
pub mod events;
pub mod manifest;
pub mod messaging;
pub mod orchestrator;
pub mod queue;
pub mod session;
pub mod store;
pub mod strategy;
pub mod task;
pub mod team;
pub mod telemetry;

#[cfg(test)]
mod test_support;

pub use config::OrchestratorConfig;
pub use error::{ErrorKind, OrchestrationError, OrchestrationResult};
pub use orchestrator::{LocalOrchestrator, Orchestrator};
