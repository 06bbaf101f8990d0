//! Agent command channel.
//!
//! Agent processes send JSON commands (`{"command": "queue:start", ...}`)
//! back to the core. [`CommandGateway`] checks each one against the
//! session's compiled allowlist and its strategy phase before dispatching
//! it to the task, queue, or session services. Accepted and rejected
//! commands both land on the session timeline.

pub mod command;
mod gateway;

pub use command::{AgentCommand, CommandResponse};
pub use gateway::CommandGateway;

#[cfg(test)]
mod tests;
