//! Agent sessions: spawning, lifecycle, and supervision.
//!
//! A session is created from a compiled manifest, linked to its tasks, and
//! started through a [`ports::ProcessSpawner`]. Its process reports back
//! through the command gateway; the [`services::SessionSupervisor`] applies
//! those reports, mirrors them onto the linked tasks, and publishes every
//! change on the event bus.

pub mod domain;
pub mod ports;
pub mod services;

#[cfg(test)]
mod tests;
