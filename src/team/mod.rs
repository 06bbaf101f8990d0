//! Team roster: the members a session can be spawned as.
//!
//! A member supplies default mode, strategy, model, and identity text for a
//! spawn. Default members are defined in code and customised per project
//! through override records; custom members are stored in full.

pub mod domain;
pub mod ports;
pub mod services;

#[cfg(test)]
mod tests;
