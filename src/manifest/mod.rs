//! Manifest pipeline: a spawn request is resolved into a write-once
//! [`domain::Manifest`], which the compiler turns into a system layer, a task
//! layer, and a command allowlist.

pub mod domain;
pub mod ports;
pub mod services;

#[cfg(test)]
mod tests;
