//! Work queues for queue-strategy worker sessions.
//!
//! A queue is created alongside its session and holds task references in
//! FIFO order. Claims and completions go through the revision
//! compare-and-swap on [`ports::QueueRepository`], so two concurrent claims
//! can never both succeed. Every queue change is mirrored into the task's
//! status and `session_status`.

pub mod domain;
pub mod ports;
pub mod services;

#[cfg(test)]
mod tests;
