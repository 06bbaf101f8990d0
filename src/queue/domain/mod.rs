//! Domain model for the queue worker strategy.

mod error;
mod queue;

pub use error::QueueError;
pub use queue::{QueueCounts, QueueItem, QueueItemStatus, QueueState};
