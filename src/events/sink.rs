//! Push-only event sinks for transports outside the core.

use super::EventEnvelope;
use async_trait::async_trait;

/// Receives every envelope published on the bus. No acknowledgment.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Delivers one envelope.
    async fn deliver(&self, envelope: &EventEnvelope);

    /// Signals that `missed` envelopes were dropped; the sink should refetch
    /// whatever state it mirrors.
    async fn resync(&self, missed: u64) {
        tracing::debug!(missed, "event sink skipped envelopes");
    }
}
