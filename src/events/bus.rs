//! In-process broadcast bus for domain events.
//!
//! The mutation layer publishes synchronously right after each successful
//! change; subscribers receive envelopes asynchronously through a bounded
//! broadcast channel. Nothing is persisted or replayed: a subscriber that
//! falls behind gets a [`BusMessage::Resync`] and must refetch.

use super::{DomainEvent, EventEnvelope, EventSink};
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// Default channel capacity.
pub const DEFAULT_BUS_CAPACITY: usize = 1024;

/// What a subscription yields.
#[derive(Debug, Clone)]
pub enum BusMessage {
    /// Next envelope, in publish order.
    Event(Arc<EventEnvelope>),
    /// The subscriber fell behind and `missed` envelopes were dropped.
    Resync {
        /// Number of envelopes skipped.
        missed: u64,
    },
}

struct BusState {
    sender: Option<broadcast::Sender<Arc<EventEnvelope>>>,
    next_sequence: u64,
}

/// Event bus owned by the composition root.
pub struct EventBus {
    state: Mutex<BusState>,
    sinks: Mutex<JoinSet<()>>,
}

impl EventBus {
    /// Creates a bus with the given channel capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            state: Mutex::new(BusState {
                sender: Some(sender),
                next_sequence: 1,
            }),
            sinks: Mutex::new(JoinSet::new()),
        }
    }

    /// Publishes an event and returns its sequence number.
    ///
    /// Sequence assignment and send happen under one lock so every
    /// subscriber observes strictly increasing sequences. Publishing after
    /// [`EventBus::shutdown`] is a no-op that returns `None`.
    pub fn publish(&self, event: DomainEvent, occurred_at: DateTime<Utc>) -> Option<u64> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let sequence = state.next_sequence;
        let sender = state.sender.as_ref()?;
        let name = event.name();
        let envelope = Arc::new(EventEnvelope {
            sequence,
            occurred_at,
            event,
        });
        // No receivers is not an error; the event is simply unobserved.
        let receivers = sender.send(envelope).unwrap_or(0);
        state.next_sequence = sequence + 1;
        debug!(sequence, event = name, receivers, "event published");
        Some(sequence)
    }

    /// Subscribes to envelopes published from now on.
    #[must_use]
    pub fn subscribe(&self) -> EventSubscription {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        EventSubscription {
            receiver: state.sender.as_ref().map(broadcast::Sender::subscribe),
        }
    }

    /// Returns the number of live subscriptions.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state
            .sender
            .as_ref()
            .map_or(0, broadcast::Sender::receiver_count)
    }

    /// Forwards every subsequent envelope to `sink` on a background task.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn attach_sink(&self, sink: Arc<dyn EventSink>) {
        let mut subscription = self.subscribe();
        let mut sinks = self.sinks.lock().unwrap_or_else(PoisonError::into_inner);
        sinks.spawn(async move {
            while let Some(message) = subscription.next().await {
                match message {
                    BusMessage::Event(envelope) => sink.deliver(&envelope).await,
                    BusMessage::Resync { missed } => sink.resync(missed).await,
                }
            }
        });
    }

    /// Closes the bus and waits for attached sinks to drain.
    ///
    /// Envelopes already buffered are still delivered. Subscriptions end
    /// once they have consumed them.
    pub async fn shutdown(&self) {
        let sender = {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            state.sender.take()
        };
        drop(sender);
        let mut sinks = {
            let mut guard = self.sinks.lock().unwrap_or_else(PoisonError::into_inner);
            std::mem::take(&mut *guard)
        };
        let count = sinks.len();
        while let Some(result) = sinks.join_next().await {
            if let Err(error) = result {
                warn!(error = %error, "event sink task ended abnormally");
            }
        }
        info!(sinks = count, "event bus shut down");
    }

    /// Returns `true` once [`EventBus::shutdown`] has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.sender.is_none()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_BUS_CAPACITY)
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("closed", &self.is_closed())
            .field("subscribers", &self.subscriber_count())
            .finish_non_exhaustive()
    }
}

/// One subscriber's view of the bus.
#[derive(Debug)]
pub struct EventSubscription {
    receiver: Option<broadcast::Receiver<Arc<EventEnvelope>>>,
}

impl EventSubscription {
    /// Waits for the next message. Returns `None` once the bus is closed and
    /// drained.
    pub async fn next(&mut self) -> Option<BusMessage> {
        let receiver = self.receiver.as_mut()?;
        match receiver.recv().await {
            Ok(envelope) => Some(BusMessage::Event(envelope)),
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                debug!(missed, "subscriber lagged");
                Some(BusMessage::Resync { missed })
            }
            Err(broadcast::error::RecvError::Closed) => {
                self.receiver = None;
                None
            }
        }
    }
}
