//! Event bus and synchronization.
//!
//! Services publish a [`DomainEvent`] immediately after each committed
//! change. The [`EventBus`] stamps it with a sequence number and fans it out
//! to subscriptions and attached [`EventSink`]s.

mod bus;
mod event;
mod sink;

pub use bus::{BusMessage, DEFAULT_BUS_CAPACITY, EventBus, EventSubscription};
pub use event::{DomainEvent, EventEnvelope};
pub use sink::EventSink;
