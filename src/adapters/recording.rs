//! Recording adapters for tests and embedding: a spawner that starts
//! nothing and an event sink that keeps every envelope.

use crate::events::{EventEnvelope, EventSink};
use crate::session::domain::SpawnHandle;
use crate::session::ports::{ProcessSpawner, SpawnError, SpawnRequest, SpawnResult};
use async_trait::async_trait;
use std::sync::{Arc, Mutex, PoisonError};

#[derive(Debug, Default)]
struct SpawnLog {
    requests: Vec<SpawnRequest>,
    terminated: Vec<SpawnHandle>,
    failures_pending: usize,
    next_pid: u32,
}

/// Spawner that records requests instead of starting processes.
#[derive(Debug, Clone, Default)]
pub struct RecordingSpawner {
    log: Arc<Mutex<SpawnLog>>,
}

impl RecordingSpawner {
    /// Creates a spawner with an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `count` spawn calls fail.
    pub fn fail_next(&self, count: usize) {
        let mut log = self.log.lock().unwrap_or_else(PoisonError::into_inner);
        log.failures_pending = count;
    }

    /// Returns every request that was accepted, oldest first.
    #[must_use]
    pub fn requests(&self) -> Vec<SpawnRequest> {
        let log = self.log.lock().unwrap_or_else(PoisonError::into_inner);
        log.requests.clone()
    }

    /// Returns every handle that was terminated, oldest first.
    #[must_use]
    pub fn terminated(&self) -> Vec<SpawnHandle> {
        let log = self.log.lock().unwrap_or_else(PoisonError::into_inner);
        log.terminated.clone()
    }
}

#[async_trait]
impl ProcessSpawner for RecordingSpawner {
    async fn spawn(&self, request: &SpawnRequest) -> SpawnResult<SpawnHandle> {
        let mut log = self.log.lock().unwrap_or_else(PoisonError::into_inner);
        if log.failures_pending > 0 {
            log.failures_pending -= 1;
            return Err(SpawnError::Launch {
                session_id: request.session_id,
                reason: "spawn rejected by recording spawner".to_owned(),
            });
        }
        log.next_pid += 1;
        let pid = log.next_pid;
        log.requests.push(request.clone());
        Ok(SpawnHandle::new(format!("recorded-{}", request.session_id)).with_pid(pid))
    }

    async fn terminate(&self, handle: &SpawnHandle) -> SpawnResult<()> {
        let mut log = self.log.lock().unwrap_or_else(PoisonError::into_inner);
        log.terminated.push(handle.clone());
        Ok(())
    }
}

/// Event sink that keeps every delivered envelope.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    envelopes: Arc<Mutex<Vec<EventEnvelope>>>,
    resyncs: Arc<Mutex<Vec<u64>>>,
}

impl RecordingSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the delivered envelopes in delivery order.
    #[must_use]
    pub fn envelopes(&self) -> Vec<EventEnvelope> {
        self.envelopes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Returns the wire names of the delivered events.
    #[must_use]
    pub fn event_names(&self) -> Vec<&'static str> {
        self.envelopes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|envelope| envelope.event.name())
            .collect()
    }

    /// Returns the resync notices received.
    #[must_use]
    pub fn resyncs(&self) -> Vec<u64> {
        self.resyncs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl EventSink for RecordingSink {
    async fn deliver(&self, envelope: &EventEnvelope) {
        self.envelopes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(envelope.clone());
    }

    async fn resync(&self, missed: u64) {
        self.resyncs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(missed);
    }
}
