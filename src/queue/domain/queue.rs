//! FIFO work queue attached to a queue-strategy session.

use super::QueueError;
use crate::session::domain::SessionId;
use crate::task::domain::TaskId;
use chrono::{DateTime, Utc};
use mockable::Clock;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Status of one queue item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueItemStatus {
    /// Waiting to be claimed.
    Queued,
    /// Claimed by the worker.
    Processing,
    /// Finished successfully.
    Completed,
    /// Finished unsuccessfully.
    Failed,
    /// Passed over.
    Skipped,
}

impl QueueItemStatus {
    /// Returns the canonical string representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }

    /// Returns `true` for items that are still queued or being processed.
    #[must_use]
    pub const fn is_open(self) -> bool {
        matches!(self, Self::Queued | Self::Processing)
    }
}

impl fmt::Display for QueueItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One task in a queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueItem {
    /// Queued task.
    pub task_id: TaskId,
    /// Item status.
    pub status: QueueItemStatus,
    /// Failure reason for `failed` items.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// When the item was added.
    pub added_at: DateTime<Utc>,
    /// When the item was claimed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    /// When the item was closed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

/// Aggregate counts returned by `queue:status`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueCounts {
    /// Items waiting.
    pub queued: usize,
    /// Items claimed (zero or one).
    pub processing: usize,
    /// Items completed.
    pub completed: usize,
    /// Items failed.
    pub failed: usize,
    /// Items skipped.
    pub skipped: usize,
    /// All items.
    pub total: usize,
}

/// Queue state, one per queue-strategy session.
///
/// At most one item is `processing`. Items leave `queued` in FIFO order
/// except through an explicit skip; `push` appends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueState {
    session_id: SessionId,
    items: Vec<QueueItem>,
    revision: u64,
}

impl QueueState {
    /// Creates a queue holding `tasks` in order. Duplicates are dropped.
    #[must_use]
    pub fn new(
        session_id: SessionId,
        tasks: impl IntoIterator<Item = TaskId>,
        clock: &impl Clock,
    ) -> Self {
        let added_at = clock.utc();
        let mut items: Vec<QueueItem> = Vec::new();
        for task_id in tasks {
            if items.iter().any(|item| item.task_id == task_id) {
                continue;
            }
            items.push(QueueItem {
                task_id,
                status: QueueItemStatus::Queued,
                reason: None,
                added_at,
                started_at: None,
                finished_at: None,
            });
        }
        Self {
            session_id,
            items,
            revision: 0,
        }
    }

    /// Returns the owning session.
    #[must_use]
    pub const fn session_id(&self) -> SessionId {
        self.session_id
    }

    /// Returns every item in queue order.
    #[must_use]
    pub fn items(&self) -> &[QueueItem] {
        &self.items
    }

    /// Returns the optimistic-concurrency revision.
    #[must_use]
    pub const fn revision(&self) -> u64 {
        self.revision
    }

    /// Returns a copy stamped with the given revision.
    #[must_use]
    pub const fn with_revision(mut self, revision: u64) -> Self {
        self.revision = revision;
        self
    }

    /// Returns the item currently being processed.
    #[must_use]
    pub fn processing(&self) -> Option<&QueueItem> {
        self.items
            .iter()
            .find(|item| item.status == QueueItemStatus::Processing)
    }

    /// Peeks at the next queued item without changing anything.
    #[must_use]
    pub fn top(&self) -> Option<&QueueItem> {
        self.items
            .iter()
            .find(|item| item.status == QueueItemStatus::Queued)
    }

    /// Claims the next queued item.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::AlreadyProcessing`] while another item is being
    /// processed and [`QueueError::EmptyQueue`] when nothing is queued.
    pub fn start(&mut self, clock: &impl Clock) -> Result<&QueueItem, QueueError> {
        if let Some(current) = self.processing() {
            return Err(QueueError::AlreadyProcessing {
                session_id: self.session_id,
                task_id: current.task_id,
            });
        }
        let session_id = self.session_id;
        let item = self
            .items
            .iter_mut()
            .find(|item| item.status == QueueItemStatus::Queued)
            .ok_or(QueueError::EmptyQueue(session_id))?;
        item.status = QueueItemStatus::Processing;
        item.started_at = Some(clock.utc());
        Ok(item)
    }

    /// Closes the processing item as completed.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::NoActiveItem`] when nothing is processing.
    pub fn complete(&mut self, clock: &impl Clock) -> Result<&QueueItem, QueueError> {
        self.close(QueueItemStatus::Completed, None, clock)
    }

    /// Closes the processing item as failed. No automatic retry.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::NoActiveItem`] when nothing is processing.
    pub fn fail(&mut self, reason: &str, clock: &impl Clock) -> Result<&QueueItem, QueueError> {
        self.close(QueueItemStatus::Failed, Some(reason.to_owned()), clock)
    }

    /// Skips the processing item, or the next queued item when none is
    /// processing.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::EmptyQueue`] when there is nothing to skip.
    pub fn skip(&mut self, clock: &impl Clock) -> Result<&QueueItem, QueueError> {
        let session_id = self.session_id;
        let index = self
            .items
            .iter()
            .position(|item| item.status == QueueItemStatus::Processing)
            .or_else(|| {
                self.items
                    .iter()
                    .position(|item| item.status == QueueItemStatus::Queued)
            })
            .ok_or(QueueError::EmptyQueue(session_id))?;
        let item = self
            .items
            .get_mut(index)
            .ok_or(QueueError::EmptyQueue(session_id))?;
        item.status = QueueItemStatus::Skipped;
        item.finished_at = Some(clock.utc());
        Ok(item)
    }

    /// Appends a task.
    ///
    /// A task whose earlier item already closed may be queued again.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::DuplicateItem`] when the task is already queued
    /// or processing.
    pub fn push(&mut self, task_id: TaskId, clock: &impl Clock) -> Result<&QueueItem, QueueError> {
        if self
            .items
            .iter()
            .any(|item| item.task_id == task_id && item.status.is_open())
        {
            return Err(QueueError::DuplicateItem {
                session_id: self.session_id,
                task_id,
            });
        }
        self.items.push(QueueItem {
            task_id,
            status: QueueItemStatus::Queued,
            reason: None,
            added_at: clock.utc(),
            started_at: None,
            finished_at: None,
        });
        let session_id = self.session_id;
        self.items.last().ok_or(QueueError::EmptyQueue(session_id))
    }

    /// Returns aggregate counts.
    #[must_use]
    pub fn counts(&self) -> QueueCounts {
        let mut counts = QueueCounts {
            total: self.items.len(),
            ..QueueCounts::default()
        };
        for item in &self.items {
            match item.status {
                QueueItemStatus::Queued => counts.queued += 1,
                QueueItemStatus::Processing => counts.processing += 1,
                QueueItemStatus::Completed => counts.completed += 1,
                QueueItemStatus::Failed => counts.failed += 1,
                QueueItemStatus::Skipped => counts.skipped += 1,
            }
        }
        counts
    }

    /// Returns `true` when no item is queued or processing.
    #[must_use]
    pub fn is_drained(&self) -> bool {
        !self.items.iter().any(|item| item.status.is_open())
    }

    fn close(
        &mut self,
        status: QueueItemStatus,
        reason: Option<String>,
        clock: &impl Clock,
    ) -> Result<&QueueItem, QueueError> {
        let session_id = self.session_id;
        let item = self
            .items
            .iter_mut()
            .find(|item| item.status == QueueItemStatus::Processing)
            .ok_or(QueueError::NoActiveItem(session_id))?;
        item.status = status;
        item.reason = reason;
        item.finished_at = Some(clock.utc());
        Ok(item)
    }
}
