//! Result of waiting on a set of sessions.

use super::{SessionId, SessionStatus};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Statuses observed by a watch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchOutcome {
    /// Sessions that reached a terminal status, with that status.
    pub terminal: BTreeMap<SessionId, SessionStatus>,
    /// Watched sessions still running when the watch returned.
    pub pending: Vec<SessionId>,
    /// The watch ended because the caller cancelled it.
    pub cancelled: bool,
}

impl WatchOutcome {
    /// Returns `true` when every watched session is terminal.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.pending.is_empty()
    }

    /// Returns the final status of one session, if it ended.
    #[must_use]
    pub fn status_of(&self, session_id: SessionId) -> Option<SessionStatus> {
        self.terminal.get(&session_id).copied()
    }
}
