//! Waiting on sessions to reach a terminal status.

use super::SessionSupervisor;
use crate::error::{OrchestrationError, OrchestrationResult};
use crate::events::BusMessage;
use crate::manifest::ports::SkillCatalog;
use crate::session::domain::{SessionId, SessionStatus, WatchOutcome};
use crate::session::ports::ProcessSpawner;
use crate::store::EntityStore;
use mockable::Clock;
use std::collections::{BTreeMap, BTreeSet};
use tokio_util::sync::CancellationToken;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WatchMode {
    All,
    Any,
}

impl<R, K, S, C> SessionSupervisor<R, K, S, C>
where
    R: EntityStore,
    K: SkillCatalog,
    S: ProcessSpawner,
    C: Clock + Send + Sync,
{
    /// Waits until every session in `session_ids` is terminal, or until
    /// `cancel` fires.
    ///
    /// Statuses are read from the store after subscribing, so a session
    /// that ends between the call and the subscription is not missed.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown session and `StateConflict` if the
    /// event bus closes first.
    pub async fn watch(
        &self,
        session_ids: &[SessionId],
        cancel: &CancellationToken,
    ) -> OrchestrationResult<WatchOutcome> {
        self.wait(session_ids, WatchMode::All, cancel).await
    }

    /// Waits until at least one session in `session_ids` is terminal.
    ///
    /// # Errors
    ///
    /// Same as [`SessionSupervisor::watch`].
    pub async fn watch_any(
        &self,
        session_ids: &[SessionId],
        cancel: &CancellationToken,
    ) -> OrchestrationResult<WatchOutcome> {
        self.wait(session_ids, WatchMode::Any, cancel).await
    }

    async fn wait(
        &self,
        session_ids: &[SessionId],
        mode: WatchMode,
        cancel: &CancellationToken,
    ) -> OrchestrationResult<WatchOutcome> {
        let watched: BTreeSet<SessionId> = session_ids.iter().copied().collect();
        let mut terminal = BTreeMap::new();
        if watched.is_empty() {
            return Ok(outcome(&watched, terminal, false));
        }
        let mut subscription = self.bus.subscribe();
        self.refresh(&watched, &mut terminal).await?;
        loop {
            if is_satisfied(mode, &watched, &terminal) {
                return Ok(outcome(&watched, terminal, false));
            }
            tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    debug!(pending = watched.len().saturating_sub(terminal.len()), "watch cancelled");
                    return Ok(outcome(&watched, terminal, true));
                }
                message = subscription.next() => match message {
                    Some(BusMessage::Event(envelope)) => {
                        if let Some(session) = envelope.event.session().filter(|candidate| {
                            candidate.is_terminal() && watched.contains(&candidate.id())
                        }) {
                            terminal.insert(session.id(), session.status());
                        }
                    }
                    Some(BusMessage::Resync { missed }) => {
                        debug!(missed, "watch resyncing from the store");
                        self.refresh(&watched, &mut terminal).await?;
                    }
                    None => {
                        return Err(OrchestrationError::state_conflict(
                            "event bus closed while watching sessions",
                        ));
                    }
                },
            }
        }
    }

    async fn refresh(
        &self,
        watched: &BTreeSet<SessionId>,
        terminal: &mut BTreeMap<SessionId, SessionStatus>,
    ) -> OrchestrationResult<()> {
        for session_id in watched {
            let session = self.get(*session_id).await?;
            if session.is_terminal() {
                terminal.insert(*session_id, session.status());
            }
        }
        Ok(())
    }
}

fn is_satisfied(
    mode: WatchMode,
    watched: &BTreeSet<SessionId>,
    terminal: &BTreeMap<SessionId, SessionStatus>,
) -> bool {
    match mode {
        WatchMode::All => terminal.len() == watched.len(),
        WatchMode::Any => !terminal.is_empty(),
    }
}

fn outcome(
    watched: &BTreeSet<SessionId>,
    terminal: BTreeMap<SessionId, SessionStatus>,
    cancelled: bool,
) -> WatchOutcome {
    let pending = watched
        .iter()
        .filter(|id| !terminal.contains_key(id))
        .copied()
        .collect();
    WatchOutcome {
        terminal,
        pending,
        cancelled,
    }
}
