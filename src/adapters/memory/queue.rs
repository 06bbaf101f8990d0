//! Queue port.

use super::{InMemoryStore, poisoned};
use crate::queue::domain::QueueState;
use crate::queue::ports::{QueueRepository, QueueRepositoryError, QueueRepositoryResult};
use crate::session::domain::SessionId;
use async_trait::async_trait;

#[async_trait]
impl QueueRepository for InMemoryStore {
    async fn create_queue(&self, queue: &QueueState) -> QueueRepositoryResult<()> {
        let mut state = self
            .state
            .write()
            .map_err(|err| QueueRepositoryError::persistence(poisoned(err)))?;
        if state.queues.contains_key(&queue.session_id()) {
            return Err(QueueRepositoryError::DuplicateQueue(queue.session_id()));
        }
        state.queues.insert(queue.session_id(), queue.clone());
        Ok(())
    }

    async fn find_queue(&self, session_id: SessionId) -> QueueRepositoryResult<Option<QueueState>> {
        let state = self
            .state
            .read()
            .map_err(|err| QueueRepositoryError::persistence(poisoned(err)))?;
        Ok(state.queues.get(&session_id).cloned())
    }

    async fn update_queue(&self, queue: &QueueState) -> QueueRepositoryResult<QueueState> {
        let mut state = self
            .state
            .write()
            .map_err(|err| QueueRepositoryError::persistence(poisoned(err)))?;
        let session_id = queue.session_id();
        let stored = state
            .queues
            .get_mut(&session_id)
            .ok_or(QueueRepositoryError::NotFound(session_id))?;
        if stored.revision() != queue.revision() {
            return Err(QueueRepositoryError::RevisionConflict {
                session_id,
                expected: queue.revision(),
                found: stored.revision(),
            });
        }
        *stored = queue.clone().with_revision(queue.revision() + 1);
        Ok(stored.clone())
    }
}
