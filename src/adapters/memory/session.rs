//! Session port.

use super::{InMemoryStore, ordered, poisoned};
use crate::session::domain::{Session, SessionId};
use crate::session::ports::{SessionRepository, SessionRepositoryError, SessionRepositoryResult};
use crate::task::domain::ProjectId;
use async_trait::async_trait;

#[async_trait]
impl SessionRepository for InMemoryStore {
    async fn store_session(&self, session: &Session) -> SessionRepositoryResult<()> {
        let mut state = self
            .state
            .write()
            .map_err(|err| SessionRepositoryError::persistence(poisoned(err)))?;
        if state.sessions.contains_key(&session.id()) {
            return Err(SessionRepositoryError::DuplicateSession(session.id()));
        }
        state.sessions.insert(session.id(), session.clone());
        state.session_order.push(session.id());
        Ok(())
    }

    async fn update_session(&self, session: &Session) -> SessionRepositoryResult<Session> {
        let mut state = self
            .state
            .write()
            .map_err(|err| SessionRepositoryError::persistence(poisoned(err)))?;
        let stored = state
            .sessions
            .get_mut(&session.id())
            .ok_or(SessionRepositoryError::NotFound(session.id()))?;
        if stored.revision() != session.revision() {
            return Err(SessionRepositoryError::RevisionConflict {
                id: session.id(),
                expected: session.revision(),
                found: stored.revision(),
            });
        }
        *stored = session.clone().with_revision(session.revision() + 1);
        Ok(stored.clone())
    }

    async fn delete_session(&self, id: SessionId) -> SessionRepositoryResult<Session> {
        let mut state = self
            .state
            .write()
            .map_err(|err| SessionRepositoryError::persistence(poisoned(err)))?;
        let session = state
            .sessions
            .remove(&id)
            .ok_or(SessionRepositoryError::NotFound(id))?;
        state.session_order.retain(|existing| *existing != id);
        state.queues.remove(&id);
        for task_id in session.task_ids() {
            if let Some(task) = state.tasks.get_mut(task_id)
                && task.detach_session(id)
            {
                let revision = task.revision() + 1;
                *task = task.clone().with_revision(revision);
            }
        }
        Ok(session)
    }

    async fn find_session(&self, id: SessionId) -> SessionRepositoryResult<Option<Session>> {
        let state = self
            .state
            .read()
            .map_err(|err| SessionRepositoryError::persistence(poisoned(err)))?;
        Ok(state.sessions.get(&id).cloned())
    }

    async fn find_sessions(&self, ids: &[SessionId]) -> SessionRepositoryResult<Vec<Session>> {
        let state = self
            .state
            .read()
            .map_err(|err| SessionRepositoryError::persistence(poisoned(err)))?;
        Ok(ids
            .iter()
            .filter_map(|id| state.sessions.get(id).cloned())
            .collect())
    }

    async fn list_children(&self, parent_id: SessionId) -> SessionRepositoryResult<Vec<Session>> {
        let state = self
            .state
            .read()
            .map_err(|err| SessionRepositoryError::persistence(poisoned(err)))?;
        Ok(ordered(&state.session_order, &state.sessions, |session| {
            session.parent_session_id() == Some(parent_id)
        }))
    }

    async fn list_sessions(&self, project_id: ProjectId) -> SessionRepositoryResult<Vec<Session>> {
        let state = self
            .state
            .read()
            .map_err(|err| SessionRepositoryError::persistence(poisoned(err)))?;
        Ok(ordered(&state.session_order, &state.sessions, |session| {
            session.project_id() == project_id
        }))
    }
}
