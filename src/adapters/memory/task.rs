//! Task, project, and association ports.

use super::{InMemoryStore, ordered, poisoned};
use crate::session::domain::SessionId;
use crate::task::domain::{Project, ProjectId, Task, TaskId};
use crate::task::ports::{
    AssociationChange, AssociationError, AssociationRepository, AssociationResult,
    ProjectRepository, ProjectRepositoryError, ProjectRepositoryResult, TaskRepository,
    TaskRepositoryError, TaskRepositoryResult,
};
use async_trait::async_trait;

#[async_trait]
impl TaskRepository for InMemoryStore {
    async fn store(&self, task: &Task) -> TaskRepositoryResult<()> {
        let mut state = self
            .state
            .write()
            .map_err(|err| TaskRepositoryError::persistence(poisoned(err)))?;
        if state.tasks.contains_key(&task.id()) {
            return Err(TaskRepositoryError::DuplicateTask(task.id()));
        }
        state.tasks.insert(task.id(), task.clone());
        state.task_order.push(task.id());
        Ok(())
    }

    async fn update(&self, task: &Task) -> TaskRepositoryResult<Task> {
        let mut state = self
            .state
            .write()
            .map_err(|err| TaskRepositoryError::persistence(poisoned(err)))?;
        let stored = state
            .tasks
            .get_mut(&task.id())
            .ok_or(TaskRepositoryError::NotFound(task.id()))?;
        if stored.revision() != task.revision() {
            return Err(TaskRepositoryError::RevisionConflict {
                id: task.id(),
                expected: task.revision(),
                found: stored.revision(),
            });
        }
        *stored = task.clone().with_revision(task.revision() + 1);
        Ok(stored.clone())
    }

    async fn delete(&self, id: TaskId) -> TaskRepositoryResult<Task> {
        let mut state = self
            .state
            .write()
            .map_err(|err| TaskRepositoryError::persistence(poisoned(err)))?;
        let task = state
            .tasks
            .remove(&id)
            .ok_or(TaskRepositoryError::NotFound(id))?;
        state.task_order.retain(|existing| *existing != id);
        for session_id in task.session_ids() {
            if let Some(session) = state.sessions.get_mut(session_id)
                && session.detach_task(id)
            {
                let revision = session.revision() + 1;
                *session = session.clone().with_revision(revision);
            }
        }
        Ok(task)
    }

    async fn find_by_id(&self, id: TaskId) -> TaskRepositoryResult<Option<Task>> {
        let state = self
            .state
            .read()
            .map_err(|err| TaskRepositoryError::persistence(poisoned(err)))?;
        Ok(state.tasks.get(&id).cloned())
    }

    async fn find_many(&self, ids: &[TaskId]) -> TaskRepositoryResult<Vec<Task>> {
        let state = self
            .state
            .read()
            .map_err(|err| TaskRepositoryError::persistence(poisoned(err)))?;
        Ok(ids
            .iter()
            .filter_map(|id| state.tasks.get(id).cloned())
            .collect())
    }

    async fn list_by_project(&self, project_id: ProjectId) -> TaskRepositoryResult<Vec<Task>> {
        let state = self
            .state
            .read()
            .map_err(|err| TaskRepositoryError::persistence(poisoned(err)))?;
        Ok(ordered(&state.task_order, &state.tasks, |task| {
            task.project_id() == project_id
        }))
    }

    async fn find_children(&self, parent_id: TaskId) -> TaskRepositoryResult<Vec<Task>> {
        let state = self
            .state
            .read()
            .map_err(|err| TaskRepositoryError::persistence(poisoned(err)))?;
        Ok(ordered(&state.task_order, &state.tasks, |task| {
            task.parent_id() == Some(parent_id)
        }))
    }
}

#[async_trait]
impl ProjectRepository for InMemoryStore {
    async fn store_project(&self, project: &Project) -> ProjectRepositoryResult<()> {
        let mut state = self
            .state
            .write()
            .map_err(|err| ProjectRepositoryError::persistence(poisoned(err)))?;
        if state.projects.contains_key(&project.id()) {
            return Err(ProjectRepositoryError::DuplicateProject(project.id()));
        }
        state.projects.insert(project.id(), project.clone());
        Ok(())
    }

    async fn find_project(&self, id: ProjectId) -> ProjectRepositoryResult<Option<Project>> {
        let state = self
            .state
            .read()
            .map_err(|err| ProjectRepositoryError::persistence(poisoned(err)))?;
        Ok(state.projects.get(&id).cloned())
    }

    async fn list_projects(&self) -> ProjectRepositoryResult<Vec<Project>> {
        let state = self
            .state
            .read()
            .map_err(|err| ProjectRepositoryError::persistence(poisoned(err)))?;
        Ok(state.projects.values().cloned().collect())
    }
}

#[async_trait]
impl AssociationRepository for InMemoryStore {
    async fn link(
        &self,
        task_id: TaskId,
        session_id: SessionId,
    ) -> AssociationResult<AssociationChange> {
        self.associate(task_id, session_id, true)
    }

    async fn unlink(
        &self,
        task_id: TaskId,
        session_id: SessionId,
    ) -> AssociationResult<AssociationChange> {
        self.associate(task_id, session_id, false)
    }
}

impl InMemoryStore {
    fn associate(
        &self,
        task_id: TaskId,
        session_id: SessionId,
        linked: bool,
    ) -> AssociationResult<AssociationChange> {
        let mut state = self
            .state
            .write()
            .map_err(|err| AssociationError::persistence(poisoned(err)))?;
        let mut task = state
            .tasks
            .get(&task_id)
            .cloned()
            .ok_or(AssociationError::TaskNotFound(task_id))?;
        let mut session = state
            .sessions
            .get(&session_id)
            .cloned()
            .ok_or(AssociationError::SessionNotFound(session_id))?;
        if task.project_id() != session.project_id() {
            return Err(AssociationError::ProjectMismatch {
                task_id,
                session_id,
            });
        }
        let changed = if linked {
            let task_side = task.attach_session(session_id);
            let session_side = session.attach_task(task_id);
            task_side || session_side
        } else {
            let task_side = task.detach_session(session_id);
            let session_side = session.detach_task(task_id);
            task_side || session_side
        };
        if changed {
            let task_revision = task.revision() + 1;
            let session_revision = session.revision() + 1;
            task = task.with_revision(task_revision);
            session = session.with_revision(session_revision);
            state.tasks.insert(task_id, task.clone());
            state.sessions.insert(session_id, session.clone());
        }
        Ok(AssociationChange {
            task,
            session,
            changed,
        })
    }
}
