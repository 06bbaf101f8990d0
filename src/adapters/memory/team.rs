//! Team roster port.

use super::{InMemoryStore, poisoned};
use crate::task::domain::ProjectId;
use crate::team::domain::{TeamMember, TeamMemberId, TeamMemberOverride};
use crate::team::ports::{TeamRepository, TeamRepositoryError, TeamRepositoryResult};
use async_trait::async_trait;

#[async_trait]
impl TeamRepository for InMemoryStore {
    async fn store_member(&self, member: &TeamMember) -> TeamRepositoryResult<()> {
        let mut state = self
            .state
            .write()
            .map_err(|err| TeamRepositoryError::persistence(poisoned(err)))?;
        let key = (member.project_id(), member.id().clone());
        if state.members.contains_key(&key) {
            return Err(TeamRepositoryError::DuplicateMember(member.id().clone()));
        }
        state.members.insert(key, member.clone());
        Ok(())
    }

    async fn update_member(&self, member: &TeamMember) -> TeamRepositoryResult<TeamMember> {
        let mut state = self
            .state
            .write()
            .map_err(|err| TeamRepositoryError::persistence(poisoned(err)))?;
        let key = (member.project_id(), member.id().clone());
        let stored = state
            .members
            .get_mut(&key)
            .ok_or_else(|| TeamRepositoryError::NotFound(member.id().clone()))?;
        if stored.revision() != member.revision() {
            return Err(TeamRepositoryError::RevisionConflict {
                id: member.id().clone(),
                expected: member.revision(),
                found: stored.revision(),
            });
        }
        *stored = member.clone().with_revision(member.revision() + 1);
        Ok(stored.clone())
    }

    async fn delete_member(
        &self,
        project_id: ProjectId,
        id: &TeamMemberId,
    ) -> TeamRepositoryResult<TeamMember> {
        let mut state = self
            .state
            .write()
            .map_err(|err| TeamRepositoryError::persistence(poisoned(err)))?;
        state
            .members
            .remove(&(project_id, id.clone()))
            .ok_or_else(|| TeamRepositoryError::NotFound(id.clone()))
    }

    async fn find_member(
        &self,
        project_id: ProjectId,
        id: &TeamMemberId,
    ) -> TeamRepositoryResult<Option<TeamMember>> {
        let state = self
            .state
            .read()
            .map_err(|err| TeamRepositoryError::persistence(poisoned(err)))?;
        Ok(state.members.get(&(project_id, id.clone())).cloned())
    }

    async fn list_members(&self, project_id: ProjectId) -> TeamRepositoryResult<Vec<TeamMember>> {
        let state = self
            .state
            .read()
            .map_err(|err| TeamRepositoryError::persistence(poisoned(err)))?;
        Ok(state
            .members
            .values()
            .filter(|member| member.project_id() == project_id)
            .cloned()
            .collect())
    }

    async fn save_override(
        &self,
        record: &TeamMemberOverride,
    ) -> TeamRepositoryResult<TeamMemberOverride> {
        let mut state = self
            .state
            .write()
            .map_err(|err| TeamRepositoryError::persistence(poisoned(err)))?;
        let key = (record.project_id, record.member_id.clone());
        let next = match state.overrides.get(&key) {
            Some(stored) if stored.revision != record.revision => {
                return Err(TeamRepositoryError::RevisionConflict {
                    id: record.member_id.clone(),
                    expected: record.revision,
                    found: stored.revision,
                });
            }
            Some(stored) => stored.revision + 1,
            None => 1,
        };
        let saved = TeamMemberOverride {
            revision: next,
            ..record.clone()
        };
        state.overrides.insert(key, saved.clone());
        Ok(saved)
    }

    async fn find_override(
        &self,
        project_id: ProjectId,
        id: &TeamMemberId,
    ) -> TeamRepositoryResult<Option<TeamMemberOverride>> {
        let state = self
            .state
            .read()
            .map_err(|err| TeamRepositoryError::persistence(poisoned(err)))?;
        Ok(state.overrides.get(&(project_id, id.clone())).cloned())
    }

    async fn delete_override(
        &self,
        project_id: ProjectId,
        id: &TeamMemberId,
    ) -> TeamRepositoryResult<bool> {
        let mut state = self
            .state
            .write()
            .map_err(|err| TeamRepositoryError::persistence(poisoned(err)))?;
        Ok(state.overrides.remove(&(project_id, id.clone())).is_some())
    }
}
