//! Team roster service: defaults merged with overrides, plus custom members.

use crate::error::{EntityRef, OrchestrationError, OrchestrationResult};
use crate::events::{DomainEvent, EventBus};
use crate::task::domain::ProjectId;
use crate::team::domain::{
    NewTeamMember, TeamDomainError, TeamMember, TeamMemberId, TeamMemberKind, TeamMemberOverride,
    TeamMemberPatch, TeamMemberStatus,
};
use crate::team::ports::TeamRepository;
use mockable::Clock;
use std::sync::Arc;
use tracing::info;

/// Reads and mutates a project's team roster.
#[derive(Clone)]
pub struct TeamService<R, C>
where
    R: TeamRepository,
    C: Clock + Send + Sync,
{
    repository: Arc<R>,
    bus: Arc<EventBus>,
    clock: Arc<C>,
}

impl<R, C> TeamService<R, C>
where
    R: TeamRepository,
    C: Clock + Send + Sync,
{
    /// Creates a roster service.
    #[must_use]
    pub const fn new(repository: Arc<R>, bus: Arc<EventBus>, clock: Arc<C>) -> Self {
        Self {
            repository,
            bus,
            clock,
        }
    }

    /// Lists default members (with overrides applied) followed by custom
    /// members.
    ///
    /// # Errors
    ///
    /// Returns a storage error when the repository fails.
    pub async fn list(&self, project_id: ProjectId) -> OrchestrationResult<Vec<TeamMember>> {
        let mut members = Vec::new();
        for member in TeamMember::defaults(project_id) {
            members.push(self.resolve_default(member).await?);
        }
        members.extend(self.repository.list_members(project_id).await?);
        Ok(members)
    }

    /// Resolves one member.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` when the member does not exist in the project.
    pub async fn get(
        &self,
        project_id: ProjectId,
        id: &TeamMemberId,
    ) -> OrchestrationResult<TeamMember> {
        if let Some(member) = default_member(project_id, id) {
            return self.resolve_default(member).await;
        }
        self.repository
            .find_member(project_id, id)
            .await?
            .ok_or_else(|| OrchestrationError::not_found(EntityRef::team_member(id)))
    }

    /// Creates a custom member.
    ///
    /// # Errors
    ///
    /// Returns `Validation` for a blank name.
    pub async fn create(&self, request: NewTeamMember) -> OrchestrationResult<TeamMember> {
        let member = TeamMember::custom(request, &*self.clock)?;
        self.repository.store_member(&member).await?;
        info!(member = %member.id(), strategy = %member.strategy(), "team member created");
        self.publish(DomainEvent::TeamMemberCreated(Box::new(member.clone())));
        Ok(member)
    }

    /// Applies field changes. Default members record them in their
    /// project-scoped override.
    ///
    /// # Errors
    ///
    /// Returns `NotFound`, `Validation` for a blank name, or `StateConflict`
    /// on a concurrent change.
    pub async fn update(
        &self,
        project_id: ProjectId,
        id: &TeamMemberId,
        patch: &TeamMemberPatch,
    ) -> OrchestrationResult<TeamMember> {
        let member = if default_member(project_id, id).is_some() {
            self.save_override(project_id, id, |record| {
                record.patch = record.patch.clone().merged(patch);
            })
            .await?
        } else {
            let mut member = self.get(project_id, id).await?;
            member.apply(patch, &*self.clock)?;
            self.repository.update_member(&member).await?
        };
        self.publish(DomainEvent::TeamMemberUpdated(Box::new(member.clone())));
        Ok(member)
    }

    /// Archives a member.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` or `StateConflict` on a concurrent change.
    pub async fn archive(
        &self,
        project_id: ProjectId,
        id: &TeamMemberId,
    ) -> OrchestrationResult<TeamMember> {
        let member = self
            .set_status(project_id, id, TeamMemberStatus::Archived)
            .await?;
        info!(member = %id, "team member archived");
        self.publish(DomainEvent::TeamMemberArchived(Box::new(member.clone())));
        Ok(member)
    }

    /// Restores an archived member.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` or `StateConflict` on a concurrent change.
    pub async fn unarchive(
        &self,
        project_id: ProjectId,
        id: &TeamMemberId,
    ) -> OrchestrationResult<TeamMember> {
        let member = self
            .set_status(project_id, id, TeamMemberStatus::Active)
            .await?;
        self.publish(DomainEvent::TeamMemberUpdated(Box::new(member.clone())));
        Ok(member)
    }

    /// Deletes an archived custom member.
    ///
    /// # Errors
    ///
    /// Returns `StateConflict` for default members and for members that are
    /// still active.
    pub async fn delete(
        &self,
        project_id: ProjectId,
        id: &TeamMemberId,
    ) -> OrchestrationResult<TeamMember> {
        if default_member(project_id, id).is_some() {
            return Err(TeamDomainError::DefaultMember(id.clone()).into());
        }
        let member = self.get(project_id, id).await?;
        if member.kind() != TeamMemberKind::Custom || !member.is_archived() {
            return Err(TeamDomainError::NotDeletable(id.clone()).into());
        }
        let deleted = self.repository.delete_member(project_id, id).await?;
        info!(member = %id, "team member deleted");
        self.publish(DomainEvent::TeamMemberDeleted {
            member_id: id.clone(),
            project_id,
        });
        Ok(deleted)
    }

    /// Drops a default member's override.
    ///
    /// # Errors
    ///
    /// Returns `Validation` when the member is not a default.
    pub async fn reset_default(
        &self,
        project_id: ProjectId,
        id: &TeamMemberId,
    ) -> OrchestrationResult<TeamMember> {
        let Some(member) = default_member(project_id, id) else {
            return Err(TeamDomainError::NotDefault(id.clone()).into());
        };
        if self.repository.delete_override(project_id, id).await? {
            self.publish(DomainEvent::TeamMemberUpdated(Box::new(member.clone())));
        }
        Ok(member)
    }

    async fn set_status(
        &self,
        project_id: ProjectId,
        id: &TeamMemberId,
        status: TeamMemberStatus,
    ) -> OrchestrationResult<TeamMember> {
        if default_member(project_id, id).is_some() {
            return self
                .save_override(project_id, id, |record| record.status = Some(status))
                .await;
        }
        let mut member = self.get(project_id, id).await?;
        member.set_status(status, &*self.clock);
        Ok(self.repository.update_member(&member).await?)
    }

    async fn save_override(
        &self,
        project_id: ProjectId,
        id: &TeamMemberId,
        change: impl FnOnce(&mut TeamMemberOverride) + Send,
    ) -> OrchestrationResult<TeamMember> {
        let mut record = self
            .repository
            .find_override(project_id, id)
            .await?
            .unwrap_or_else(|| TeamMemberOverride {
                project_id,
                member_id: id.clone(),
                patch: TeamMemberPatch::default(),
                status: None,
                revision: 0,
            });
        change(&mut record);
        let stored = self.repository.save_override(&record).await?;
        let base = default_member(project_id, id)
            .ok_or_else(|| OrchestrationError::not_found(EntityRef::team_member(id)))?;
        Ok(base.with_override(&stored, &*self.clock)?)
    }

    async fn resolve_default(&self, member: TeamMember) -> OrchestrationResult<TeamMember> {
        match self
            .repository
            .find_override(member.project_id(), member.id())
            .await?
        {
            Some(record) => Ok(member.with_override(&record, &*self.clock)?),
            None => Ok(member),
        }
    }

    fn publish(&self, event: DomainEvent) {
        self.bus.publish(event, self.clock.utc());
    }
}

fn default_member(project_id: ProjectId, id: &TeamMemberId) -> Option<TeamMember> {
    TeamMember::defaults(project_id)
        .into_iter()
        .find(|member| member.id() == id)
}
