//! Manifest builder: resolves and validates everything a spawn needs.

use super::compiler;
use crate::error::{EntityKind, EntityRef, OrchestrationError, OrchestrationResult};
use crate::events::EventBus;
use crate::manifest::domain::{
    CompiledPrompt, Manifest, ManifestContext, ManifestRequest, SessionConfig, Skill,
    TaskSnapshot, Template,
};
use crate::manifest::ports::{ManifestRepository, SkillCatalog, TemplateRepository};
use crate::session::domain::SessionId;
use crate::strategy::{SessionMode, Strategy};
use crate::task::domain::{Project, ProjectId, Task, TaskForest, TaskId};
use crate::task::ports::{ProjectRepository, TaskRepository};
use crate::team::domain::TeamMember;
use crate::team::ports::TeamRepository;
use crate::team::services::TeamService;
use mockable::Clock;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

/// Fallback session settings applied when neither the request nor the team
/// member supplies them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManifestDefaults {
    /// Model identifier.
    pub model: String,
    /// Turn budget.
    pub max_turns: u32,
    /// Working directory; the project's when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<PathBuf>,
}

impl Default for ManifestDefaults {
    fn default() -> Self {
        Self {
            model: "sonnet".to_owned(),
            max_turns: 50,
            working_dir: None,
        }
    }
}

/// Builds, stores, and compiles manifests.
pub struct ManifestBuilder<R, K, C>
where
    R: TaskRepository + ProjectRepository + TeamRepository + ManifestRepository + TemplateRepository,
    K: SkillCatalog,
    C: Clock + Send + Sync,
{
    store: Arc<R>,
    team: TeamService<R, C>,
    skills: Arc<K>,
    clock: Arc<C>,
    defaults: ManifestDefaults,
}

impl<R, K, C> ManifestBuilder<R, K, C>
where
    R: TaskRepository + ProjectRepository + TeamRepository + ManifestRepository + TemplateRepository,
    K: SkillCatalog,
    C: Clock + Send + Sync,
{
    /// Creates a builder.
    #[must_use]
    pub fn new(
        store: Arc<R>,
        skills: Arc<K>,
        bus: Arc<EventBus>,
        clock: Arc<C>,
        defaults: ManifestDefaults,
    ) -> Self {
        Self {
            team: TeamService::new(Arc::clone(&store), bus, Arc::clone(&clock)),
            store,
            skills,
            clock,
            defaults,
        }
    }

    /// Resolves and validates a request into a manifest for `session_id`.
    /// Nothing is written.
    ///
    /// # Errors
    ///
    /// Returns `Validation` for an empty task list, a cross-project task,
    /// an archived team member, or a role, mode, and strategy that disagree.
    /// Returns `NotFound` for a missing project, task, team member, skill,
    /// or template.
    pub async fn build(
        &self,
        session_id: SessionId,
        request: &ManifestRequest,
    ) -> OrchestrationResult<Manifest> {
        if request.task_ids.is_empty() {
            return Err(OrchestrationError::validation(
                "a manifest needs at least one task",
            ));
        }
        let project = self.project(request.project_id).await?;
        let tasks = self.tasks(request.project_id, &request.task_ids).await?;
        let reference_tasks = self
            .tasks(request.project_id, &request.reference_task_ids)
            .await?;
        let member = match &request.team_member_id {
            Some(id) => Some(self.team.get(request.project_id, id).await?),
            None => None,
        };
        if let Some(archived) = member.as_ref().filter(|member| member.is_archived()) {
            return Err(OrchestrationError::validation(format!(
                "team member {} is archived",
                archived.id()
            ))
            .with_entity(EntityRef::team_member(archived.id())));
        }
        let (mode, strategy) = resolve_strategy(request, member.as_ref())?;
        if let Some(template_id) = &request.template_id
            && self.store.find_template(template_id).await?.is_none()
        {
            return Err(OrchestrationError::not_found(EntityRef::template(
                template_id,
            )));
        }
        let skills = self.skills(&request.skills).await?;
        let snapshots = self.snapshots(request.project_id, &tasks).await?;
        let model = request
            .model
            .clone()
            .or_else(|| member.as_ref().and_then(|m| m.model().map(str::to_owned)))
            .unwrap_or_else(|| self.defaults.model.clone());
        let working_dir = request
            .working_dir
            .clone()
            .or_else(|| self.defaults.working_dir.clone())
            .unwrap_or_else(|| PathBuf::from(project.working_dir()));
        debug!(session = %session_id, %strategy, tasks = snapshots.len(), "manifest built");
        Ok(Manifest {
            session_id,
            role: request.role,
            mode,
            strategy,
            tasks: snapshots,
            context: ManifestContext {
                project_name: project.name().to_owned(),
                working_dir: project.working_dir().to_owned(),
                description: project.description().to_owned(),
                reference_tasks: reference_tasks.iter().map(TaskSnapshot::from).collect(),
            },
            skills,
            session: SessionConfig {
                model,
                working_dir,
                max_turns: request.max_turns.unwrap_or(self.defaults.max_turns),
            },
            template_id: request.template_id.clone(),
            team_member: member.as_ref().map(TeamMember::snapshot),
            allowed_commands: request.allowed_commands.clone(),
            hidden_commands: request.hidden_commands.clone(),
            parent_session_id: request.parent_session_id,
            created_at: self.clock.utc(),
        })
    }

    /// Writes the manifest. Each session's manifest is written once.
    ///
    /// # Errors
    ///
    /// Returns `StateConflict` when the session already has a manifest.
    pub async fn commit(&self, manifest: &Manifest) -> OrchestrationResult<()> {
        self.store.store_manifest(manifest).await?;
        Ok(())
    }

    /// Finds the system template: the manifest's explicit template, then the
    /// stored role and strategy default. `None` means the bundled template.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` when an explicit template no longer exists.
    pub async fn resolve_template(
        &self,
        manifest: &Manifest,
    ) -> OrchestrationResult<Option<Template>> {
        if let Some(id) = &manifest.template_id {
            return self
                .store
                .find_template(id)
                .await?
                .map(Some)
                .ok_or_else(|| OrchestrationError::not_found(EntityRef::template(id)));
        }
        Ok(self
            .store
            .find_default(manifest.role, manifest.strategy)
            .await?)
    }

    /// Resolves the template and compiles the manifest.
    ///
    /// # Errors
    ///
    /// Returns `ManifestGeneration` when rendering fails.
    pub async fn compile(&self, manifest: &Manifest) -> OrchestrationResult<CompiledPrompt> {
        let template = self.resolve_template(manifest).await?;
        Ok(compiler::compile(manifest, template.as_ref())?)
    }

    async fn project(&self, id: ProjectId) -> OrchestrationResult<Project> {
        self.store
            .find_project(id)
            .await?
            .ok_or_else(|| OrchestrationError::not_found(EntityRef::project(id)))
    }

    async fn tasks(&self, project_id: ProjectId, ids: &[TaskId]) -> OrchestrationResult<Vec<Task>> {
        let mut unique: Vec<TaskId> = Vec::with_capacity(ids.len());
        for id in ids {
            if !unique.contains(id) {
                unique.push(*id);
            }
        }
        let found = self.store.find_many(&unique).await?;
        let mut ordered = Vec::with_capacity(unique.len());
        for id in unique {
            let task = found
                .iter()
                .find(|task| task.id() == id)
                .ok_or_else(|| OrchestrationError::not_found(EntityRef::task(id)))?;
            if task.project_id() != project_id {
                return Err(OrchestrationError::validation(format!(
                    "task {id} belongs to another project"
                ))
                .with_entity(EntityRef::task(id)));
            }
            ordered.push(task.clone());
        }
        Ok(ordered)
    }

    async fn snapshots(
        &self,
        project_id: ProjectId,
        tasks: &[Task],
    ) -> OrchestrationResult<Vec<TaskSnapshot>> {
        let mut snapshots: Vec<TaskSnapshot> = tasks.iter().map(TaskSnapshot::from).collect();
        if tasks.len() > 1 {
            let forest = TaskForest::new(self.store.list_by_project(project_id).await?);
            let members: Vec<TaskId> = tasks.iter().map(Task::id).collect();
            let parents = forest.nearest_ancestors_within(&members);
            for snapshot in &mut snapshots {
                snapshot.tree_parent = parents.get(&snapshot.id).copied().flatten();
            }
        }
        Ok(snapshots)
    }

    async fn skills(&self, names: &[String]) -> OrchestrationResult<Vec<Skill>> {
        let mut skills = Vec::with_capacity(names.len());
        for name in names {
            let skill = self.skills.resolve(name).await?.ok_or_else(|| {
                OrchestrationError::not_found(EntityRef::new(EntityKind::Skill, name))
            })?;
            skills.push(skill);
        }
        Ok(skills)
    }
}

/// Explicit fields win, then the team member's, then the role's defaults.
fn resolve_strategy(
    request: &ManifestRequest,
    member: Option<&TeamMember>,
) -> OrchestrationResult<(SessionMode, Strategy)> {
    let mode = request
        .mode
        .or_else(|| member.map(TeamMember::mode))
        .unwrap_or_else(|| request.role.mode());
    if mode != request.role.mode() {
        return Err(OrchestrationError::validation(format!(
            "role {} cannot run in {mode} mode",
            request.role
        )));
    }
    let strategy = request
        .strategy
        .or_else(|| {
            member
                .map(TeamMember::strategy)
                .filter(|strategy| strategy.mode() == mode)
        })
        .unwrap_or_else(|| Strategy::default_for(mode));
    strategy.ensure_mode(mode)?;
    Ok((mode, strategy))
}
