//! The write-once spawn manifest and the compiled prompt.

use super::{Skill, TemplateId};
use crate::session::domain::SessionId;
use crate::strategy::{AgentRole, CommandName, SessionMode, Strategy};
use crate::task::domain::{ProjectId, Task, TaskId, TaskPriority, TaskStatus};
use crate::team::domain::{TeamMemberId, TeamMemberSnapshot};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Input to the manifest builder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestRequest {
    /// Owning project.
    pub project_id: ProjectId,
    /// Tasks the session works on. Must not be empty.
    pub task_ids: Vec<TaskId>,
    /// Agent role.
    pub role: AgentRole,
    /// Explicit mode; defaults to the team member's, then the role's.
    pub mode: Option<SessionMode>,
    /// Explicit strategy; defaults to the team member's, then the mode's.
    pub strategy: Option<Strategy>,
    /// Team member supplying defaults.
    pub team_member_id: Option<TeamMemberId>,
    /// Skill names to resolve through the catalog.
    pub skills: Vec<String>,
    /// Explicit model.
    pub model: Option<String>,
    /// Explicit system template.
    pub template_id: Option<TemplateId>,
    /// Tasks included as read-only context.
    pub reference_task_ids: Vec<TaskId>,
    /// Explicit working directory; defaults to the project's.
    pub working_dir: Option<PathBuf>,
    /// Explicit turn budget.
    pub max_turns: Option<u32>,
    /// Commands added to the strategy's set.
    pub allowed_commands: Vec<CommandName>,
    /// Commands removed from the strategy's set.
    pub hidden_commands: Vec<CommandName>,
    /// Coordinator requesting the spawn.
    pub parent_session_id: Option<SessionId>,
}

impl ManifestRequest {
    /// Creates a request with only the required fields.
    #[must_use]
    pub const fn new(project_id: ProjectId, task_ids: Vec<TaskId>, role: AgentRole) -> Self {
        Self {
            project_id,
            task_ids,
            role,
            mode: None,
            strategy: None,
            team_member_id: None,
            skills: Vec::new(),
            model: None,
            template_id: None,
            reference_task_ids: Vec::new(),
            working_dir: None,
            max_turns: None,
            allowed_commands: Vec::new(),
            hidden_commands: Vec::new(),
            parent_session_id: None,
        }
    }

    /// Sets the strategy.
    #[must_use]
    pub const fn with_strategy(mut self, strategy: Strategy) -> Self {
        self.strategy = Some(strategy);
        self
    }

    /// Sets the mode.
    #[must_use]
    pub const fn with_mode(mut self, mode: SessionMode) -> Self {
        self.mode = Some(mode);
        self
    }

    /// Sets the team member.
    #[must_use]
    pub fn with_team_member(mut self, id: TeamMemberId) -> Self {
        self.team_member_id = Some(id);
        self
    }

    /// Sets the skills.
    #[must_use]
    pub fn with_skills(mut self, skills: impl IntoIterator<Item = String>) -> Self {
        self.skills = skills.into_iter().collect();
        self
    }

    /// Sets the model.
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Sets the system template.
    #[must_use]
    pub fn with_template(mut self, template_id: TemplateId) -> Self {
        self.template_id = Some(template_id);
        self
    }

    /// Sets the reference tasks.
    #[must_use]
    pub fn with_reference_tasks(mut self, ids: impl IntoIterator<Item = TaskId>) -> Self {
        self.reference_task_ids = ids.into_iter().collect();
        self
    }

    /// Sets the turn budget.
    #[must_use]
    pub const fn with_max_turns(mut self, max_turns: u32) -> Self {
        self.max_turns = Some(max_turns);
        self
    }

    /// Sets the commands added to and removed from the strategy's set.
    #[must_use]
    pub fn with_command_overrides(
        mut self,
        allowed: impl IntoIterator<Item = CommandName>,
        hidden: impl IntoIterator<Item = CommandName>,
    ) -> Self {
        self.allowed_commands = allowed.into_iter().collect();
        self.hidden_commands = hidden.into_iter().collect();
        self
    }

    /// Sets the requesting coordinator.
    #[must_use]
    pub const fn with_parent_session(mut self, parent: SessionId) -> Self {
        self.parent_session_id = Some(parent);
        self
    }
}

/// Task fields frozen into a manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSnapshot {
    /// Task identifier.
    pub id: TaskId,
    /// Parent task.
    pub parent_id: Option<TaskId>,
    /// Title.
    pub title: String,
    /// Description.
    pub description: String,
    /// Status at build time.
    pub status: TaskStatus,
    /// Priority.
    pub priority: TaskPriority,
    /// Acceptance criteria.
    pub acceptance_criteria: Vec<String>,
    /// Dependency edges.
    pub dependencies: Vec<TaskId>,
    /// Nearest ancestor among the manifest's own tasks.
    #[serde(default)]
    pub tree_parent: Option<TaskId>,
}

impl From<&Task> for TaskSnapshot {
    fn from(task: &Task) -> Self {
        Self {
            id: task.id(),
            parent_id: task.parent_id(),
            title: task.title().to_owned(),
            description: task.description().to_owned(),
            status: task.status(),
            priority: task.priority(),
            acceptance_criteria: task.acceptance_criteria().to_vec(),
            dependencies: task.dependencies().to_vec(),
            tree_parent: None,
        }
    }
}

/// Project context for the task layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestContext {
    /// Project name.
    pub project_name: String,
    /// Project working directory.
    pub working_dir: String,
    /// Project description.
    pub description: String,
    /// Read-only reference tasks.
    pub reference_tasks: Vec<TaskSnapshot>,
}

/// Process configuration for the spawn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Model identifier.
    pub model: String,
    /// Process working directory.
    pub working_dir: PathBuf,
    /// Turn budget.
    pub max_turns: u32,
}

/// Everything resolved for one spawn. Written once, never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    /// Session the manifest belongs to.
    pub session_id: SessionId,
    /// Agent role.
    pub role: AgentRole,
    /// Session mode.
    pub mode: SessionMode,
    /// Strategy.
    pub strategy: Strategy,
    /// Resolved tasks, in request order.
    pub tasks: Vec<TaskSnapshot>,
    /// Project and reference context.
    pub context: ManifestContext,
    /// Resolved skills.
    pub skills: Vec<Skill>,
    /// Process configuration.
    pub session: SessionConfig,
    /// Explicit system template, if requested.
    pub template_id: Option<TemplateId>,
    /// Team member captured at build time.
    pub team_member: Option<TeamMemberSnapshot>,
    /// Commands added to the strategy's set.
    pub allowed_commands: Vec<CommandName>,
    /// Commands removed from the strategy's set.
    pub hidden_commands: Vec<CommandName>,
    /// Requesting coordinator.
    pub parent_session_id: Option<SessionId>,
    /// Build time.
    pub created_at: DateTime<Utc>,
}

impl Manifest {
    /// Returns the task identifiers in order.
    #[must_use]
    pub fn task_ids(&self) -> Vec<TaskId> {
        self.tasks.iter().map(|task| task.id).collect()
    }
}

/// Output of the prompt compiler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompiledPrompt {
    /// Role-level instructions; identical for identical role, strategy, and
    /// permissions.
    pub system_prompt: String,
    /// Session-specific task description.
    pub task_prompt: String,
    /// Effective commands, sorted by wire name.
    pub command_allowlist: Vec<CommandName>,
    /// SHA-256 of `system_prompt`, lowercase hex.
    pub system_prompt_digest: String,
}
