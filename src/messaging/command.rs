//! Wire types for agent commands and their responses.

use crate::error::{OrchestrationError, OrchestrationResult};
use crate::session::domain::SessionId;
use crate::strategy::{CommandName, Phase, Strategy};
use crate::task::domain::{NewTask, ProjectId, TaskId, TaskPatch, TaskPriority};
use crate::team::domain::TeamMemberId;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One command sent by an agent process.
///
/// On the wire: `{"command": "queue:start", "payload": {...}}`. The payload
/// may be omitted for commands that take no arguments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentCommand {
    /// Command name.
    pub command: CommandName,
    /// Command arguments.
    #[serde(default)]
    pub payload: Value,
}

impl AgentCommand {
    /// Creates a command with an empty payload.
    #[must_use]
    pub const fn new(command: CommandName) -> Self {
        Self {
            command,
            payload: Value::Null,
        }
    }

    /// Replaces the payload.
    #[must_use]
    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }

    /// Parses a command from its JSON form.
    ///
    /// # Errors
    ///
    /// Returns `Validation` for malformed JSON or an unknown command name.
    pub fn parse(raw: &str) -> OrchestrationResult<Self> {
        serde_json::from_str(raw).map_err(|err| {
            OrchestrationError::validation(format!("malformed agent command: {err}"))
        })
    }

    /// Decodes the payload into `T`. A missing payload decodes as `{}`.
    ///
    /// # Errors
    ///
    /// Returns `Validation` when the payload does not match `T`.
    pub fn payload<T: DeserializeOwned>(&self) -> OrchestrationResult<T> {
        let payload = match &self.payload {
            Value::Null => Value::Object(serde_json::Map::new()),
            other => other.clone(),
        };
        serde_json::from_value(payload).map_err(|err| {
            OrchestrationError::validation(format!(
                "invalid payload for {}: {err}",
                self.command
            ))
        })
    }
}

/// Structured reply to an [`AgentCommand`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandResponse {
    /// `true` when the command was applied.
    pub ok: bool,
    /// Command that was handled, absent when it could not be parsed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<CommandName>,
    /// Session phase after the command.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase: Option<Phase>,
    /// Command result.
    #[serde(skip_serializing_if = "Value::is_null")]
    #[serde(default)]
    pub data: Value,
    /// Failure details.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<OrchestrationError>,
}

impl CommandResponse {
    /// Successful response.
    #[must_use]
    pub const fn success(command: CommandName, phase: Phase, data: Value) -> Self {
        Self {
            ok: true,
            command: Some(command),
            phase: Some(phase),
            data,
            error: None,
        }
    }

    /// Failed response.
    #[must_use]
    pub const fn failure(command: Option<CommandName>, error: OrchestrationError) -> Self {
        Self {
            ok: false,
            command,
            phase: None,
            data: Value::Null,
            error: Some(error),
        }
    }
}

/// Payload naming one task.
#[derive(Debug, Clone, Deserialize)]
pub struct TaskTarget {
    /// Target task.
    pub task_id: TaskId,
}

/// Payload optionally naming one task; defaults to the session's first.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OptionalTaskTarget {
    /// Target task.
    #[serde(default)]
    pub task_id: Option<TaskId>,
}

/// `task:create` payload.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateTaskPayload {
    /// Task title.
    pub title: String,
    /// Description.
    #[serde(default)]
    pub description: String,
    /// Parent task.
    #[serde(default)]
    pub parent_id: Option<TaskId>,
    /// Priority.
    #[serde(default)]
    pub priority: Option<TaskPriority>,
    /// Acceptance criteria.
    #[serde(default)]
    pub acceptance_criteria: Vec<String>,
    /// Tasks that must complete first.
    #[serde(default)]
    pub dependencies: Vec<TaskId>,
}

impl CreateTaskPayload {
    /// Converts the payload into a creation request for `project_id`.
    #[must_use]
    pub fn into_new_task(self, project_id: ProjectId) -> NewTask {
        let mut request = NewTask::new(project_id, self.title)
            .with_description(self.description)
            .with_acceptance_criteria(self.acceptance_criteria)
            .with_dependencies(self.dependencies);
        if let Some(parent_id) = self.parent_id {
            request = request.with_parent(parent_id);
        }
        if let Some(priority) = self.priority {
            request = request.with_priority(priority);
        }
        request
    }
}

/// `task:update` payload.
#[derive(Debug, Clone, Deserialize)]
pub struct UpdateTaskPayload {
    /// Task to change.
    pub task_id: TaskId,
    /// Replacement title.
    #[serde(default)]
    pub title: Option<String>,
    /// Replacement description.
    #[serde(default)]
    pub description: Option<String>,
    /// Replacement priority.
    #[serde(default)]
    pub priority: Option<TaskPriority>,
    /// Replacement acceptance criteria.
    #[serde(default)]
    pub acceptance_criteria: Option<Vec<String>>,
    /// Replacement dependency list.
    #[serde(default)]
    pub dependencies: Option<Vec<TaskId>>,
}

impl UpdateTaskPayload {
    /// Returns the field changes, if any.
    #[must_use]
    pub fn patch(&self) -> Option<TaskPatch> {
        let patch = TaskPatch {
            title: self.title.clone(),
            description: self.description.clone(),
            priority: self.priority,
            acceptance_criteria: self.acceptance_criteria.clone(),
            team_member_id: None,
        };
        (patch != TaskPatch::default()).then_some(patch)
    }
}

/// `report:*` payload.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReportPayload {
    /// Progress note, blocking reason, summary, or error.
    #[serde(default)]
    pub message: String,
}

/// `queue:push` payload.
#[derive(Debug, Clone, Deserialize)]
pub struct QueuePushPayload {
    /// Task to append.
    pub task_id: TaskId,
}

/// `queue:fail` payload.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct QueueFailPayload {
    /// Failure reason.
    #[serde(default)]
    pub reason: String,
}

/// `session:spawn` payload.
#[derive(Debug, Clone, Deserialize)]
pub struct SpawnPayload {
    /// Tasks for the worker.
    pub task_ids: Vec<TaskId>,
    /// Worker strategy; the team member's or `simple` when absent.
    #[serde(default)]
    pub strategy: Option<Strategy>,
    /// Team member to run as.
    #[serde(default)]
    pub team_member_id: Option<TeamMemberId>,
    /// Skill names.
    #[serde(default)]
    pub skills: Vec<String>,
    /// Model override.
    #[serde(default)]
    pub model: Option<String>,
}

/// `session:watch` payload.
#[derive(Debug, Clone, Deserialize)]
pub struct WatchPayload {
    /// Sessions to wait for.
    pub session_ids: Vec<SessionId>,
    /// Return once any one of them ends.
    #[serde(default)]
    pub any: bool,
}

/// `session:stop` payload.
#[derive(Debug, Clone, Deserialize)]
pub struct StopPayload {
    /// Session to stop.
    pub session_id: SessionId,
    /// Reason recorded on the timeline.
    #[serde(default)]
    pub reason: Option<String>,
}
