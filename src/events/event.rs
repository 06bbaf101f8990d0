//! Domain events and their envelopes.

use crate::error::EntityRef;
use crate::queue::domain::QueueState;
use crate::session::domain::{Session, SessionId};
use crate::task::domain::{ProjectId, Task, TaskId};
use crate::team::domain::{TeamMember, TeamMemberId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A change committed by the mutation layer.
///
/// Created and updated events carry the stored entity so subscribers can
/// apply them without refetching.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum DomainEvent {
    /// A task was created.
    #[serde(rename = "task:created")]
    TaskCreated(Box<Task>),
    /// A task changed.
    #[serde(rename = "task:updated")]
    TaskUpdated(Box<Task>),
    /// A task was deleted.
    #[serde(rename = "task:deleted")]
    TaskDeleted {
        /// Deleted task.
        task_id: TaskId,
        /// Owning project.
        project_id: ProjectId,
    },
    /// A session was created.
    #[serde(rename = "session:created")]
    SessionCreated(Box<Session>),
    /// A session changed.
    #[serde(rename = "session:updated")]
    SessionUpdated(Box<Session>),
    /// A session was deleted.
    #[serde(rename = "session:deleted")]
    SessionDeleted {
        /// Deleted session.
        session_id: SessionId,
        /// Owning project.
        project_id: ProjectId,
    },
    /// A task and a session were linked.
    #[serde(rename = "task_session:linked")]
    TaskSessionLinked {
        /// Linked task.
        task_id: TaskId,
        /// Linked session.
        session_id: SessionId,
    },
    /// A task and a session were unlinked.
    #[serde(rename = "task_session:unlinked")]
    TaskSessionUnlinked {
        /// Unlinked task.
        task_id: TaskId,
        /// Unlinked session.
        session_id: SessionId,
    },
    /// A custom team member was created.
    #[serde(rename = "team_member:created")]
    TeamMemberCreated(Box<TeamMember>),
    /// A team member or its override changed.
    #[serde(rename = "team_member:updated")]
    TeamMemberUpdated(Box<TeamMember>),
    /// A team member was archived.
    #[serde(rename = "team_member:archived")]
    TeamMemberArchived(Box<TeamMember>),
    /// A custom team member was deleted.
    #[serde(rename = "team_member:deleted")]
    TeamMemberDeleted {
        /// Deleted member.
        member_id: TeamMemberId,
        /// Owning project.
        project_id: ProjectId,
    },
    /// A session's queue changed.
    #[serde(rename = "queue:updated")]
    QueueUpdated(Box<QueueState>),
}

impl DomainEvent {
    /// Returns the wire name, e.g. `task:created`.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::TaskCreated(_) => "task:created",
            Self::TaskUpdated(_) => "task:updated",
            Self::TaskDeleted { .. } => "task:deleted",
            Self::SessionCreated(_) => "session:created",
            Self::SessionUpdated(_) => "session:updated",
            Self::SessionDeleted { .. } => "session:deleted",
            Self::TaskSessionLinked { .. } => "task_session:linked",
            Self::TaskSessionUnlinked { .. } => "task_session:unlinked",
            Self::TeamMemberCreated(_) => "team_member:created",
            Self::TeamMemberUpdated(_) => "team_member:updated",
            Self::TeamMemberArchived(_) => "team_member:archived",
            Self::TeamMemberDeleted { .. } => "team_member:deleted",
            Self::QueueUpdated(_) => "queue:updated",
        }
    }

    /// Returns the entity the event is about.
    #[must_use]
    pub fn entity(&self) -> EntityRef {
        match self {
            Self::TaskCreated(task) | Self::TaskUpdated(task) => EntityRef::task(task.id()),
            Self::TaskDeleted { task_id, .. }
            | Self::TaskSessionLinked { task_id, .. }
            | Self::TaskSessionUnlinked { task_id, .. } => EntityRef::task(task_id),
            Self::SessionCreated(session) | Self::SessionUpdated(session) => {
                EntityRef::session(session.id())
            }
            Self::SessionDeleted { session_id, .. } => EntityRef::session(session_id),
            Self::TeamMemberCreated(member)
            | Self::TeamMemberUpdated(member)
            | Self::TeamMemberArchived(member) => EntityRef::team_member(member.id()),
            Self::TeamMemberDeleted { member_id, .. } => EntityRef::team_member(member_id),
            Self::QueueUpdated(queue) => EntityRef::queue(queue.session_id()),
        }
    }

    /// Returns the session whose state the event carries, if any.
    #[must_use]
    pub fn session(&self) -> Option<&Session> {
        match self {
            Self::SessionCreated(session) | Self::SessionUpdated(session) => Some(session),
            _ => None,
        }
    }
}

/// A published event with its bus-assigned sequence number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventEnvelope {
    /// Strictly increasing per bus.
    pub sequence: u64,
    /// Commit time of the change.
    pub occurred_at: DateTime<Utc>,
    /// The change itself.
    #[serde(flatten)]
    pub event: DomainEvent,
}
