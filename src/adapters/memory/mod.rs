//! In-memory reference store implementing every repository port.
//!
//! All aggregates live behind one lock, so multi-record changes (the
//! task/session association, session deletion) are atomic by construction.

mod catalog;
mod manifest;
mod queue;
mod session;
mod task;
mod team;

pub use catalog::StaticSkillCatalog;

use crate::manifest::domain::{Manifest, Template, TemplateId};
use crate::queue::domain::QueueState;
use crate::session::domain::{Session, SessionId};
use crate::task::domain::{Project, ProjectId, Task, TaskId};
use crate::team::domain::{TeamMember, TeamMemberId, TeamMemberOverride};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

/// Thread-safe in-memory store for every aggregate.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    state: Arc<RwLock<StoreState>>,
}

#[derive(Debug, Default)]
struct StoreState {
    projects: BTreeMap<ProjectId, Project>,
    tasks: HashMap<TaskId, Task>,
    task_order: Vec<TaskId>,
    sessions: HashMap<SessionId, Session>,
    session_order: Vec<SessionId>,
    queues: HashMap<SessionId, QueueState>,
    members: BTreeMap<(ProjectId, TeamMemberId), TeamMember>,
    overrides: BTreeMap<(ProjectId, TeamMemberId), TeamMemberOverride>,
    manifests: HashMap<SessionId, Manifest>,
    templates: BTreeMap<TemplateId, Template>,
}

impl InMemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned(err: impl std::fmt::Display) -> std::io::Error {
    std::io::Error::other(err.to_string())
}

fn ordered<K, V>(order: &[K], records: &HashMap<K, V>, keep: impl Fn(&V) -> bool) -> Vec<V>
where
    K: std::hash::Hash + Eq,
    V: Clone,
{
    order
        .iter()
        .filter_map(|key| records.get(key))
        .filter(|record| keep(record))
        .cloned()
        .collect()
}
