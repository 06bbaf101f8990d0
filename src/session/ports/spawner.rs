//! Process spawn port.
//!
//! The agent binary is opaque: it receives a compiled prompt and a small
//! fixed environment, and talks back through the command gateway.

use crate::error::{EntityRef, OrchestrationError};
use crate::session::domain::{SessionId, SpawnHandle};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use thiserror::Error;

/// Environment keys passed to a spawned process. Nothing else is inherited.
pub const SPAWN_ENV_KEYS: [&str; 6] = [
    "SESSION_ID",
    "TASK_IDS",
    "PROJECT_ID",
    "ROLE",
    "STRATEGY",
    "MANIFEST_PATH",
];

/// Everything an adapter needs to start one agent process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpawnRequest {
    /// Session being started.
    pub session_id: SessionId,
    /// Compiled system layer.
    pub system_prompt: String,
    /// Compiled task layer.
    pub task_prompt: String,
    /// Model identifier.
    pub model: String,
    /// Resolved skill plugin directories.
    pub skill_paths: Vec<PathBuf>,
    /// Turn budget for the agent.
    pub max_turns: u32,
    /// Process working directory.
    pub working_dir: PathBuf,
    /// Complete process environment, limited to [`SPAWN_ENV_KEYS`].
    pub env: BTreeMap<String, String>,
}

/// Result type for spawner operations.
pub type SpawnResult<T> = Result<T, SpawnError>;

/// Starts and stops agent processes.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ProcessSpawner: Send + Sync {
    /// Starts the process described by `request`.
    ///
    /// # Errors
    ///
    /// Returns [`SpawnError::Launch`] when the process cannot be started.
    async fn spawn(&self, request: &SpawnRequest) -> SpawnResult<SpawnHandle>;

    /// Stops a running process. Stopping an exited process succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`SpawnError::Terminate`] when the process cannot be signalled.
    async fn terminate(&self, handle: &SpawnHandle) -> SpawnResult<()>;
}

/// Errors returned by spawner adapters.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SpawnError {
    /// The process could not be started.
    #[error("failed to launch session {session_id}: {reason}")]
    Launch {
        /// Session being started.
        session_id: SessionId,
        /// Adapter-provided reason.
        reason: String,
    },

    /// The process could not be stopped.
    #[error("failed to terminate process {handle}: {reason}")]
    Terminate {
        /// Handle identifier.
        handle: String,
        /// Adapter-provided reason.
        reason: String,
    },
}

impl From<SpawnError> for OrchestrationError {
    fn from(error: SpawnError) -> Self {
        match error {
            SpawnError::Launch { session_id, .. } => {
                Self::spawn(error.to_string()).with_entity(EntityRef::session(session_id))
            }
            SpawnError::Terminate { .. } => Self::spawn(error.to_string()),
        }
    }
}
