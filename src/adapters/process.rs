//! Spawner that starts the agent binary with `tokio::process`.

use crate::session::domain::SpawnHandle;
use crate::session::ports::{ProcessSpawner, SpawnError, SpawnRequest, SpawnResult};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Starts one agent process per session.
///
/// The child sees only the request environment: the inherited environment
/// is cleared before the request's variables are applied.
#[derive(Debug)]
pub struct AgentProcessSpawner {
    binary: PathBuf,
    args: Vec<String>,
    children: Mutex<HashMap<String, Child>>,
}

impl AgentProcessSpawner {
    /// Creates a spawner for `binary`, passing `args` before the per-session
    /// arguments.
    #[must_use]
    pub fn new(binary: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            binary: binary.into(),
            args,
            children: Mutex::new(HashMap::new()),
        }
    }

    fn command(&self, request: &SpawnRequest) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.args(&self.args)
            .arg("--model")
            .arg(&request.model)
            .arg("--max-turns")
            .arg(request.max_turns.to_string())
            .arg("--append-system-prompt")
            .arg(&request.system_prompt);
        for path in &request.skill_paths {
            cmd.arg("--plugin-dir").arg(path);
        }
        cmd.arg("-p")
            .arg(&request.task_prompt)
            .current_dir(&request.working_dir)
            .env_clear()
            .envs(&request.env)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        cmd
    }
}

#[async_trait]
impl ProcessSpawner for AgentProcessSpawner {
    async fn spawn(&self, request: &SpawnRequest) -> SpawnResult<SpawnHandle> {
        let child = self
            .command(request)
            .spawn()
            .map_err(|err| SpawnError::Launch {
                session_id: request.session_id,
                reason: format!("{}: {err}", self.binary.display()),
            })?;
        let id = format!("agent-{}", request.session_id);
        let mut handle = SpawnHandle::new(id.clone());
        handle.pid = child.id();
        info!(session = %request.session_id, pid = ?handle.pid, "agent process started");
        self.children.lock().await.insert(id, child);
        Ok(handle)
    }

    async fn terminate(&self, handle: &SpawnHandle) -> SpawnResult<()> {
        let Some(mut child) = self.children.lock().await.remove(&handle.id) else {
            debug!(handle = %handle.id, "no tracked process to terminate");
            return Ok(());
        };
        if let Err(err) = child.start_kill() {
            if err.kind() == std::io::ErrorKind::InvalidInput {
                return Ok(());
            }
            return Err(SpawnError::Terminate {
                handle: handle.id.clone(),
                reason: err.to_string(),
            });
        }
        match child.wait().await {
            Ok(status) => debug!(handle = %handle.id, %status, "agent process exited"),
            Err(err) => warn!(handle = %handle.id, error = %err, "failed to reap agent process"),
        }
        Ok(())
    }
}
