//! Names of the commands an agent may issue back to the core.

use super::StrategyError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

macro_rules! command_names {
    ($( $(#[$doc:meta])* $variant:ident => $name:literal, )+) => {
        /// A command an agent process may send to the core.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub enum CommandName {
            $( $(#[$doc])* $variant, )+
        }

        impl CommandName {
            /// Every command, in declaration order.
            pub const ALL: &'static [Self] = &[ $( Self::$variant, )+ ];

            /// Returns the wire name, e.g. `queue:start`.
            #[must_use]
            pub const fn as_str(self) -> &'static str {
                match self {
                    $( Self::$variant => $name, )+
                }
            }
        }

        impl TryFrom<&str> for CommandName {
            type Error = StrategyError;

            fn try_from(value: &str) -> Result<Self, Self::Error> {
                match value.trim() {
                    $( $name => Ok(Self::$variant), )+
                    _ => Err(StrategyError::UnknownCommand(value.to_owned())),
                }
            }
        }
    };
}

command_names! {
    /// Read one task.
    TaskGet => "task:get",
    /// List the session's tasks.
    TaskList => "task:list",
    /// List a task's direct children.
    TaskChildren => "task:children",
    /// Fetch a task's full subtree.
    TaskTree => "task:tree",
    /// Create a subtask.
    TaskCreate => "task:create",
    /// Update task fields or dependencies.
    TaskUpdate => "task:update",
    /// Mark a task completed.
    TaskComplete => "task:complete",
    /// Mark a task blocked.
    TaskBlock => "task:block",
    /// Recursively check that every descendant is terminal.
    TaskVerify => "task:verify",
    /// Report that work is progressing.
    ReportProgress => "report:progress",
    /// Report that work is blocked.
    ReportBlocked => "report:blocked",
    /// Report that the session finished.
    ReportComplete => "report:complete",
    /// Report that the session failed.
    ReportError => "report:error",
    /// Peek at the next queued item.
    QueueTop => "queue:top",
    /// Claim the next queued item.
    QueueStart => "queue:start",
    /// Close the processing item.
    QueueComplete => "queue:complete",
    /// Fail the processing item.
    QueueFail => "queue:fail",
    /// Skip the processing or next item.
    QueueSkip => "queue:skip",
    /// Append a task to the queue.
    QueuePush => "queue:push",
    /// Aggregate queue counts.
    QueueStatus => "queue:status",
    /// Describe the calling session.
    SessionInfo => "session:info",
    /// Spawn a worker for a task.
    SessionSpawn => "session:spawn",
    /// Block until sessions reach a terminal state.
    SessionWatch => "session:watch",
    /// List sessions spawned by the caller.
    SessionList => "session:list",
    /// Stop a spawned session.
    SessionStop => "session:stop",
    /// Compute a dependency-ordered plan for a subtask tree.
    TreePlan => "tree:plan",
    /// Run the coordinator's spawn and monitor loop to completion.
    OrchestrateRun => "orchestrate:run",
    /// Execute code or edit files directly.
    CodeExecute => "code:execute",
}

impl CommandName {
    /// Returns `true` for commands that perform work directly rather than
    /// delegating it.
    #[must_use]
    pub const fn is_direct_execution(self) -> bool {
        matches!(self, Self::CodeExecute)
    }

    /// Returns `true` for commands that start, watch, or stop other sessions.
    #[must_use]
    pub const fn is_delegation(self) -> bool {
        matches!(
            self,
            Self::SessionSpawn | Self::SessionWatch | Self::SessionStop | Self::OrchestrateRun
        )
    }
}

impl fmt::Display for CommandName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for CommandName {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for CommandName {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::try_from(raw.as_str()).map_err(serde::de::Error::custom)
    }
}
