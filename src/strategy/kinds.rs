//! Mode, role, and strategy identifiers.

use super::StrategyError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Whether a session implements work or delegates it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionMode {
    /// Implements tasks directly.
    Execute,
    /// Decomposes and delegates; never implements.
    Coordinate,
}

impl SessionMode {
    /// Returns the canonical string representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Execute => "execute",
            Self::Coordinate => "coordinate",
        }
    }

    /// Returns the role that matches this mode.
    #[must_use]
    pub const fn role(self) -> AgentRole {
        match self {
            Self::Execute => AgentRole::Worker,
            Self::Coordinate => AgentRole::Coordinator,
        }
    }
}

impl fmt::Display for SessionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for SessionMode {
    type Error = StrategyError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.trim().to_ascii_lowercase().as_str() {
            "execute" => Ok(Self::Execute),
            "coordinate" => Ok(Self::Coordinate),
            _ => Err(StrategyError::UnknownMode(value.to_owned())),
        }
    }
}

/// Role an agent plays in the hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentRole {
    /// Implements assigned tasks.
    Worker,
    /// Plans and delegates to workers.
    Coordinator,
}

impl AgentRole {
    /// Returns the canonical string representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Worker => "worker",
            Self::Coordinator => "coordinator",
        }
    }

    /// Returns the mode that matches this role.
    #[must_use]
    pub const fn mode(self) -> SessionMode {
        match self {
            Self::Worker => SessionMode::Execute,
            Self::Coordinator => SessionMode::Coordinate,
        }
    }
}

impl fmt::Display for AgentRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for AgentRole {
    type Error = StrategyError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.trim().to_ascii_lowercase().as_str() {
            "worker" => Ok(Self::Worker),
            "coordinator" | "orchestrator" => Ok(Self::Coordinator),
            _ => Err(StrategyError::UnknownRole(value.to_owned())),
        }
    }
}

/// Worker algorithms (mode `execute`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkerStrategy {
    /// One phase: execute the assigned tasks.
    Simple,
    /// Pull tasks one at a time from a FIFO queue.
    Queue,
    /// Work through a subtask tree in dependency order.
    Tree,
}

/// Coordinator algorithms (mode `coordinate`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CoordinatorStrategy {
    /// Spawn one worker at a time.
    Default,
    /// Spawn dependency-free batches in parallel.
    IntelligentBatching,
    /// Spawn waves of ready nodes from the dependency graph.
    Dag,
}

/// A strategy, tagged by the mode it belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Strategy {
    /// Worker strategy.
    Worker(WorkerStrategy),
    /// Coordinator strategy.
    Coordinator(CoordinatorStrategy),
}

impl Strategy {
    /// The simple worker strategy.
    pub const SIMPLE: Self = Self::Worker(WorkerStrategy::Simple);
    /// The queue worker strategy.
    pub const QUEUE: Self = Self::Worker(WorkerStrategy::Queue);
    /// The tree worker strategy.
    pub const TREE: Self = Self::Worker(WorkerStrategy::Tree);
    /// The sequential coordinator strategy.
    pub const DEFAULT: Self = Self::Coordinator(CoordinatorStrategy::Default);
    /// The batching coordinator strategy.
    pub const BATCHING: Self = Self::Coordinator(CoordinatorStrategy::IntelligentBatching);
    /// The DAG coordinator strategy.
    pub const DAG: Self = Self::Coordinator(CoordinatorStrategy::Dag);

    /// Returns the canonical string representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Worker(WorkerStrategy::Simple) => "simple",
            Self::Worker(WorkerStrategy::Queue) => "queue",
            Self::Worker(WorkerStrategy::Tree) => "tree",
            Self::Coordinator(CoordinatorStrategy::Default) => "default",
            Self::Coordinator(CoordinatorStrategy::IntelligentBatching) => "intelligent-batching",
            Self::Coordinator(CoordinatorStrategy::Dag) => "dag",
        }
    }

    /// Returns the mode this strategy belongs to.
    #[must_use]
    pub const fn mode(self) -> SessionMode {
        match self {
            Self::Worker(_) => SessionMode::Execute,
            Self::Coordinator(_) => SessionMode::Coordinate,
        }
    }

    /// Returns the default strategy for a mode.
    #[must_use]
    pub const fn default_for(mode: SessionMode) -> Self {
        match mode {
            SessionMode::Execute => Self::SIMPLE,
            SessionMode::Coordinate => Self::DEFAULT,
        }
    }

    /// Parses a strategy name and checks it against the mode.
    ///
    /// # Errors
    ///
    /// Returns [`StrategyError::UnknownStrategy`] for unrecognised names and
    /// [`StrategyError::IncompatibleStrategy`] when the strategy belongs to
    /// the other mode.
    pub fn for_mode(mode: SessionMode, name: &str) -> Result<Self, StrategyError> {
        let strategy = Self::try_from(name)?;
        strategy.ensure_mode(mode)?;
        Ok(strategy)
    }

    /// Checks that the strategy belongs to `mode`.
    ///
    /// # Errors
    ///
    /// Returns [`StrategyError::IncompatibleStrategy`] on mismatch.
    pub fn ensure_mode(self, mode: SessionMode) -> Result<(), StrategyError> {
        if self.mode() == mode {
            Ok(())
        } else {
            Err(StrategyError::IncompatibleStrategy {
                strategy: self,
                mode,
            })
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for Strategy {
    type Error = StrategyError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.trim().to_ascii_lowercase().as_str() {
            "simple" => Ok(Self::SIMPLE),
            "queue" => Ok(Self::QUEUE),
            "tree" => Ok(Self::TREE),
            "default" => Ok(Self::DEFAULT),
            "intelligent-batching" | "intelligent_batching" | "batching" => Ok(Self::BATCHING),
            "dag" => Ok(Self::DAG),
            _ => Err(StrategyError::UnknownStrategy(value.to_owned())),
        }
    }
}

impl Serialize for Strategy {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Strategy {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::try_from(raw.as_str()).map_err(serde::de::Error::custom)
    }
}
