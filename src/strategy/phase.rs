//! Phase machines: per-strategy phase sequences and command allowlists.

use super::{CommandName, CoordinatorStrategy, Strategy, StrategyError, WorkerStrategy};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use CommandName as C;

/// A step in a strategy's phase sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Implement the assigned work.
    Execute,
    /// Look at the next queue item.
    Pull,
    /// Claim the next queue item.
    Claim,
    /// Record the outcome of a queue item.
    Report,
    /// Queue drained; nothing left to do.
    Finish,
    /// Read the task and its subtree.
    Analyze,
    /// Order the subtree for execution.
    Plan,
    /// Create child tasks.
    Decompose,
    /// Spawn workers.
    Spawn,
    /// Wait on spawned workers.
    Monitor,
    /// Check that every descendant is terminal.
    Verify,
    /// Session-level completion.
    Complete,
}

impl Phase {
    /// Returns the canonical string representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Execute => "execute",
            Self::Pull => "pull",
            Self::Claim => "claim",
            Self::Report => "report",
            Self::Finish => "finish",
            Self::Analyze => "analyze",
            Self::Plan => "plan",
            Self::Decompose => "decompose",
            Self::Spawn => "spawn",
            Self::Monitor => "monitor",
            Self::Verify => "verify",
            Self::Complete => "complete",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Commands accepted in every phase of every strategy.
pub const ALWAYS_ALLOWED: &[CommandName] = &[C::ReportError, C::SessionInfo];

/// Common interface of every strategy's phase sequence.
pub trait PhaseMachine {
    /// Phases in their nominal order.
    fn phases(&self) -> &'static [Phase];

    /// Phase a fresh session starts in.
    fn initial_phase(&self) -> Phase;

    /// Commands accepted in `phase`, excluding [`ALWAYS_ALLOWED`].
    fn allowed_commands(&self, phase: Phase) -> &'static [CommandName];

    /// Phase reached after `command` succeeds in `phase`.
    fn next_phase(&self, phase: Phase, command: CommandName) -> Phase;
}

const SIMPLE_PHASES: &[Phase] = &[Phase::Execute];
const QUEUE_PHASES: &[Phase] = &[
    Phase::Pull,
    Phase::Claim,
    Phase::Execute,
    Phase::Report,
    Phase::Finish,
];
const TREE_PHASES: &[Phase] = &[Phase::Analyze, Phase::Plan, Phase::Execute, Phase::Complete];
const COORDINATOR_PHASES: &[Phase] = &[
    Phase::Analyze,
    Phase::Decompose,
    Phase::Spawn,
    Phase::Monitor,
    Phase::Verify,
    Phase::Complete,
];

const SIMPLE_EXECUTE: &[CommandName] = &[
    C::TaskGet,
    C::TaskList,
    C::TaskChildren,
    C::TaskTree,
    C::TaskUpdate,
    C::TaskBlock,
    C::CodeExecute,
    C::ReportProgress,
    C::ReportBlocked,
    C::ReportComplete,
];

const QUEUE_PULL: &[CommandName] = &[
    C::QueueTop,
    C::QueueStatus,
    C::QueuePush,
    C::ReportProgress,
    C::ReportComplete,
];
const QUEUE_CLAIM: &[CommandName] = &[C::QueueTop, C::QueueStart, C::QueueSkip, C::QueueStatus];
const QUEUE_EXECUTE: &[CommandName] = &[
    C::TaskGet,
    C::TaskChildren,
    C::TaskUpdate,
    C::CodeExecute,
    C::ReportProgress,
    C::ReportBlocked,
    C::QueueComplete,
    C::QueueFail,
    C::QueueSkip,
    C::QueueStatus,
];
const QUEUE_REPORT: &[CommandName] = &[
    C::ReportProgress,
    C::QueueStatus,
    C::QueuePush,
    C::QueueTop,
    C::ReportComplete,
];
const QUEUE_FINISH: &[CommandName] = &[C::QueueStatus];

const TREE_ANALYZE: &[CommandName] = &[
    C::TaskGet,
    C::TaskTree,
    C::TaskChildren,
    C::ReportProgress,
];
const TREE_PLAN: &[CommandName] = &[C::TaskGet, C::TaskTree, C::TreePlan, C::ReportProgress];
const TREE_EXECUTE: &[CommandName] = &[
    C::TaskGet,
    C::TaskChildren,
    C::TaskTree,
    C::TaskUpdate,
    C::TaskComplete,
    C::TaskBlock,
    C::TreePlan,
    C::CodeExecute,
    C::ReportProgress,
    C::ReportBlocked,
    C::ReportComplete,
];

const COORD_ANALYZE: &[CommandName] = &[
    C::TaskGet,
    C::TaskList,
    C::TaskTree,
    C::TaskChildren,
    C::TaskCreate,
    C::SessionList,
    C::ReportProgress,
];
const COORD_DECOMPOSE: &[CommandName] = &[
    C::TaskGet,
    C::TaskTree,
    C::TaskChildren,
    C::TaskCreate,
    C::TaskUpdate,
    C::SessionSpawn,
    C::OrchestrateRun,
    C::ReportProgress,
];
const COORD_SPAWN: &[CommandName] = &[
    C::SessionSpawn,
    C::SessionWatch,
    C::SessionList,
    C::OrchestrateRun,
    C::ReportProgress,
];
const COORD_MONITOR: &[CommandName] = &[
    C::SessionWatch,
    C::SessionList,
    C::SessionSpawn,
    C::SessionStop,
    C::TaskGet,
    C::TaskVerify,
    C::ReportProgress,
];
const COORD_VERIFY: &[CommandName] = &[
    C::TaskVerify,
    C::TaskGet,
    C::TaskChildren,
    C::TaskTree,
    C::SessionList,
    C::SessionSpawn,
    C::ReportProgress,
    C::ReportBlocked,
    C::ReportComplete,
];

impl PhaseMachine for WorkerStrategy {
    fn phases(&self) -> &'static [Phase] {
        match self {
            Self::Simple => SIMPLE_PHASES,
            Self::Queue => QUEUE_PHASES,
            Self::Tree => TREE_PHASES,
        }
    }

    fn initial_phase(&self) -> Phase {
        match self {
            Self::Simple => Phase::Execute,
            Self::Queue => Phase::Pull,
            Self::Tree => Phase::Analyze,
        }
    }

    fn allowed_commands(&self, phase: Phase) -> &'static [CommandName] {
        match (self, phase) {
            (Self::Simple, Phase::Execute) => SIMPLE_EXECUTE,
            (Self::Queue, Phase::Pull) => QUEUE_PULL,
            (Self::Queue, Phase::Claim) => QUEUE_CLAIM,
            (Self::Queue, Phase::Execute) => QUEUE_EXECUTE,
            (Self::Queue, Phase::Report) => QUEUE_REPORT,
            (Self::Queue, Phase::Finish) => QUEUE_FINISH,
            (Self::Tree, Phase::Analyze) => TREE_ANALYZE,
            (Self::Tree, Phase::Plan) => TREE_PLAN,
            (Self::Tree, Phase::Execute) => TREE_EXECUTE,
            _ => &[],
        }
    }

    fn next_phase(&self, phase: Phase, command: CommandName) -> Phase {
        match (self, phase, command) {
            (Self::Queue, Phase::Pull | Phase::Report, C::QueueTop) => Phase::Claim,
            (Self::Queue, Phase::Pull | Phase::Report, C::ReportComplete) => Phase::Finish,
            (Self::Queue, Phase::Claim, C::QueueStart) => Phase::Execute,
            (Self::Queue, Phase::Claim, C::QueueSkip) => Phase::Pull,
            (Self::Queue, Phase::Execute, C::QueueComplete | C::QueueFail | C::QueueSkip) => {
                Phase::Report
            }
            (Self::Tree, Phase::Analyze, C::TaskTree) => Phase::Plan,
            (Self::Tree, Phase::Plan, C::TreePlan) => Phase::Execute,
            (Self::Tree, Phase::Execute, C::ReportComplete) => Phase::Complete,
            _ => phase,
        }
    }
}

impl PhaseMachine for CoordinatorStrategy {
    fn phases(&self) -> &'static [Phase] {
        COORDINATOR_PHASES
    }

    fn initial_phase(&self) -> Phase {
        Phase::Analyze
    }

    fn allowed_commands(&self, phase: Phase) -> &'static [CommandName] {
        match phase {
            Phase::Analyze => COORD_ANALYZE,
            Phase::Decompose => COORD_DECOMPOSE,
            Phase::Spawn => COORD_SPAWN,
            Phase::Monitor => COORD_MONITOR,
            Phase::Verify => COORD_VERIFY,
            _ => &[],
        }
    }

    fn next_phase(&self, phase: Phase, command: CommandName) -> Phase {
        match (phase, command) {
            (Phase::Analyze, C::TaskCreate) => Phase::Decompose,
            (Phase::Decompose | Phase::Monitor | Phase::Verify, C::SessionSpawn) => Phase::Spawn,
            (Phase::Spawn, C::SessionWatch) => Phase::Monitor,
            (Phase::Decompose | Phase::Spawn, C::OrchestrateRun) | (Phase::Monitor, C::TaskVerify) => {
                Phase::Verify
            }
            (Phase::Verify, C::ReportComplete) => Phase::Complete,
            _ => phase,
        }
    }
}

impl PhaseMachine for Strategy {
    fn phases(&self) -> &'static [Phase] {
        match self {
            Self::Worker(worker) => worker.phases(),
            Self::Coordinator(coordinator) => coordinator.phases(),
        }
    }

    fn initial_phase(&self) -> Phase {
        match self {
            Self::Worker(worker) => worker.initial_phase(),
            Self::Coordinator(coordinator) => coordinator.initial_phase(),
        }
    }

    fn allowed_commands(&self, phase: Phase) -> &'static [CommandName] {
        match self {
            Self::Worker(worker) => worker.allowed_commands(phase),
            Self::Coordinator(coordinator) => coordinator.allowed_commands(phase),
        }
    }

    fn next_phase(&self, phase: Phase, command: CommandName) -> Phase {
        match self {
            Self::Worker(worker) => worker.next_phase(phase, command),
            Self::Coordinator(coordinator) => coordinator.next_phase(phase, command),
        }
    }
}

impl Strategy {
    /// Every command the strategy accepts in any phase, sorted by wire name.
    #[must_use]
    pub fn command_set(self) -> Vec<CommandName> {
        let mut set: BTreeSet<CommandName> = ALWAYS_ALLOWED.iter().copied().collect();
        for phase in self.phases() {
            set.extend(self.allowed_commands(*phase).iter().copied());
        }
        let mut commands: Vec<CommandName> = set.into_iter().collect();
        commands.sort_by_key(|command| command.as_str());
        commands
    }

    /// Checks `command` against `phase` and returns the phase to move to.
    ///
    /// # Errors
    ///
    /// Returns [`StrategyError::DirectExecutionForbidden`] when a coordinator
    /// asks to execute work itself and [`StrategyError::CommandNotAllowed`]
    /// when the command is outside the phase allowlist.
    pub fn authorize(self, phase: Phase, command: CommandName) -> Result<Phase, StrategyError> {
        if matches!(self, Self::Coordinator(_)) && command.is_direct_execution() {
            return Err(StrategyError::DirectExecutionForbidden {
                strategy: self,
                command,
            });
        }
        if ALWAYS_ALLOWED.contains(&command) || self.allowed_commands(phase).contains(&command) {
            return Ok(self.next_phase(phase, command));
        }
        Err(StrategyError::CommandNotAllowed {
            strategy: self,
            phase,
            command,
        })
    }
}
