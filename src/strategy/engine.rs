//! Coordinator executors: the spawn and monitor loops behind
//! `orchestrate:run`.
//!
//! The executors never touch repositories or processes directly. They drive a
//! [`WorkerLauncher`], which the session supervisor implements for a concrete
//! coordinator session, and they return a structured
//! [`OrchestrationReport`].

use super::{CoordinatorStrategy, DagScheduler, DependencyGraph, NodeState, Strategy};
use crate::error::{ErrorKind, OrchestrationResult};
use crate::session::domain::{SessionId, SessionStatus, WatchOutcome};
use crate::task::domain::{Task, TaskId, TaskStatus};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Automatic retry behaviour for failed workers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Extra attempts after the first failure. Zero disables retries.
    #[serde(default)]
    pub max_retries: u32,
}

impl RetryPolicy {
    /// A policy that never retries.
    pub const NONE: Self = Self { max_retries: 0 };

    /// Creates a policy with the given retry budget.
    #[must_use]
    pub const fn new(max_retries: u32) -> Self {
        Self { max_retries }
    }

    /// Returns `true` when a node that failed `attempts` times may run again.
    #[must_use]
    pub const fn allows_retry(self, attempts: u32) -> bool {
        attempts <= self.max_retries
    }
}

/// Retry policy per coordinator strategy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct RetryPolicies {
    /// Policy for the sequential `default` strategy.
    pub default: RetryPolicy,
    /// Policy for `intelligent-batching`.
    pub intelligent_batching: RetryPolicy,
    /// Policy for `dag`.
    pub dag: RetryPolicy,
}

impl RetryPolicies {
    /// Applies the same policy to every strategy.
    #[must_use]
    pub const fn uniform(policy: RetryPolicy) -> Self {
        Self {
            default: policy,
            intelligent_batching: policy,
            dag: policy,
        }
    }

    /// Returns the policy for `strategy`.
    #[must_use]
    pub const fn for_strategy(self, strategy: CoordinatorStrategy) -> RetryPolicy {
        match strategy {
            CoordinatorStrategy::Default => self.default,
            CoordinatorStrategy::IntelligentBatching => self.intelligent_batching,
            CoordinatorStrategy::Dag => self.dag,
        }
    }
}

/// Spawn and watch operations a coordinator executor needs.
#[async_trait]
pub trait WorkerLauncher: Send + Sync {
    /// Spawns a worker for one task and returns its session.
    ///
    /// # Errors
    ///
    /// Spawn and manifest failures are reported as errors of kind
    /// [`ErrorKind::Spawn`] or [`ErrorKind::ManifestGeneration`]; executors
    /// treat those as a failed attempt.
    async fn launch(&self, task_id: TaskId) -> OrchestrationResult<SessionId>;

    /// Waits until every session is terminal or `cancel` fires.
    async fn watch_all(
        &self,
        sessions: &[SessionId],
        cancel: &CancellationToken,
    ) -> OrchestrationResult<WatchOutcome>;

    /// Waits until at least one session is terminal or `cancel` fires.
    async fn watch_any(
        &self,
        sessions: &[SessionId],
        cancel: &CancellationToken,
    ) -> OrchestrationResult<WatchOutcome>;
}

/// One spawn performed by an executor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpawnAttempt {
    /// Task the worker was spawned for.
    pub task_id: TaskId,
    /// Worker session, absent when the spawn itself failed.
    pub session_id: Option<SessionId>,
    /// 1-based attempt number for this task.
    pub attempt: u32,
    /// Final session status, absent while still running.
    pub status: Option<SessionStatus>,
}

/// Structured result of `orchestrate:run`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrchestrationReport {
    /// Coordinator strategy that ran.
    pub strategy: Strategy,
    /// Tasks spawned together, in order: single spawns for `default`,
    /// batches for `intelligent-batching`, waves for `dag`. Rounds are never
    /// empty.
    pub rounds: Vec<Vec<TaskId>>,
    /// Every spawn attempt, in order.
    pub attempts: Vec<SpawnAttempt>,
    /// Final scheduling state per task.
    pub outcomes: BTreeMap<TaskId, NodeState>,
    /// A batch failed after retries and the run stopped early.
    pub aborted: bool,
    /// The caller cancelled the run.
    pub cancelled: bool,
}

impl OrchestrationReport {
    fn new(strategy: CoordinatorStrategy) -> Self {
        Self {
            strategy: Strategy::Coordinator(strategy),
            rounds: Vec::new(),
            attempts: Vec::new(),
            outcomes: BTreeMap::new(),
            aborted: false,
            cancelled: false,
        }
    }

    /// Returns `true` when every task completed.
    #[must_use]
    pub fn succeeded(&self) -> bool {
        !self.aborted
            && !self.cancelled
            && self
                .outcomes
                .values()
                .all(|state| *state == NodeState::Completed)
    }

    /// Returns the tasks whose final state is `state`.
    #[must_use]
    pub fn tasks_in(&self, state: NodeState) -> Vec<TaskId> {
        self.outcomes
            .iter()
            .filter(|(_, outcome)| **outcome == state)
            .map(|(task_id, _)| *task_id)
            .collect()
    }
}

/// Runs coordinator strategies over a set of child tasks.
#[derive(Debug, Clone, Copy, Default)]
pub struct CoordinatorEngine {
    retry: RetryPolicy,
}

struct Run<'a, L: WorkerLauncher + ?Sized> {
    launcher: &'a L,
    cancel: &'a CancellationToken,
    retry: RetryPolicy,
    scheduler: DagScheduler,
    report: OrchestrationReport,
    attempts: BTreeMap<TaskId, u32>,
    running: BTreeMap<SessionId, TaskId>,
}

impl CoordinatorEngine {
    /// Creates an engine with the given retry policy.
    #[must_use]
    pub const fn new(retry: RetryPolicy) -> Self {
        Self { retry }
    }

    /// Returns the retry policy.
    #[must_use]
    pub const fn retry(&self) -> RetryPolicy {
        self.retry
    }

    /// Runs `strategy` over `tasks`.
    ///
    /// Tasks already completed are not spawned again. The dependency graph is
    /// validated before anything is spawned.
    ///
    /// # Errors
    ///
    /// Returns a `StateConflict` for dependency cycles and deadlocks, and
    /// propagates launcher errors other than spawn and manifest failures.
    pub async fn run<L>(
        &self,
        strategy: CoordinatorStrategy,
        tasks: &[Task],
        launcher: &L,
        cancel: &CancellationToken,
    ) -> OrchestrationResult<OrchestrationReport>
    where
        L: WorkerLauncher + ?Sized,
    {
        let graph = DependencyGraph::build(tasks)?;
        let statuses: BTreeMap<TaskId, TaskStatus> =
            tasks.iter().map(|task| (task.id(), task.status())).collect();
        let mut run = Run {
            launcher,
            cancel,
            retry: self.retry,
            scheduler: DagScheduler::new(graph, &statuses),
            report: OrchestrationReport::new(strategy),
            attempts: BTreeMap::new(),
            running: BTreeMap::new(),
        };
        info!(
            strategy = %run.report.strategy,
            tasks = tasks.len(),
            max_retries = self.retry.max_retries,
            "starting coordinator run"
        );
        match strategy {
            CoordinatorStrategy::Default => run.sequential().await?,
            CoordinatorStrategy::IntelligentBatching => run.batches().await?,
            CoordinatorStrategy::Dag => run.waves().await?,
        }
        Ok(run.finish())
    }
}

impl<L: WorkerLauncher + ?Sized> Run<'_, L> {
    async fn sequential(&mut self) -> OrchestrationResult<()> {
        while let Some(task_id) = self.scheduler.ready().first().copied() {
            if self.cancel.is_cancelled() {
                self.report.cancelled = true;
                return Ok(());
            }
            self.report.rounds.push(vec![task_id]);
            self.spawn(task_id).await?;
            if self.running.is_empty() {
                continue;
            }
            let sessions: Vec<SessionId> = self.running.keys().copied().collect();
            let outcome = self.launcher.watch_all(&sessions, self.cancel).await?;
            self.absorb(&outcome);
            if outcome.cancelled {
                self.report.cancelled = true;
                return Ok(());
            }
        }
        self.check_deadlock()
    }

    async fn batches(&mut self) -> OrchestrationResult<()> {
        loop {
            let batch = self.scheduler.ready();
            if batch.is_empty() {
                break;
            }
            info!(size = batch.len(), "spawning batch");
            self.report.rounds.push(batch.clone());
            loop {
                let pending: Vec<TaskId> = self
                    .scheduler
                    .ready()
                    .into_iter()
                    .filter(|task_id| batch.contains(task_id))
                    .collect();
                if pending.is_empty() && self.running.is_empty() {
                    break;
                }
                for task_id in pending {
                    self.spawn(task_id).await?;
                }
                if self.running.is_empty() {
                    continue;
                }
                let sessions: Vec<SessionId> = self.running.keys().copied().collect();
                let outcome = self.launcher.watch_all(&sessions, self.cancel).await?;
                self.absorb(&outcome);
                if outcome.cancelled {
                    self.report.cancelled = true;
                    return Ok(());
                }
            }
            if batch
                .iter()
                .any(|task_id| self.scheduler.state(*task_id) != Some(NodeState::Completed))
            {
                warn!(size = batch.len(), "batch failed; aborting run");
                self.report.aborted = true;
                return Ok(());
            }
        }
        self.check_deadlock()
    }

    async fn waves(&mut self) -> OrchestrationResult<()> {
        loop {
            if self.cancel.is_cancelled() {
                self.report.cancelled = true;
                return Ok(());
            }
            let wave = self.scheduler.ready();
            if !wave.is_empty() {
                info!(size = wave.len(), "spawning wave");
                self.report.rounds.push(wave.clone());
                for task_id in wave {
                    self.spawn(task_id).await?;
                }
            }
            if self.running.is_empty() {
                break;
            }
            let sessions: Vec<SessionId> = self.running.keys().copied().collect();
            let outcome = self.launcher.watch_any(&sessions, self.cancel).await?;
            self.absorb(&outcome);
            if outcome.cancelled {
                self.report.cancelled = true;
                return Ok(());
            }
        }
        self.check_deadlock()
    }

    async fn spawn(&mut self, task_id: TaskId) -> OrchestrationResult<()> {
        let attempt = self.attempts.entry(task_id).or_insert(0);
        *attempt += 1;
        let attempt_number = *attempt;
        self.scheduler.mark_running(task_id);
        match self.launcher.launch(task_id).await {
            Ok(session_id) => {
                debug!(task_id = %task_id, session_id = %session_id, attempt = attempt_number, "worker spawned");
                self.running.insert(session_id, task_id);
                self.report.attempts.push(SpawnAttempt {
                    task_id,
                    session_id: Some(session_id),
                    attempt: attempt_number,
                    status: None,
                });
                Ok(())
            }
            Err(error)
                if matches!(error.kind(), ErrorKind::Spawn | ErrorKind::ManifestGeneration) =>
            {
                warn!(task_id = %task_id, error = %error, "worker spawn failed");
                self.report.attempts.push(SpawnAttempt {
                    task_id,
                    session_id: None,
                    attempt: attempt_number,
                    status: Some(SessionStatus::Failed),
                });
                self.settle(task_id, false);
                Ok(())
            }
            Err(error) => Err(error),
        }
    }

    fn absorb(&mut self, outcome: &WatchOutcome) {
        for (session_id, status) in &outcome.terminal {
            let Some(task_id) = self.running.remove(session_id) else {
                continue;
            };
            if let Some(attempt) = self
                .report
                .attempts
                .iter_mut()
                .rev()
                .find(|attempt| attempt.session_id == Some(*session_id))
            {
                attempt.status = Some(*status);
            }
            self.settle(task_id, *status == SessionStatus::Completed);
        }
    }

    fn settle(&mut self, task_id: TaskId, succeeded: bool) {
        if succeeded {
            let unlocked = self.scheduler.mark_completed(task_id);
            debug!(task_id = %task_id, unlocked = unlocked.len(), "task completed");
            return;
        }
        let attempts = self.attempts.get(&task_id).copied().unwrap_or(0);
        if self.retry.allows_retry(attempts) {
            info!(task_id = %task_id, attempts, "retrying failed task");
            self.scheduler.mark_retry(task_id);
        } else {
            let blocked = self.scheduler.mark_failed(task_id);
            warn!(task_id = %task_id, blocked = blocked.len(), "task failed");
        }
    }

    fn check_deadlock(&self) -> OrchestrationResult<()> {
        if self.scheduler.is_deadlocked() {
            return Err(super::StrategyError::Deadlock {
                pending: self.scheduler.unresolved(),
            }
            .into());
        }
        Ok(())
    }

    fn finish(self) -> OrchestrationReport {
        let mut report = self.report;
        for task_id in self.scheduler.graph().tasks() {
            if let Some(state) = self.scheduler.state(*task_id) {
                report.outcomes.insert(*task_id, state);
            }
        }
        info!(
            strategy = %report.strategy,
            rounds = report.rounds.len(),
            succeeded = report.succeeded(),
            aborted = report.aborted,
            cancelled = report.cancelled,
            "coordinator run finished"
        );
        report
    }
}
