//! Coordinator executor tests over a scripted launcher.

use crate::error::{ErrorKind, OrchestrationError, OrchestrationResult};
use crate::session::domain::{SessionId, SessionStatus, WatchOutcome};
use crate::strategy::{CoordinatorEngine, CoordinatorStrategy, NodeState, RetryPolicy, WorkerLauncher};
use crate::task::domain::{NewTask, ProjectId, Task, TaskId, TaskStatus};
use async_trait::async_trait;
use mockable::DefaultClock;
use rstest::rstest;
use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};
use tokio_util::sync::CancellationToken;

#[derive(Default)]
struct Script {
    failures: BTreeMap<TaskId, u32>,
    spawn_errors: BTreeMap<TaskId, u32>,
    sessions: BTreeMap<SessionId, (TaskId, SessionStatus)>,
    launched: Vec<TaskId>,
}

/// Launcher whose workers end immediately with a scripted status.
#[derive(Default)]
struct ScriptedLauncher {
    script: Mutex<Script>,
}

impl ScriptedLauncher {
    fn failing(task_id: TaskId, times: u32) -> Self {
        let launcher = Self::default();
        launcher.lock().failures.insert(task_id, times);
        launcher
    }

    fn unspawnable(task_id: TaskId) -> Self {
        let launcher = Self::default();
        launcher.lock().spawn_errors.insert(task_id, u32::MAX);
        launcher
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn launched(&self) -> Vec<TaskId> {
        self.lock().launched.clone()
    }

    fn outcome(&self, sessions: &[SessionId], cancel: &CancellationToken, any: bool) -> WatchOutcome {
        let script = self.lock();
        let mut terminal = BTreeMap::new();
        if !cancel.is_cancelled() {
            for session_id in sessions {
                if let Some((_, status)) = script.sessions.get(session_id) {
                    terminal.insert(*session_id, *status);
                    if any {
                        break;
                    }
                }
            }
        }
        let pending = sessions
            .iter()
            .filter(|id| !terminal.contains_key(id))
            .copied()
            .collect();
        WatchOutcome {
            terminal,
            pending,
            cancelled: cancel.is_cancelled(),
        }
    }
}

#[async_trait]
impl WorkerLauncher for ScriptedLauncher {
    async fn launch(&self, task_id: TaskId) -> OrchestrationResult<SessionId> {
        let mut script = self.lock();
        script.launched.push(task_id);
        if let Some(remaining) = script.spawn_errors.get_mut(&task_id).filter(|left| **left > 0) {
            *remaining -= 1;
            return Err(OrchestrationError::spawn("binary missing"));
        }
        let status = match script.failures.get_mut(&task_id).filter(|left| **left > 0) {
            Some(remaining) => {
                *remaining -= 1;
                SessionStatus::Failed
            }
            None => SessionStatus::Completed,
        };
        let session_id = SessionId::new();
        script.sessions.insert(session_id, (task_id, status));
        Ok(session_id)
    }

    async fn watch_all(
        &self,
        sessions: &[SessionId],
        cancel: &CancellationToken,
    ) -> OrchestrationResult<WatchOutcome> {
        Ok(self.outcome(sessions, cancel, false))
    }

    async fn watch_any(
        &self,
        sessions: &[SessionId],
        cancel: &CancellationToken,
    ) -> OrchestrationResult<WatchOutcome> {
        Ok(self.outcome(sessions, cancel, true))
    }
}

fn task(project: ProjectId, title: &str, dependencies: &[TaskId]) -> Task {
    Task::new(
        NewTask::new(project, title).with_dependencies(dependencies.iter().copied()),
        &DefaultClock,
    )
    .expect("valid task")
}

/// `schema -> api -> ui` plus an independent `docs`.
fn pipeline() -> Vec<Task> {
    let project = ProjectId::new();
    let schema = task(project, "schema", &[]);
    let docs = task(project, "docs", &[]);
    let api = task(project, "api", &[schema.id()]);
    let ui = task(project, "ui", &[api.id()]);
    vec![schema, docs, api, ui]
}

fn ids(tasks: &[Task]) -> eyre::Result<[TaskId; 4]> {
    let all: Vec<TaskId> = tasks.iter().map(Task::id).collect();
    all.try_into()
        .map_err(|rest: Vec<TaskId>| eyre::eyre!("expected four tasks, got {}", rest.len()))
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn default_strategy_spawns_one_task_per_round() -> eyre::Result<()> {
    let tasks = pipeline();
    let launcher = ScriptedLauncher::default();

    let report = CoordinatorEngine::default()
        .run(CoordinatorStrategy::Default, &tasks, &launcher, &CancellationToken::new())
        .await?;

    assert!(report.succeeded());
    assert_eq!(report.rounds.len(), tasks.len());
    let order: Vec<TaskId> = report.rounds.iter().flatten().copied().collect();
    let position = |id: TaskId| order.iter().position(|candidate| *candidate == id);
    let [schema, _, api, ui] = ids(&tasks)?;
    assert!(position(schema) < position(api));
    assert!(position(api) < position(ui));
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn batching_spawns_dependency_levels_together() -> eyre::Result<()> {
    let tasks = pipeline();
    let launcher = ScriptedLauncher::default();

    let report = CoordinatorEngine::default()
        .run(
            CoordinatorStrategy::IntelligentBatching,
            &tasks,
            &launcher,
            &CancellationToken::new(),
        )
        .await?;

    let [schema, docs, api, ui] = ids(&tasks)?;
    assert_eq!(report.rounds, vec![vec![schema, docs], vec![api], vec![ui]]);
    assert!(report.succeeded());
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn failed_batch_aborts_the_run() -> eyre::Result<()> {
    let tasks = pipeline();
    let [schema, docs, api, ui] = ids(&tasks)?;
    let launcher = ScriptedLauncher::failing(schema, 1);

    let report = CoordinatorEngine::default()
        .run(
            CoordinatorStrategy::IntelligentBatching,
            &tasks,
            &launcher,
            &CancellationToken::new(),
        )
        .await?;

    assert!(report.aborted);
    assert_eq!(report.rounds, vec![vec![schema, docs]]);
    assert!(!launcher.launched().contains(&api));
    assert!(!launcher.launched().contains(&ui));
    assert_eq!(report.outcomes.get(&docs), Some(&NodeState::Completed));
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn dag_retries_within_policy() -> eyre::Result<()> {
    let tasks = pipeline();
    let [schema, _, _, _] = ids(&tasks)?;
    let launcher = ScriptedLauncher::failing(schema, 1);

    let report = CoordinatorEngine::new(RetryPolicy::new(1))
        .run(CoordinatorStrategy::Dag, &tasks, &launcher, &CancellationToken::new())
        .await?;

    assert!(report.succeeded());
    let schema_attempts: Vec<_> = report
        .attempts
        .iter()
        .filter(|attempt| attempt.task_id == schema)
        .map(|attempt| (attempt.attempt, attempt.status))
        .collect();
    assert_eq!(
        schema_attempts,
        vec![
            (1, Some(SessionStatus::Failed)),
            (2, Some(SessionStatus::Completed))
        ]
    );
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn dag_without_retries_blocks_dependents() -> eyre::Result<()> {
    let tasks = pipeline();
    let [schema, docs, api, ui] = ids(&tasks)?;
    let launcher = ScriptedLauncher::failing(schema, 1);

    let report = CoordinatorEngine::default()
        .run(CoordinatorStrategy::Dag, &tasks, &launcher, &CancellationToken::new())
        .await?;

    assert!(!report.succeeded());
    assert_eq!(report.tasks_in(NodeState::Failed), vec![schema]);
    let mut blocked = report.tasks_in(NodeState::Blocked);
    blocked.sort_unstable();
    let mut expected = vec![api, ui];
    expected.sort_unstable();
    assert_eq!(blocked, expected);
    assert_eq!(report.tasks_in(NodeState::Completed), vec![docs]);
    assert_eq!(launcher.launched().len(), 2);
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn spawn_errors_count_as_failed_attempts() -> eyre::Result<()> {
    let tasks = pipeline();
    let [_, docs, _, _] = ids(&tasks)?;
    let launcher = ScriptedLauncher::unspawnable(docs);

    let report = CoordinatorEngine::new(RetryPolicy::new(2))
        .run(CoordinatorStrategy::Dag, &tasks, &launcher, &CancellationToken::new())
        .await?;

    let docs_attempts: Vec<_> = report
        .attempts
        .iter()
        .filter(|attempt| attempt.task_id == docs)
        .collect();
    assert_eq!(docs_attempts.len(), 3);
    assert!(docs_attempts.iter().all(|attempt| attempt.session_id.is_none()));
    assert_eq!(report.outcomes.get(&docs), Some(&NodeState::Failed));
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn cycles_are_rejected_before_any_spawn() -> eyre::Result<()> {
    let project = ProjectId::new();
    let mut first = task(project, "first", &[]);
    let second = task(project, "second", &[first.id()]);
    first.replace_dependencies(vec![second.id()], &DefaultClock)?;
    let launcher = ScriptedLauncher::default();

    let result = CoordinatorEngine::default()
        .run(
            CoordinatorStrategy::Dag,
            &[first, second],
            &launcher,
            &CancellationToken::new(),
        )
        .await;

    let Err(error) = result else {
        eyre::bail!("cycle must be rejected");
    };
    assert_eq!(error.kind(), ErrorKind::StateConflict);
    assert!(launcher.launched().is_empty());
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn completed_tasks_are_not_spawned_again() -> eyre::Result<()> {
    let mut tasks = pipeline();
    let Some(schema) = tasks.first_mut() else {
        eyre::bail!("pipeline has four tasks");
    };
    schema.transition_to(TaskStatus::Completed, &DefaultClock)?;
    let schema_id = schema.id();
    let launcher = ScriptedLauncher::default();

    let report = CoordinatorEngine::default()
        .run(CoordinatorStrategy::Dag, &tasks, &launcher, &CancellationToken::new())
        .await?;

    assert!(report.succeeded());
    assert!(!launcher.launched().contains(&schema_id));
    assert_eq!(launcher.launched().len(), 3);
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn cancelled_run_spawns_nothing() -> eyre::Result<()> {
    let tasks = pipeline();
    let launcher = ScriptedLauncher::default();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let report = CoordinatorEngine::default()
        .run(CoordinatorStrategy::Dag, &tasks, &launcher, &cancel)
        .await?;

    assert!(report.cancelled);
    assert!(!report.succeeded());
    assert!(launcher.launched().is_empty());
    Ok(())
}
