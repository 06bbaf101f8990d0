//! Supervisor tests: spawn pipeline, lifecycle reports, and spawn rules.

use crate::error::ErrorKind;
use crate::events::BusMessage;
use crate::manifest::domain::ManifestRequest;
use crate::session::domain::{SessionStatus, TimelineKind};
use crate::session::ports::SPAWN_ENV_KEYS;
use crate::strategy::{AgentRole, CommandName, Strategy};
use crate::task::domain::{NewTask, TaskSessionStatus, TaskStatus};
use crate::test_support::Harness;
use eyre::{bail, ensure};
use rstest::rstest;

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn spawn_links_tasks_and_starts_the_process() -> eyre::Result<()> {
    let harness = Harness::new().await?;
    let supervisor = harness.supervisor();
    let task = harness.root("Write parser").await?;
    let mut events = harness.bus.subscribe();

    let session = supervisor
        .spawn(&ManifestRequest::new(
            harness.project.id(),
            vec![task.id()],
            AgentRole::Worker,
        ))
        .await?;

    ensure!(session.status() == SessionStatus::Idle);
    ensure!(session.strategy() == Strategy::SIMPLE);
    ensure!(session.task_ids() == [task.id()]);
    ensure!(session.permits(CommandName::ReportComplete));
    ensure!(!session.permits(CommandName::SessionSpawn));
    ensure!(session.spawn_handle().is_some());

    let requests = harness.spawner.requests();
    let [request] = requests.as_slice() else {
        bail!("expected one spawn request, got {}", requests.len());
    };
    ensure!(request.session_id == session.id());
    ensure!(request.task_prompt.contains("Write parser"));
    for key in SPAWN_ENV_KEYS {
        ensure!(request.env.contains_key(key), "missing {key}");
    }
    ensure!(request.env.get("TASK_IDS") == Some(&task.id().to_string()));

    let linked = harness.tasks().get(task.id()).await?;
    ensure!(linked.session_ids() == [session.id()]);
    ensure!(linked.session_status() == Some(TaskSessionStatus::Idle));
    ensure!(supervisor.manifest(session.id()).await?.session_id == session.id());

    let Some(BusMessage::Event(first)) = events.next().await else {
        bail!("expected a session:created event");
    };
    ensure!(first.event.name() == "session:created");
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn invalid_request_creates_no_session() -> eyre::Result<()> {
    let harness = Harness::new().await?;
    let task = harness.root("Write parser").await?;

    let result = harness
        .supervisor()
        .spawn(
            &ManifestRequest::new(harness.project.id(), vec![task.id()], AgentRole::Worker)
                .with_strategy(Strategy::DAG),
        )
        .await;

    ensure!(matches!(result, Err(ref error) if error.kind() == ErrorKind::Validation));
    ensure!(harness.supervisor().list(harness.project.id()).await?.is_empty());
    ensure!(harness.spawner.requests().is_empty());
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn spawn_failure_leaves_the_session_failed() -> eyre::Result<()> {
    let harness = Harness::new().await?;
    let supervisor = harness.supervisor();
    let task = harness.root("flaky").await?;
    harness.spawner.fail_next(1);

    let Err(error) = supervisor
        .spawn(&ManifestRequest::new(
            harness.project.id(),
            vec![task.id()],
            AgentRole::Worker,
        ))
        .await
    else {
        bail!("spawn should fail");
    };

    ensure!(error.kind() == ErrorKind::Spawn);
    let sessions = supervisor.list(harness.project.id()).await?;
    let [session] = sessions.as_slice() else {
        bail!("the failed session should still be recorded");
    };
    ensure!(session.status() == SessionStatus::Failed);
    let mirrored = harness.tasks().get(task.id()).await?;
    ensure!(mirrored.session_status() == Some(TaskSessionStatus::Failed));
    ensure!(mirrored.status() == TaskStatus::Todo);
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn worker_reports_drive_task_status() -> eyre::Result<()> {
    let harness = Harness::new().await?;
    let supervisor = harness.supervisor();
    let task = harness.root("Write parser").await?;
    let session = supervisor
        .spawn(&ManifestRequest::new(
            harness.project.id(),
            vec![task.id()],
            AgentRole::Worker,
        ))
        .await?;

    supervisor.report_progress(session.id(), "lexer done").await?;
    let working = harness.tasks().get(task.id()).await?;
    ensure!(working.status() == TaskStatus::InProgress);
    ensure!(working.session_status() == Some(TaskSessionStatus::Working));

    supervisor.report_blocked(session.id(), "needs grammar").await?;
    ensure!(harness.tasks().get(task.id()).await?.status() == TaskStatus::Blocked);

    let finished = supervisor.report_complete(session.id(), "parser merged").await?;
    ensure!(finished.status() == SessionStatus::Completed);
    ensure!(finished.ended_at().is_some());
    let completed = harness.tasks().get(task.id()).await?;
    ensure!(completed.status() == TaskStatus::Completed);
    ensure!(completed.session_status() == Some(TaskSessionStatus::Completed));

    let Err(again) = supervisor.report_complete(session.id(), "again").await else {
        bail!("an ended session cannot report again");
    };
    ensure!(again.kind() == ErrorKind::StateConflict);
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn report_error_keeps_task_status() -> eyre::Result<()> {
    let harness = Harness::new().await?;
    let supervisor = harness.supervisor();
    let task = harness.root("Write parser").await?;
    let session = supervisor
        .spawn(&ManifestRequest::new(
            harness.project.id(),
            vec![task.id()],
            AgentRole::Worker,
        ))
        .await?;
    supervisor.report_progress(session.id(), "started").await?;

    let failed = supervisor.report_error(session.id(), "tests red").await?;

    ensure!(failed.status() == SessionStatus::Failed);
    let mirrored = harness.tasks().get(task.id()).await?;
    ensure!(mirrored.status() == TaskStatus::InProgress);
    ensure!(mirrored.session_status() == Some(TaskSessionStatus::Failed));
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn coordinator_cannot_complete_with_open_children() -> eyre::Result<()> {
    let harness = Harness::new().await?;
    let supervisor = harness.supervisor();
    let parent = harness.root("epic").await?;
    let child = harness.child(&parent, "story").await?;
    let coordinator = supervisor
        .spawn(&ManifestRequest::new(
            harness.project.id(),
            vec![parent.id()],
            AgentRole::Coordinator,
        ))
        .await?;

    let Err(error) = supervisor.report_complete(coordinator.id(), "done").await else {
        bail!("open children must block completion");
    };
    ensure!(error.kind() == ErrorKind::StateConflict);
    ensure!(supervisor.get(coordinator.id()).await?.status() == SessionStatus::Idle);

    harness
        .tasks()
        .set_status(child.id(), TaskStatus::Completed)
        .await?;
    let finished = supervisor.report_complete(coordinator.id(), "done").await?;
    ensure!(finished.status() == SessionStatus::Completed);
    ensure!(harness.tasks().get(parent.id()).await?.status() == TaskStatus::Completed);
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn default_coordinator_spawns_one_worker_at_a_time() -> eyre::Result<()> {
    let harness = Harness::new().await?;
    let supervisor = harness.supervisor();
    let parent = harness.root("epic").await?;
    let first = harness.child(&parent, "first").await?;
    let second = harness.child(&parent, "second").await?;
    let coordinator = supervisor
        .spawn(&ManifestRequest::new(
            harness.project.id(),
            vec![parent.id()],
            AgentRole::Coordinator,
        ))
        .await?;
    let child_request = |task_id| {
        ManifestRequest::new(harness.project.id(), vec![task_id], AgentRole::Worker)
            .with_parent_session(coordinator.id())
    };

    let running = supervisor.spawn(&child_request(first.id())).await?;
    let Err(error) = supervisor.spawn(&child_request(second.id())).await else {
        bail!("a second concurrent worker must be refused");
    };
    ensure!(error.kind() == ErrorKind::StateConflict);

    supervisor.report_complete(running.id(), "done").await?;
    let next = supervisor.spawn(&child_request(second.id())).await?;
    ensure!(next.parent_session_id() == Some(coordinator.id()));
    ensure!(supervisor.list_children(coordinator.id()).await?.len() == 2);
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn dag_coordinator_waits_for_dependencies() -> eyre::Result<()> {
    let harness = Harness::new().await?;
    let supervisor = harness.supervisor();
    let parent = harness.root("epic").await?;
    let base = harness.child(&parent, "base").await?;
    let dependent = harness
        .store_task(
            NewTask::new(harness.project.id(), "dependent")
                .with_parent(parent.id())
                .with_dependencies([base.id()]),
        )
        .await?;
    let coordinator = supervisor
        .spawn(
            &ManifestRequest::new(harness.project.id(), vec![parent.id()], AgentRole::Coordinator)
                .with_strategy(Strategy::DAG),
        )
        .await?;
    let request = ManifestRequest::new(harness.project.id(), vec![dependent.id()], AgentRole::Worker)
        .with_parent_session(coordinator.id());

    let Err(error) = supervisor.spawn(&request).await else {
        bail!("dependent task must wait for its dependency");
    };
    ensure!(error.kind() == ErrorKind::StateConflict);
    ensure!(error.entity().map(|entity| entity.id.clone()) == Some(dependent.id().to_string()));

    harness
        .tasks()
        .set_status(base.id(), TaskStatus::Completed)
        .await?;
    ensure!(supervisor.spawn(&request).await?.status() == SessionStatus::Idle);
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn worker_parent_is_refused() -> eyre::Result<()> {
    let harness = Harness::new().await?;
    let supervisor = harness.supervisor();
    let first = harness.root("first").await?;
    let second = harness.root("second").await?;
    let worker = supervisor
        .spawn(&ManifestRequest::new(
            harness.project.id(),
            vec![first.id()],
            AgentRole::Worker,
        ))
        .await?;

    let result = supervisor
        .spawn(
            &ManifestRequest::new(harness.project.id(), vec![second.id()], AgentRole::Worker)
                .with_parent_session(worker.id()),
        )
        .await;

    ensure!(matches!(result, Err(ref error) if error.kind() == ErrorKind::PermissionDenied));
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn stop_terminates_and_delete_requires_an_ended_session() -> eyre::Result<()> {
    let harness = Harness::new().await?;
    let supervisor = harness.supervisor();
    let task = harness.root("long job").await?;
    let session = supervisor
        .spawn(&ManifestRequest::new(
            harness.project.id(),
            vec![task.id()],
            AgentRole::Worker,
        ))
        .await?;

    let Err(busy) = supervisor.delete(session.id()).await else {
        bail!("a running session cannot be deleted");
    };
    ensure!(busy.kind() == ErrorKind::StateConflict);

    let stopped = supervisor.stop(session.id(), "operator request").await?;
    ensure!(stopped.status() == SessionStatus::Stopped);
    ensure!(harness.spawner.terminated().len() == 1);
    ensure!(
        stopped
            .timeline()
            .iter()
            .any(|entry| entry.kind == TimelineKind::Process && entry.message == "process terminated")
    );
    ensure!(
        harness.tasks().get(task.id()).await?.session_status() == Some(TaskSessionStatus::Stopped)
    );

    supervisor.delete(session.id()).await?;
    let Err(gone) = supervisor.get(session.id()).await else {
        bail!("deleted session must not resolve");
    };
    ensure!(gone.kind() == ErrorKind::NotFound);
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn queue_worker_gets_its_queue_at_spawn() -> eyre::Result<()> {
    let harness = Harness::new().await?;
    let supervisor = harness.supervisor();
    let first = harness.root("first").await?;
    let second = harness.root("second").await?;

    let session = supervisor
        .spawn(
            &ManifestRequest::new(
                harness.project.id(),
                vec![first.id(), second.id()],
                AgentRole::Worker,
            )
            .with_strategy(Strategy::QUEUE),
        )
        .await?;

    let counts = supervisor.queues().status(session.id()).await?;
    ensure!(counts.queued == 2);
    ensure!(
        harness.tasks().get(first.id()).await?.session_status() == Some(TaskSessionStatus::Queued)
    );
    Ok(())
}
