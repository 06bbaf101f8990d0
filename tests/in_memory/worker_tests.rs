//! Worker sessions driven end to end through the command gateway.

use crate::in_memory::helpers::Fixture;
use eyre::{bail, ensure};
use maestro::ErrorKind;
use maestro::manifest::domain::ManifestRequest;
use maestro::session::domain::SessionStatus;
use maestro::session::ports::SPAWN_ENV_KEYS;
use maestro::strategy::{AgentRole, CommandName, Phase, Strategy};
use maestro::task::domain::{TaskSessionStatus, TaskStatus};
use rstest::rstest;
use serde_json::json;
use std::collections::BTreeSet;

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn simple_worker_reports_progress_then_completes() -> eyre::Result<()> {
    let fixture = Fixture::new().await?;
    let task = fixture.root("T1").await?;
    let session = fixture
        .orchestrator
        .supervisor()
        .spawn(&ManifestRequest::new(
            fixture.project.id(),
            vec![task.id()],
            AgentRole::Worker,
        ))
        .await?;
    ensure!(session.status() == SessionStatus::Idle);

    fixture
        .send(&session, CommandName::ReportProgress, json!({ "message": "halfway" }))
        .await?;
    ensure!(fixture.session(session.id()).await?.status() == SessionStatus::Working);
    ensure!(fixture.task(task.id()).await?.status() == TaskStatus::InProgress);

    fixture
        .send(&session, CommandName::ReportComplete, json!({ "message": "done" }))
        .await?;

    let finished = fixture.session(session.id()).await?;
    ensure!(finished.status() == SessionStatus::Completed);
    ensure!(finished.ended_at().is_some());
    let stored = fixture.task(task.id()).await?;
    ensure!(stored.status() == TaskStatus::Completed);
    ensure!(stored.session_status() == Some(TaskSessionStatus::Completed));
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn identical_inputs_compile_identical_system_prompts() -> eyre::Result<()> {
    let fixture = Fixture::new().await?;
    let first = fixture.root("write the parser").await?;
    let second = fixture.root("write the printer").await?;
    let supervisor = fixture.orchestrator.supervisor();
    for task in [&first, &second] {
        supervisor
            .spawn(
                &ManifestRequest::new(fixture.project.id(), vec![task.id()], AgentRole::Worker)
                    .with_strategy(Strategy::TREE),
            )
            .await?;
    }

    let requests = fixture.spawner.requests();
    let [left, right] = requests.as_slice() else {
        bail!("expected two spawns, got {}", requests.len());
    };
    ensure!(left.system_prompt == right.system_prompt);
    ensure!(left.task_prompt != right.task_prompt);
    ensure!(left.task_prompt.contains("write the parser"));
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn parents_complete_only_after_their_children() -> eyre::Result<()> {
    let fixture = Fixture::new().await?;
    let parent = fixture.root("feature").await?;
    let child = fixture.child(&parent, "subtask", &[]).await?;
    let session = fixture
        .orchestrator
        .supervisor()
        .spawn(
            &ManifestRequest::new(fixture.project.id(), vec![parent.id()], AgentRole::Worker)
                .with_strategy(Strategy::TREE),
        )
        .await?;
    fixture.send(&session, CommandName::TaskTree, json!({})).await?;
    let planned = fixture.send(&session, CommandName::TreePlan, json!({})).await?;
    ensure!(planned.phase == Some(Phase::Execute));

    let early = fixture
        .send(&session, CommandName::TaskComplete, json!({ "task_id": parent.id() }))
        .await;
    ensure!(matches!(early, Err(ref error) if error.kind() == ErrorKind::StateConflict));
    ensure!(fixture.task(parent.id()).await?.status() != TaskStatus::Completed);

    fixture
        .send(&session, CommandName::TaskComplete, json!({ "task_id": child.id() }))
        .await?;
    fixture
        .send(&session, CommandName::TaskComplete, json!({ "task_id": parent.id() }))
        .await?;

    ensure!(fixture.task(parent.id()).await?.status() == TaskStatus::Completed);
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn spawn_environment_is_limited_to_session_keys() -> eyre::Result<()> {
    let fixture = Fixture::new().await?;
    let task = fixture.root("isolated").await?;
    let session = fixture
        .orchestrator
        .supervisor()
        .spawn(&ManifestRequest::new(
            fixture.project.id(),
            vec![task.id()],
            AgentRole::Worker,
        ))
        .await?;

    let requests = fixture.spawner.requests();
    let Some(request) = requests.first() else {
        bail!("worker was not spawned");
    };
    let keys: BTreeSet<&str> = request.env.keys().map(String::as_str).collect();
    ensure!(
        keys == BTreeSet::from(SPAWN_ENV_KEYS),
        "unexpected environment: {keys:?}"
    );
    ensure!(request.env.get("SESSION_ID") == Some(&session.id().to_string()));
    ensure!(request.env.get("TASK_IDS") == Some(&task.id().to_string()));
    Ok(())
}
