//! Queue workers and the queue manager's concurrency guarantees.

use crate::in_memory::helpers::Fixture;
use eyre::ensure;
use maestro::ErrorKind;
use maestro::manifest::domain::ManifestRequest;
use maestro::queue::domain::{QueueCounts, QueueItem};
use maestro::session::domain::Session;
use maestro::strategy::{AgentRole, CommandName, Phase, Strategy};
use maestro::task::domain::{Task, TaskSessionStatus, TaskStatus};
use rstest::rstest;
use serde_json::json;

async fn queue_worker(fixture: &Fixture, tasks: &[&Task]) -> eyre::Result<Session> {
    Ok(fixture
        .orchestrator
        .supervisor()
        .spawn(
            &ManifestRequest::new(
                fixture.project.id(),
                tasks.iter().map(|task| task.id()).collect(),
                AgentRole::Worker,
            )
            .with_strategy(Strategy::QUEUE),
        )
        .await?)
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn start_claims_in_push_order_and_top_moves_on() -> eyre::Result<()> {
    let fixture = Fixture::new().await?;
    let first = fixture.root("T1").await?;
    let second = fixture.root("T2").await?;
    let session = queue_worker(&fixture, &[&first]).await?;

    fixture
        .send(&session, CommandName::QueuePush, json!({ "task_id": second.id() }))
        .await?;
    let duplicate = fixture
        .send(&session, CommandName::QueuePush, json!({ "task_id": first.id() }))
        .await;
    ensure!(matches!(duplicate, Err(ref error) if error.kind() == ErrorKind::StateConflict));

    fixture.send(&session, CommandName::QueueTop, json!({})).await?;
    let claimed = fixture.send(&session, CommandName::QueueStart, json!({})).await?;
    let claimed_item: QueueItem = serde_json::from_value(claimed.data)?;
    ensure!(claimed_item.task_id == first.id());
    ensure!(claimed.phase == Some(Phase::Execute));
    ensure!(fixture.task(first.id()).await?.status() == TaskStatus::InProgress);

    fixture.send(&session, CommandName::QueueComplete, json!({})).await?;
    let top = fixture.send(&session, CommandName::QueueTop, json!({})).await?;
    let next: Option<QueueItem> = serde_json::from_value(top.data)?;

    ensure!(next.map(|item| item.task_id) == Some(second.id()));
    let done = fixture.task(first.id()).await?;
    ensure!(done.status() == TaskStatus::Completed);
    ensure!(done.session_status() == Some(TaskSessionStatus::Completed));
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn completing_twice_is_a_state_conflict() -> eyre::Result<()> {
    let fixture = Fixture::new().await?;
    let task = fixture.root("once").await?;
    let session = queue_worker(&fixture, &[&task]).await?;
    let queues = fixture.orchestrator.queues();
    queues.start(session.id()).await?;
    queues.complete(session.id()).await?;

    let again = queues.complete(session.id()).await;

    ensure!(matches!(again, Err(ref error) if error.kind() == ErrorKind::StateConflict));
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn concurrent_claims_never_process_two_items() -> eyre::Result<()> {
    let fixture = Fixture::new().await?;
    let first = fixture.root("first").await?;
    let second = fixture.root("second").await?;
    let session = queue_worker(&fixture, &[&first, &second]).await?;
    let queues = fixture.orchestrator.queues();

    let (left, right) = tokio::join!(queues.start(session.id()), queues.start(session.id()));

    let claimed = [&left, &right].iter().filter(|result| result.is_ok()).count();
    ensure!(claimed == 1, "exactly one claim wins: {left:?} / {right:?}");
    let counts: QueueCounts = queues.status(session.id()).await?;
    ensure!(counts.processing == 1);
    ensure!(counts.queued == 1);
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn failed_items_are_not_retried() -> eyre::Result<()> {
    let fixture = Fixture::new().await?;
    let flaky = fixture.root("flaky").await?;
    let steady = fixture.root("steady").await?;
    let session = queue_worker(&fixture, &[&flaky, &steady]).await?;

    fixture.send(&session, CommandName::QueueTop, json!({})).await?;
    fixture.send(&session, CommandName::QueueStart, json!({})).await?;
    fixture
        .send(&session, CommandName::QueueFail, json!({ "reason": "compile error" }))
        .await?;
    let top = fixture.send(&session, CommandName::QueueTop, json!({})).await?;
    let next: Option<QueueItem> = serde_json::from_value(top.data)?;

    ensure!(next.map(|item| item.task_id) == Some(steady.id()));
    let failed = fixture.task(flaky.id()).await?;
    ensure!(failed.session_status() == Some(TaskSessionStatus::Failed));
    Ok(())
}
