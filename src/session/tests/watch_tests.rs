//! Watch tests: waiting on sessions through the event bus.

use crate::manifest::domain::ManifestRequest;
use crate::session::domain::{SessionId, SessionStatus};
use crate::strategy::AgentRole;
use crate::test_support::Harness;
use eyre::ensure;
use rstest::rstest;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

async fn spawn_worker(harness: &Harness, title: &str) -> eyre::Result<SessionId> {
    let task = harness.root(title).await?;
    let session = harness
        .supervisor()
        .spawn(&ManifestRequest::new(
            harness.project.id(),
            vec![task.id()],
            AgentRole::Worker,
        ))
        .await?;
    Ok(session.id())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn watch_returns_once_every_session_ends() -> eyre::Result<()> {
    let harness = Harness::new().await?;
    let first = spawn_worker(&harness, "first").await?;
    let second = spawn_worker(&harness, "second").await?;
    let reporter = harness.supervisor();
    let background = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        reporter.report_complete(first, "done").await?;
        reporter.report_error(second, "broken").await
    });

    let outcome = harness
        .supervisor()
        .watch(&[first, second, first], &CancellationToken::new())
        .await?;
    background.await??;

    ensure!(outcome.is_complete());
    ensure!(!outcome.cancelled);
    ensure!(outcome.status_of(first) == Some(SessionStatus::Completed));
    ensure!(outcome.status_of(second) == Some(SessionStatus::Failed));
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn watch_sees_sessions_that_already_ended() -> eyre::Result<()> {
    let harness = Harness::new().await?;
    let session = spawn_worker(&harness, "quick").await?;
    harness.supervisor().stop(session, "done early").await?;

    let outcome = harness
        .supervisor()
        .watch(&[session], &CancellationToken::new())
        .await?;

    ensure!(outcome.status_of(session) == Some(SessionStatus::Stopped));
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn watch_any_returns_on_the_first_terminal_session() -> eyre::Result<()> {
    let harness = Harness::new().await?;
    let fast = spawn_worker(&harness, "fast").await?;
    let slow = spawn_worker(&harness, "slow").await?;
    let reporter = harness.supervisor();
    let background = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        reporter.report_complete(fast, "done").await
    });

    let outcome = harness
        .supervisor()
        .watch_any(&[fast, slow], &CancellationToken::new())
        .await?;
    background.await??;

    ensure!(outcome.status_of(fast) == Some(SessionStatus::Completed));
    ensure!(outcome.pending == vec![slow]);
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn cancelling_a_watch_reports_pending_sessions() -> eyre::Result<()> {
    let harness = Harness::new().await?;
    let session = spawn_worker(&harness, "never ends").await?;
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        trigger.cancel();
    });

    let outcome = harness.supervisor().watch(&[session], &cancel).await?;

    ensure!(outcome.cancelled);
    ensure!(outcome.pending == vec![session]);
    ensure!(outcome.terminal.is_empty());
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn watching_nothing_returns_immediately() -> eyre::Result<()> {
    let harness = Harness::new().await?;

    let outcome = harness
        .supervisor()
        .watch(&[], &CancellationToken::new())
        .await?;

    ensure!(outcome.is_complete());
    Ok(())
}
