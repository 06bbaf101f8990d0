//! Event delivery to sinks and subscribers.

use crate::in_memory::helpers::Fixture;
use eyre::{bail, ensure};
use maestro::adapters::RecordingSink;
use maestro::events::BusMessage;
use maestro::manifest::domain::ManifestRequest;
use maestro::strategy::AgentRole;
use rstest::rstest;
use std::sync::Arc;

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn sinks_receive_every_event_before_shutdown_returns() -> eyre::Result<()> {
    let fixture = Fixture::new().await?;
    let sink = Arc::new(RecordingSink::new());
    fixture.orchestrator.attach_sink(Arc::clone(&sink) as _);
    let task = fixture.root("observed").await?;
    let session = fixture
        .orchestrator
        .supervisor()
        .spawn(&ManifestRequest::new(
            fixture.project.id(),
            vec![task.id()],
            AgentRole::Worker,
        ))
        .await?;
    fixture
        .orchestrator
        .supervisor()
        .report_complete(session.id(), "done")
        .await?;

    fixture.orchestrator.shutdown().await;

    let names = sink.event_names();
    ensure!(names.first() == Some(&"task:created"), "events: {names:?}");
    for expected in ["session:created", "task_session:linked", "session:updated", "task:updated"] {
        ensure!(names.contains(&expected), "missing {expected}: {names:?}");
    }
    let sequences: Vec<u64> = sink.envelopes().iter().map(|envelope| envelope.sequence).collect();
    ensure!(sequences.windows(2).all(|pair| matches!(pair, [a, b] if a < b)));
    ensure!(fixture.orchestrator.bus().is_closed());
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn subscriptions_end_after_shutdown() -> eyre::Result<()> {
    let fixture = Fixture::new().await?;
    let mut subscription = fixture.orchestrator.subscribe();
    let task = fixture.root("last words").await?;

    fixture.orchestrator.shutdown().await;

    let Some(BusMessage::Event(envelope)) = subscription.next().await else {
        bail!("buffered event must still be delivered");
    };
    ensure!(envelope.event.name() == "task:created");
    ensure!(envelope.event.entity().to_string().contains(&task.id().to_string()));
    ensure!(subscription.next().await.is_none());
    ensure!(fixture.orchestrator.shutdown_token().is_cancelled());
    Ok(())
}
