//! Coordinator sessions delegating to simulated workers.

use crate::in_memory::helpers::Fixture;
use eyre::{bail, ensure};
use maestro::ErrorKind;
use maestro::manifest::domain::ManifestRequest;
use maestro::session::domain::{Session, SessionStatus};
use maestro::strategy::{AgentRole, CommandName, NodeState, OrchestrationReport, Phase, Strategy};
use maestro::task::domain::{ChildOutcome, Task, TaskStatus, VerificationReport};
use rstest::rstest;
use serde_json::json;
use std::collections::BTreeSet;

async fn coordinator(fixture: &Fixture, root: &Task, strategy: Strategy) -> eyre::Result<Session> {
    Ok(fixture
        .orchestrator
        .supervisor()
        .spawn(
            &ManifestRequest::new(fixture.project.id(), vec![root.id()], AgentRole::Coordinator)
                .with_strategy(strategy),
        )
        .await?)
}

async fn create_child(
    fixture: &Fixture,
    session: &Session,
    parent: &Task,
    title: &str,
    dependencies: &[&Task],
) -> eyre::Result<Task> {
    let ids: Vec<_> = dependencies.iter().map(|task| task.id()).collect();
    let response = fixture
        .send(
            session,
            CommandName::TaskCreate,
            json!({ "title": title, "parent_id": parent.id(), "dependencies": ids }),
        )
        .await?;
    Ok(serde_json::from_value(response.data)?)
}

async fn run(fixture: &Fixture, session: &Session) -> eyre::Result<OrchestrationReport> {
    let response = fixture
        .send(session, CommandName::OrchestrateRun, json!({}))
        .await?;
    ensure!(response.phase == Some(Phase::Verify));
    Ok(serde_json::from_value(response.data)?)
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn default_coordinator_leaves_parent_open_when_a_child_fails() -> eyre::Result<()> {
    let fixture = Fixture::new().await?;
    let parent = fixture.root("P").await?;
    let session = coordinator(&fixture, &parent, Strategy::DEFAULT).await?;
    let first = create_child(&fixture, &session, &parent, "C1", &[]).await?;
    let second = create_child(&fixture, &session, &parent, "C2", &[]).await?;
    let workers = fixture.simulate_workers(vec![first.id()]);

    let report = run(&fixture, &session).await?;
    workers.abort();

    ensure!(!report.succeeded());
    ensure!(report.rounds.iter().all(|round| round.len() == 1));
    ensure!(report.tasks_in(NodeState::Failed) == vec![first.id()]);
    ensure!(report.tasks_in(NodeState::Completed) == vec![second.id()]);

    let verified = fixture
        .send(&session, CommandName::TaskVerify, json!({}))
        .await?;
    let verification: VerificationReport = serde_json::from_value(verified.data)?;
    ensure!(verification.outcome_of(first.id()) == Some(ChildOutcome::Failed));
    ensure!(verification.outcome_of(second.id()) == Some(ChildOutcome::Completed));
    ensure!(!verification.is_completable());

    let completion = fixture
        .send(&session, CommandName::ReportComplete, json!({ "message": "done" }))
        .await;
    ensure!(matches!(completion, Err(ref error) if error.kind() == ErrorKind::StateConflict));
    ensure!(fixture.task(parent.id()).await?.status() != TaskStatus::Completed);
    ensure!(fixture.session(session.id()).await?.status() != SessionStatus::Completed);
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn dag_coordinator_spawns_the_dependent_in_its_own_wave() -> eyre::Result<()> {
    let fixture = Fixture::new().await?;
    let parent = fixture.root("release").await?;
    let session = coordinator(&fixture, &parent, Strategy::DAG).await?;
    let left = create_child(&fixture, &session, &parent, "A", &[]).await?;
    let right = create_child(&fixture, &session, &parent, "B", &[]).await?;
    let join = create_child(&fixture, &session, &parent, "C", &[&left, &right]).await?;
    let workers = fixture.simulate_workers(Vec::new());

    let report = run(&fixture, &session).await?;
    workers.abort();

    ensure!(report.succeeded(), "report: {report:?}");
    let [first_wave, second_wave] = report.rounds.as_slice() else {
        bail!("expected two waves, got {:?}", report.rounds);
    };
    let first: BTreeSet<_> = first_wave.iter().copied().collect();
    ensure!(first == BTreeSet::from([left.id(), right.id()]));
    ensure!(second_wave == &vec![join.id()]);

    let spawned_for: Vec<_> = fixture
        .spawner
        .requests()
        .iter()
        .filter_map(|request| request.env.get("TASK_IDS").cloned())
        .collect();
    let position = |task: &Task| {
        let id = task.id().to_string();
        spawned_for.iter().position(|ids| *ids == id)
    };
    ensure!(position(&join) > position(&left));
    ensure!(position(&join) > position(&right));

    fixture
        .send(&session, CommandName::ReportComplete, json!({ "message": "released" }))
        .await?;
    ensure!(fixture.task(parent.id()).await?.status() == TaskStatus::Completed);
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn batching_coordinator_groups_dependency_levels() -> eyre::Result<()> {
    let fixture = Fixture::new().await?;
    let parent = fixture.root("migration").await?;
    let session = coordinator(&fixture, &parent, Strategy::BATCHING).await?;
    let schema = create_child(&fixture, &session, &parent, "schema", &[]).await?;
    let docs = create_child(&fixture, &session, &parent, "docs", &[]).await?;
    let api = create_child(&fixture, &session, &parent, "api", &[&schema]).await?;
    let workers = fixture.simulate_workers(Vec::new());

    let report = run(&fixture, &session).await?;
    workers.abort();

    ensure!(report.succeeded());
    let [first_batch, second_batch] = report.rounds.as_slice() else {
        bail!("expected two batches, got {:?}", report.rounds);
    };
    let first: BTreeSet<_> = first_batch.iter().copied().collect();
    ensure!(first == BTreeSet::from([schema.id(), docs.id()]));
    ensure!(second_batch == &vec![api.id()]);
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn dependency_cycles_are_rejected_at_decompose() -> eyre::Result<()> {
    let fixture = Fixture::new().await?;
    let parent = fixture.root("loop").await?;
    let session = coordinator(&fixture, &parent, Strategy::DAG).await?;
    let first = create_child(&fixture, &session, &parent, "first", &[]).await?;
    let second = create_child(&fixture, &session, &parent, "second", &[&first]).await?;

    let result = fixture
        .send(
            &session,
            CommandName::TaskUpdate,
            json!({ "task_id": first.id(), "dependencies": [second.id()] }),
        )
        .await;

    ensure!(matches!(result, Err(ref error) if error.kind() == ErrorKind::StateConflict));
    ensure!(fixture.task(first.id()).await?.dependencies().is_empty());
    Ok(())
}
