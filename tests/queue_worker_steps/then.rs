//! Then steps for queue worker BDD scenarios.

use super::world::{QueueWorld, run_async};
use maestro::queue::domain::QueueItem;
use maestro::session::domain::TimelineKind;
use maestro::strategy::CommandName;
use maestro::task::domain::TaskStatus;
use rstest_bdd_macros::then;
use serde_json::json;

#[then(r#"task "{title}" is completed"#)]
fn task_is_completed(world: &QueueWorld, title: String) -> Result<(), eyre::Report> {
    let task_id = world.task(&title)?.id();
    let task = run_async(world.orchestrator.tasks().get(task_id))?;
    if task.status() != TaskStatus::Completed {
        return Err(eyre::eyre!("expected {title} completed, found {}", task.status()));
    }
    Ok(())
}

#[then(r#"the top of the queue is "{title}""#)]
fn top_of_queue_is(world: &mut QueueWorld, title: String) -> Result<(), eyre::Report> {
    let expected = world.task(&title)?.id();
    world.send(CommandName::QueueTop, json!({}))?;
    let response = world.expect_success()?;
    let top: Option<QueueItem> = serde_json::from_value(response.data.clone())?;
    match top {
        Some(item) if item.task_id == expected => Ok(()),
        other => Err(eyre::eyre!("expected {title} on top, found {other:?}")),
    }
}

#[then(r#"the worker is in the "{phase}" phase"#)]
fn worker_in_phase(world: &QueueWorld, phase: String) -> Result<(), eyre::Report> {
    let session_id = world.session()?.id();
    let session = run_async(world.orchestrator.supervisor().get(session_id))?;
    if session.phase().as_str() != phase {
        return Err(eyre::eyre!("expected phase {phase}, found {}", session.phase()));
    }
    Ok(())
}

#[then(r#"the last command fails with a "{kind}" error"#)]
fn last_command_fails(world: &QueueWorld, kind: String) -> Result<(), eyre::Report> {
    match world.last_result.as_ref() {
        Some(Err(error)) if error.kind().as_str() == kind => Ok(()),
        other => Err(eyre::eyre!("expected a {kind} error, got {other:?}")),
    }
}

#[then(r#"the worker timeline records a denial of "{command}""#)]
fn timeline_records_denial(world: &QueueWorld, command: String) -> Result<(), eyre::Report> {
    let session_id = world.session()?.id();
    let session = run_async(world.orchestrator.supervisor().get(session_id))?;
    let denied = session
        .timeline()
        .iter()
        .any(|entry| entry.kind == TimelineKind::Denied && entry.message.contains(&command));
    if !denied {
        return Err(eyre::eyre!("no denial of {command} on the timeline"));
    }
    Ok(())
}
