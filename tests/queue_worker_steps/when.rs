//! When steps for queue worker BDD scenarios.

use super::world::{QueueWorld, run_async};
use maestro::messaging::CommandResponse;
use maestro::strategy::{CommandName, Phase};
use rstest_bdd_macros::when;
use serde_json::json;

#[when(r#"the worker pushes "{title}""#)]
fn worker_pushes(world: &mut QueueWorld, title: String) -> Result<(), eyre::Report> {
    let task_id = world.task(&title)?.id();
    world.send(CommandName::QueuePush, json!({ "task_id": task_id }))
}

#[when("the worker claims the next task")]
fn worker_claims(world: &mut QueueWorld) -> Result<(), eyre::Report> {
    world.send(CommandName::QueueTop, json!({}))?;
    world.expect_success()?;
    world.send(CommandName::QueueStart, json!({}))?;
    world.expect_success()?;
    Ok(())
}

#[when("the worker completes the claimed task")]
fn worker_completes(world: &mut QueueWorld) -> Result<(), eyre::Report> {
    world.send(CommandName::QueueComplete, json!({}))?;
    world.expect_success()?;
    Ok(())
}

#[when("the queue manager completes the current item again")]
fn queue_manager_completes_again(world: &mut QueueWorld) -> Result<(), eyre::Report> {
    let session = world.session()?.id();
    let result = run_async(world.orchestrator.queues().complete(session));
    world.last_result = Some(result.map(|item| {
        CommandResponse::success(CommandName::QueueComplete, Phase::Report, json!(item))
    }));
    Ok(())
}

#[when(r#"the worker sends "{command}""#)]
fn worker_sends(world: &mut QueueWorld, command: String) -> Result<(), eyre::Report> {
    let name = CommandName::try_from(command.as_str())
        .map_err(|err| eyre::eyre!("invalid command in scenario: {err}"))?;
    world.send(name, json!({}))
}
