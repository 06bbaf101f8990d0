//! Given steps for queue worker BDD scenarios.

use super::world::{QueueWorld, run_async};
use eyre::WrapErr;
use maestro::manifest::domain::ManifestRequest;
use maestro::strategy::{AgentRole, Strategy};
use maestro::task::domain::NewTask;
use rstest_bdd_macros::given;

#[given(r#"a project with tasks "{first}" and "{second}""#)]
fn project_with_tasks(
    world: &mut QueueWorld,
    first: String,
    second: String,
) -> Result<(), eyre::Report> {
    let project = run_async(world.orchestrator.create_project("queue", "/work/queue"))
        .wrap_err("create scenario project")?;
    for title in [first, second] {
        let task = run_async(
            world
                .orchestrator
                .tasks()
                .create(NewTask::new(project.id(), title.clone())),
        )
        .wrap_err("create scenario task")?;
        world.tasks.insert(title, task);
    }
    world.project = Some(project);
    Ok(())
}

#[given(r#"a queue worker on "{title}""#)]
fn queue_worker_on(world: &mut QueueWorld, title: String) -> Result<(), eyre::Report> {
    let project_id = world
        .project
        .as_ref()
        .map(maestro::task::domain::Project::id)
        .ok_or_else(|| eyre::eyre!("missing project in scenario world"))?;
    let task_id = world.task(&title)?.id();
    let request = ManifestRequest::new(project_id, vec![task_id], AgentRole::Worker)
        .with_strategy(Strategy::QUEUE);
    let session = run_async(world.orchestrator.supervisor().spawn(&request))
        .wrap_err("spawn queue worker")?;
    world.session = Some(session);
    Ok(())
}
