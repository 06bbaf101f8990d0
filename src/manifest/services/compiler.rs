//! Prompt compiler: manifest in, two prompt layers and an allowlist out.
//!
//! The system layer depends only on role, mode, strategy, phase names, and
//! the sorted allowlist, so identical inputs always produce byte-identical
//! text and the same digest. The task layer is rendered fresh per session.

use crate::manifest::domain::{CompiledPrompt, Manifest, TaskSnapshot, Template, TemplateError};
use crate::strategy::{AgentRole, CommandName, Phase, PhaseMachine, SessionMode, Strategy};
use crate::task::domain::TaskId;
use minijinja::{Environment, UndefinedBehavior, context};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};

/// Bundled system template for execute-mode sessions.
pub const WORKER_TEMPLATE: &str = include_str!("../templates/worker.j2");
/// Bundled system template for coordinate-mode sessions.
pub const COORDINATOR_TEMPLATE: &str = include_str!("../templates/coordinator.j2");
/// Bundled task-layer template.
pub const TASK_TEMPLATE: &str = include_str!("../templates/task.j2");

/// Compiles a manifest. `template` overrides the bundled system template.
///
/// # Errors
///
/// Returns [`TemplateError::Render`] when a template fails to parse or
/// references a variable that is not provided.
pub fn compile(
    manifest: &Manifest,
    template: Option<&Template>,
) -> Result<CompiledPrompt, TemplateError> {
    let command_allowlist = command_allowlist(
        manifest.strategy,
        &manifest.allowed_commands,
        &manifest.hidden_commands,
    );
    let system_prompt = render_system(
        manifest.role,
        manifest.strategy,
        &command_allowlist,
        template,
    )?;
    let task_prompt = render_task(manifest)?;
    let system_prompt_digest = digest(&system_prompt);
    Ok(CompiledPrompt {
        system_prompt,
        task_prompt,
        command_allowlist,
        system_prompt_digest,
    })
}

/// Computes the effective command set: the strategy's commands minus
/// `hidden`, plus those of `allowed` the mode may hold. Sorted by wire name.
///
/// Coordinators never gain direct execution and workers never gain
/// delegation.
#[must_use]
pub fn command_allowlist(
    strategy: Strategy,
    allowed: &[CommandName],
    hidden: &[CommandName],
) -> Vec<CommandName> {
    let mut set: BTreeSet<CommandName> = strategy
        .command_set()
        .into_iter()
        .filter(|command| !hidden.contains(command))
        .collect();
    set.extend(
        allowed
            .iter()
            .copied()
            .filter(|command| permitted_for(strategy.mode(), *command)),
    );
    let mut commands: Vec<CommandName> = set.into_iter().collect();
    commands.sort_by_key(|command| command.as_str());
    commands
}

const fn permitted_for(mode: SessionMode, command: CommandName) -> bool {
    match mode {
        SessionMode::Execute => !command.is_delegation(),
        SessionMode::Coordinate => !command.is_direct_execution(),
    }
}

/// Renders the system layer.
///
/// # Errors
///
/// Returns [`TemplateError::Render`] on a parse failure or an unresolved
/// variable.
pub fn render_system(
    role: AgentRole,
    strategy: Strategy,
    commands: &[CommandName],
    template: Option<&Template>,
) -> Result<String, TemplateError> {
    let (name, source) = match template {
        Some(custom) => (custom.id.as_str(), custom.content.as_str()),
        None => match strategy.mode() {
            SessionMode::Execute => ("bundled:worker", WORKER_TEMPLATE),
            SessionMode::Coordinate => ("bundled:coordinator", COORDINATOR_TEMPLATE),
        },
    };
    let phases: Vec<&str> = strategy.phases().iter().copied().map(Phase::as_str).collect();
    let names: Vec<&str> = commands.iter().copied().map(CommandName::as_str).collect();
    render(
        name,
        source,
        context! {
            role => role.as_str(),
            mode => strategy.mode().as_str(),
            strategy => strategy.as_str(),
            phases => phases,
            commands => names,
        },
    )
}

#[derive(Serialize)]
struct TreeNode<'a> {
    depth: usize,
    indent: String,
    task: &'a TaskSnapshot,
}

/// Renders the task layer.
///
/// # Errors
///
/// Returns [`TemplateError::Render`] on a parse failure or an unresolved
/// variable.
pub fn render_task(manifest: &Manifest) -> Result<String, TemplateError> {
    let tree = tree_nodes(&manifest.tasks);
    let layout = if manifest.tasks.len() <= 1 {
        "single"
    } else if manifest.tasks.iter().any(|task| task.tree_parent.is_some()) {
        "tree"
    } else {
        "list"
    };
    let team_member = manifest.team_member.as_ref().map(|member| {
        context! {
            name => member.name,
            identity => member.identity,
            capabilities => member.capabilities,
        }
    });
    render(
        "bundled:task",
        TASK_TEMPLATE,
        context! {
            session_id => manifest.session_id.to_string(),
            project => context! {
                name => manifest.context.project_name,
                working_dir => manifest.context.working_dir,
                description => manifest.context.description,
            },
            working_dir => manifest.session.working_dir.display().to_string(),
            team_member => team_member,
            layout => layout,
            tasks => manifest.tasks,
            tree => tree,
            reference_tasks => manifest.context.reference_tasks,
        },
    )
}

/// Orders tasks depth-first by their in-set parent, keeping manifest order
/// among siblings.
fn tree_nodes(tasks: &[TaskSnapshot]) -> Vec<TreeNode<'_>> {
    let mut children: BTreeMap<Option<TaskId>, Vec<&TaskSnapshot>> = BTreeMap::new();
    for task in tasks {
        children.entry(task.tree_parent).or_default().push(task);
    }
    let mut nodes = Vec::with_capacity(tasks.len());
    let mut stack: Vec<(usize, &TaskSnapshot)> = children
        .get(&None)
        .map(|roots| roots.iter().rev().map(|task| (0, *task)).collect())
        .unwrap_or_default();
    while let Some((depth, task)) = stack.pop() {
        nodes.push(TreeNode {
            depth,
            indent: "  ".repeat(depth),
            task,
        });
        if let Some(kids) = children.get(&Some(task.id)) {
            stack.extend(kids.iter().rev().map(|kid| (depth + 1, *kid)));
        }
    }
    nodes
}

fn render(name: &str, source: &str, ctx: minijinja::Value) -> Result<String, TemplateError> {
    let mut env = Environment::new();
    env.set_undefined_behavior(UndefinedBehavior::Strict);
    env.set_keep_trailing_newline(true);
    env.render_named_str(name, source, ctx)
        .map_err(|err| TemplateError::Render {
            template: name.to_owned(),
            reason: err.to_string(),
        })
}

/// Returns the lowercase hex SHA-256 of `text`.
#[must_use]
pub fn digest(text: &str) -> String {
    Sha256::digest(text.as_bytes())
        .iter()
        .map(|byte| format!("{byte:02x}"))
        .collect()
}
