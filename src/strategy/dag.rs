//! Dependency graph over a set of tasks, and the wave scheduler built on it.
//!
//! Edges run from a dependency to its dependent, so a topological order is
//! an execution order. Dependencies on tasks outside the planned set are
//! rejected rather than ignored: a coordinator plans over its own subtree.

use super::StrategyError;
use crate::task::domain::{Task, TaskId, TaskStatus};
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};

/// Validated, acyclic dependency graph.
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    graph: DiGraph<TaskId, ()>,
    index: HashMap<TaskId, NodeIndex>,
    order: Vec<TaskId>,
}

impl DependencyGraph {
    /// Builds the graph from tasks and their `dependencies`.
    ///
    /// Node order follows the input order, which callers keep stable
    /// (creation order) so plans are deterministic.
    ///
    /// # Errors
    ///
    /// Returns [`StrategyError::UnknownDependency`] when an edge leaves the
    /// set and [`StrategyError::DependencyCycle`] when the edges form a cycle.
    pub fn build<'a>(tasks: impl IntoIterator<Item = &'a Task>) -> Result<Self, StrategyError> {
        Self::assemble(&tasks.into_iter().collect::<Vec<_>>(), true)
    }

    /// Builds the graph, dropping edges to tasks outside the set.
    ///
    /// Used when ordering siblings, whose dependencies may point elsewhere in
    /// the tree.
    ///
    /// # Errors
    ///
    /// Returns [`StrategyError::DependencyCycle`] when the remaining edges
    /// form a cycle.
    pub fn build_scoped<'a>(
        tasks: impl IntoIterator<Item = &'a Task>,
    ) -> Result<Self, StrategyError> {
        Self::assemble(&tasks.into_iter().collect::<Vec<_>>(), false)
    }

    fn assemble(tasks: &[&Task], strict: bool) -> Result<Self, StrategyError> {
        let mut graph = DiGraph::with_capacity(tasks.len(), tasks.len());
        let mut index = HashMap::with_capacity(tasks.len());
        let mut order = Vec::with_capacity(tasks.len());
        for task in tasks {
            if index.contains_key(&task.id()) {
                continue;
            }
            index.insert(task.id(), graph.add_node(task.id()));
            order.push(task.id());
        }
        for task in tasks {
            let Some(&to) = index.get(&task.id()) else {
                continue;
            };
            for dependency in task.dependencies() {
                match index.get(dependency) {
                    Some(&from) => {
                        graph.update_edge(from, to, ());
                    }
                    None if strict => {
                        return Err(StrategyError::UnknownDependency {
                            task: task.id(),
                            dependency: *dependency,
                        });
                    }
                    None => {}
                }
            }
        }
        toposort(&graph, None).map_err(|cycle| {
            let task_id = graph
                .node_weight(cycle.node_id())
                .copied()
                .unwrap_or_else(|| order.first().copied().unwrap_or_default());
            StrategyError::DependencyCycle(task_id)
        })?;
        Ok(Self {
            graph,
            index,
            order,
        })
    }

    /// Returns the task identifiers in input order.
    #[must_use]
    pub fn tasks(&self) -> &[TaskId] {
        &self.order
    }

    /// Returns the number of nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Returns `true` when the graph has no nodes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Returns the direct dependencies of a task.
    #[must_use]
    pub fn dependencies_of(&self, id: TaskId) -> Vec<TaskId> {
        self.neighbours(id, Direction::Incoming)
    }

    /// Returns the direct dependents of a task.
    #[must_use]
    pub fn dependents_of(&self, id: TaskId) -> Vec<TaskId> {
        self.neighbours(id, Direction::Outgoing)
    }

    /// Partitions the nodes into dependency levels.
    ///
    /// Level `n` holds every node whose longest dependency chain has length
    /// `n`; nodes inside one level share no edges. Each level keeps input
    /// order.
    #[must_use]
    pub fn levels(&self) -> Vec<Vec<TaskId>> {
        let mut depth: HashMap<TaskId, usize> = HashMap::with_capacity(self.order.len());
        let mut remaining: HashMap<TaskId, usize> = self
            .order
            .iter()
            .map(|id| (*id, self.dependencies_of(*id).len()))
            .collect();
        let mut frontier: VecDeque<TaskId> = self
            .order
            .iter()
            .filter(|id| remaining.get(id).copied() == Some(0))
            .copied()
            .collect();
        while let Some(id) = frontier.pop_front() {
            let level = depth.get(&id).copied().unwrap_or(0);
            for dependent in self.dependents_of(id) {
                let entry = depth.entry(dependent).or_insert(0);
                *entry = (*entry).max(level + 1);
                if let Some(count) = remaining.get_mut(&dependent) {
                    *count = count.saturating_sub(1);
                    if *count == 0 {
                        frontier.push_back(dependent);
                    }
                }
            }
        }
        let mut levels: Vec<Vec<TaskId>> = Vec::new();
        for id in &self.order {
            let level = depth.get(id).copied().unwrap_or(0);
            while levels.len() <= level {
                levels.push(Vec::new());
            }
            if let Some(bucket) = levels.get_mut(level) {
                bucket.push(*id);
            }
        }
        levels
    }

    /// Returns a topological order that prefers input order among ready
    /// nodes.
    #[must_use]
    pub fn execution_order(&self) -> Vec<TaskId> {
        self.levels().into_iter().flatten().collect()
    }

    fn neighbours(&self, id: TaskId, direction: Direction) -> Vec<TaskId> {
        let Some(&node) = self.index.get(&id) else {
            return Vec::new();
        };
        let mut found: Vec<TaskId> = self
            .graph
            .neighbors_directed(node, direction)
            .filter_map(|neighbour| self.graph.node_weight(neighbour).copied())
            .collect();
        found.sort_by_key(|task_id| self.position(*task_id));
        found
    }

    fn position(&self, id: TaskId) -> usize {
        self.order
            .iter()
            .position(|candidate| *candidate == id)
            .unwrap_or(usize::MAX)
    }
}

/// Scheduling state of one node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeState {
    /// Waiting on dependencies.
    Pending,
    /// Every dependency completed; not yet spawned.
    Ready,
    /// A worker is running.
    Running,
    /// Finished successfully.
    Completed,
    /// Finished unsuccessfully after retries.
    Failed,
    /// A transitive dependency failed.
    Blocked,
}

impl NodeState {
    /// Returns `true` once the node can no longer change.
    #[must_use]
    pub const fn is_resolved(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Blocked)
    }
}

/// Tracks node states over a [`DependencyGraph`] and yields ready waves.
#[derive(Debug, Clone)]
pub struct DagScheduler {
    graph: DependencyGraph,
    states: HashMap<TaskId, NodeState>,
}

impl DagScheduler {
    /// Creates a scheduler, seeding state from current task statuses.
    ///
    /// Tasks already `completed` start resolved; `cancelled` tasks count as
    /// failed so their dependents block.
    #[must_use]
    pub fn new(graph: DependencyGraph, statuses: &BTreeMap<TaskId, TaskStatus>) -> Self {
        let mut states = HashMap::with_capacity(graph.len());
        for id in graph.tasks() {
            let state = match statuses.get(id) {
                Some(TaskStatus::Completed) => NodeState::Completed,
                Some(TaskStatus::Cancelled) => NodeState::Failed,
                _ => NodeState::Pending,
            };
            states.insert(*id, state);
        }
        let mut scheduler = Self { graph, states };
        let failed: Vec<TaskId> = scheduler
            .graph
            .tasks()
            .iter()
            .filter(|id| scheduler.state(**id) == Some(NodeState::Failed))
            .copied()
            .collect();
        for id in failed {
            scheduler.mark_failed(id);
        }
        scheduler.promote();
        scheduler
    }

    /// Returns the state of a node.
    #[must_use]
    pub fn state(&self, id: TaskId) -> Option<NodeState> {
        self.states.get(&id).copied()
    }

    /// Returns the underlying graph.
    #[must_use]
    pub const fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    /// Returns the nodes ready to spawn, in graph order.
    #[must_use]
    pub fn ready(&self) -> Vec<TaskId> {
        self.with_state(NodeState::Ready)
    }

    /// Returns the nodes currently running.
    #[must_use]
    pub fn running(&self) -> Vec<TaskId> {
        self.with_state(NodeState::Running)
    }

    /// Returns `true` when every node is resolved.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.states.values().all(|state| state.is_resolved())
    }

    /// Returns `true` when nodes remain but nothing can make progress.
    #[must_use]
    pub fn is_deadlocked(&self) -> bool {
        !self.is_finished() && self.ready().is_empty() && self.running().is_empty()
    }

    /// Number of unresolved nodes.
    #[must_use]
    pub fn unresolved(&self) -> usize {
        self.states.values().filter(|state| !state.is_resolved()).count()
    }

    /// Marks a ready node as running.
    pub fn mark_running(&mut self, id: TaskId) {
        if let Some(state) = self.states.get_mut(&id)
            && *state == NodeState::Ready
        {
            *state = NodeState::Running;
        }
    }

    /// Returns a running node to `Ready` so it can be spawned again.
    pub fn mark_retry(&mut self, id: TaskId) {
        if let Some(state) = self.states.get_mut(&id)
            && *state == NodeState::Running
        {
            *state = NodeState::Ready;
        }
    }

    /// Marks a node completed and returns the dependents it made ready.
    pub fn mark_completed(&mut self, id: TaskId) -> Vec<TaskId> {
        if let Some(state) = self.states.get_mut(&id) {
            *state = NodeState::Completed;
        }
        let before: BTreeSet<TaskId> = self.ready().into_iter().collect();
        self.promote();
        self.ready()
            .into_iter()
            .filter(|ready| !before.contains(ready))
            .collect()
    }

    /// Marks a node failed and blocks its transitive dependents. Returns the
    /// nodes that became blocked.
    pub fn mark_failed(&mut self, id: TaskId) -> Vec<TaskId> {
        if let Some(state) = self.states.get_mut(&id) {
            *state = NodeState::Failed;
        }
        let mut blocked = Vec::new();
        let mut queue: VecDeque<TaskId> = self.graph.dependents_of(id).into();
        while let Some(next) = queue.pop_front() {
            let Some(state) = self.states.get_mut(&next) else {
                continue;
            };
            if state.is_resolved() || *state == NodeState::Running {
                continue;
            }
            *state = NodeState::Blocked;
            blocked.push(next);
            queue.extend(self.graph.dependents_of(next));
        }
        blocked
    }

    fn promote(&mut self) {
        let pending = self.with_state(NodeState::Pending);
        for id in pending {
            let ready = self
                .graph
                .dependencies_of(id)
                .iter()
                .all(|dependency| self.state(*dependency) == Some(NodeState::Completed));
            if ready && let Some(state) = self.states.get_mut(&id) {
                *state = NodeState::Ready;
            }
        }
    }

    fn with_state(&self, wanted: NodeState) -> Vec<TaskId> {
        self.graph
            .tasks()
            .iter()
            .filter(|id| self.state(**id) == Some(wanted))
            .copied()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::{DagScheduler, DependencyGraph, NodeState};
    use crate::strategy::StrategyError;
    use crate::task::domain::{NewTask, ProjectId, Task, TaskId};
    use mockable::DefaultClock;
    use rstest::{fixture, rstest};
    use std::collections::BTreeMap;

    fn task(project: ProjectId, title: &str, deps: &[TaskId]) -> Task {
        Task::new(
            NewTask::new(project, title).with_dependencies(deps.iter().copied()),
            &DefaultClock,
        )
        .expect("valid task")
    }

    struct Diamond {
        tasks: Vec<Task>,
        a: TaskId,
        b: TaskId,
        c: TaskId,
    }

    #[fixture]
    fn diamond() -> Diamond {
        let project = ProjectId::new();
        let a = task(project, "A", &[]);
        let b = task(project, "B", &[]);
        let c = task(project, "C", &[a.id(), b.id()]);
        Diamond {
            a: a.id(),
            b: b.id(),
            c: c.id(),
            tasks: vec![a, b, c],
        }
    }

    #[rstest]
    fn levels_group_independent_tasks(diamond: Diamond) {
        let graph = DependencyGraph::build(&diamond.tasks).expect("acyclic");

        assert_eq!(
            graph.levels(),
            vec![vec![diamond.a, diamond.b], vec![diamond.c]]
        );
        assert_eq!(graph.execution_order(), vec![diamond.a, diamond.b, diamond.c]);
    }

    #[rstest]
    fn dependent_becomes_ready_only_after_all_dependencies(diamond: Diamond) {
        let graph = DependencyGraph::build(&diamond.tasks).expect("acyclic");
        let mut scheduler = DagScheduler::new(graph, &BTreeMap::new());

        assert_eq!(scheduler.ready(), vec![diamond.a, diamond.b]);
        scheduler.mark_running(diamond.a);
        scheduler.mark_running(diamond.b);

        assert!(scheduler.mark_completed(diamond.a).is_empty());
        assert_eq!(scheduler.state(diamond.c), Some(NodeState::Pending));
        assert_eq!(scheduler.mark_completed(diamond.b), vec![diamond.c]);
    }

    #[rstest]
    fn failure_blocks_transitive_dependents(diamond: Diamond) {
        let graph = DependencyGraph::build(&diamond.tasks).expect("acyclic");
        let mut scheduler = DagScheduler::new(graph, &BTreeMap::new());
        scheduler.mark_running(diamond.a);

        let blocked = scheduler.mark_failed(diamond.a);

        assert_eq!(blocked, vec![diamond.c]);
        assert_eq!(scheduler.state(diamond.c), Some(NodeState::Blocked));
        assert!(!scheduler.is_finished());
        assert!(!scheduler.is_deadlocked());
    }

    #[rstest]
    fn cycle_is_rejected() {
        let project = ProjectId::new();
        let mut a = task(project, "A", &[]);
        let b = task(project, "B", &[a.id()]);
        a.replace_dependencies(vec![b.id()], &DefaultClock)
            .expect("not a self dependency");

        let result = DependencyGraph::build([&a, &b]);

        assert!(matches!(result, Err(StrategyError::DependencyCycle(_))));
    }

    #[rstest]
    fn dependency_outside_the_set_is_rejected() {
        let project = ProjectId::new();
        let outsider = TaskId::new();
        let a = task(project, "A", &[outsider]);

        let result = DependencyGraph::build([&a]);

        assert!(matches!(
            result,
            Err(StrategyError::UnknownDependency { dependency, .. }) if dependency == outsider
        ));
    }
}
