//! In-memory view over a project's task forest.

use super::{Task, TaskId, TaskStatus};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

/// Parent/child index over a set of tasks.
///
/// Children are kept in creation order so traversals are stable.
#[derive(Debug, Clone, Default)]
pub struct TaskForest {
    tasks: HashMap<TaskId, Task>,
    children: HashMap<TaskId, Vec<TaskId>>,
    roots: Vec<TaskId>,
}

impl TaskForest {
    /// Builds the index from a task list.
    #[must_use]
    pub fn new(tasks: impl IntoIterator<Item = Task>) -> Self {
        let mut ordered: Vec<Task> = tasks.into_iter().collect();
        ordered.sort_by_key(|task| (task.created_at(), task.id()));

        let known: HashSet<TaskId> = ordered.iter().map(Task::id).collect();
        let mut children: HashMap<TaskId, Vec<TaskId>> = HashMap::new();
        let mut roots = Vec::new();
        for task in &ordered {
            match task.parent_id() {
                Some(parent) if known.contains(&parent) => {
                    children.entry(parent).or_default().push(task.id());
                }
                _ => roots.push(task.id()),
            }
        }

        Self {
            tasks: ordered.into_iter().map(|task| (task.id(), task)).collect(),
            children,
            roots,
        }
    }

    /// Returns a task by ID.
    #[must_use]
    pub fn get(&self, id: TaskId) -> Option<&Task> {
        self.tasks.get(&id)
    }

    /// Returns the tasks with no parent inside the forest.
    pub fn roots(&self) -> impl Iterator<Item = &Task> {
        self.roots.iter().filter_map(|id| self.tasks.get(id))
    }

    /// Returns the direct children of a task.
    #[must_use]
    pub fn children(&self, id: TaskId) -> Vec<&Task> {
        self.children
            .get(&id)
            .map(|ids| ids.iter().filter_map(|child| self.tasks.get(child)).collect())
            .unwrap_or_default()
    }

    /// Returns `true` when the task has at least one child.
    #[must_use]
    pub fn has_children(&self, id: TaskId) -> bool {
        self.children.get(&id).is_some_and(|ids| !ids.is_empty())
    }

    /// Returns every descendant in breadth-first order.
    #[must_use]
    pub fn descendants(&self, id: TaskId) -> Vec<&Task> {
        let mut found = Vec::new();
        let mut queue: VecDeque<TaskId> = self.children.get(&id).cloned().unwrap_or_default().into();
        let mut visited = HashSet::new();
        while let Some(next) = queue.pop_front() {
            if !visited.insert(next) {
                continue;
            }
            if let Some(task) = self.tasks.get(&next) {
                found.push(task);
            }
            if let Some(grandchildren) = self.children.get(&next) {
                queue.extend(grandchildren.iter().copied());
            }
        }
        found
    }

    /// Returns descendants that are not yet `completed` or `cancelled`.
    #[must_use]
    pub fn open_descendants(&self, id: TaskId) -> Vec<&Task> {
        self.descendants(id)
            .into_iter()
            .filter(|task| !task.is_terminal())
            .collect()
    }

    /// Returns `true` when making `new_parent` the parent of `task_id` would
    /// close a loop in the forest.
    #[must_use]
    pub fn would_create_parent_cycle(&self, task_id: TaskId, new_parent: TaskId) -> bool {
        if task_id == new_parent {
            return true;
        }
        let mut cursor = Some(new_parent);
        let mut visited = HashSet::new();
        while let Some(current) = cursor {
            if current == task_id || !visited.insert(current) {
                return true;
            }
            cursor = self.tasks.get(&current).and_then(Task::parent_id);
        }
        false
    }

    /// Returns `true` when `id` or one of its ancestors is in `roots`.
    #[must_use]
    pub fn descends_from_any(&self, id: TaskId, roots: &[TaskId]) -> bool {
        let mut cursor = Some(id);
        let mut visited = HashSet::new();
        while let Some(current) = cursor {
            if roots.contains(&current) {
                return true;
            }
            if !visited.insert(current) {
                return false;
            }
            cursor = self.tasks.get(&current).and_then(Task::parent_id);
        }
        false
    }

    /// Returns the nearest `completed` task among `id` and its ancestors.
    #[must_use]
    pub fn completed_lineage(&self, id: TaskId) -> Option<&Task> {
        let mut cursor = Some(id);
        let mut visited = HashSet::new();
        while let Some(current) = cursor {
            if !visited.insert(current) {
                return None;
            }
            let task = self.tasks.get(&current)?;
            if task.status() == TaskStatus::Completed {
                return Some(task);
            }
            cursor = task.parent_id();
        }
        None
    }

    /// Returns `(depth, task)` pairs in depth-first pre-order for the subtree
    /// rooted at `id`, the root itself at depth zero.
    #[must_use]
    pub fn walk(&self, id: TaskId) -> Vec<(usize, &Task)> {
        let mut out = Vec::new();
        let mut stack = vec![(0_usize, id)];
        let mut visited = HashSet::new();
        while let Some((depth, current)) = stack.pop() {
            if !visited.insert(current) {
                continue;
            }
            let Some(task) = self.tasks.get(&current) else {
                continue;
            };
            out.push((depth, task));
            if let Some(children) = self.children.get(&current) {
                for child in children.iter().rev() {
                    stack.push((depth + 1, *child));
                }
            }
        }
        out
    }

    /// Groups a task set by its nearest ancestor within the same set.
    ///
    /// Returns a map from each member to its parent inside the set (or `None`
    /// for members whose ancestors are all outside the set).
    #[must_use]
    pub fn nearest_ancestors_within(&self, members: &[TaskId]) -> BTreeMap<TaskId, Option<TaskId>> {
        let set: HashSet<TaskId> = members.iter().copied().collect();
        members
            .iter()
            .map(|member| {
                let mut cursor = self.tasks.get(member).and_then(Task::parent_id);
                let mut visited = HashSet::new();
                while let Some(current) = cursor {
                    if set.contains(&current) || !visited.insert(current) {
                        break;
                    }
                    cursor = self.tasks.get(&current).and_then(Task::parent_id);
                }
                (*member, cursor.filter(|candidate| set.contains(candidate)))
            })
            .collect()
    }
}
