//! Task graph for dependency-ordered builds.
//!
//! Tasks are registered by name with the names of the tasks they depend on.
//! Edges are resolved in [`TaskGraph::validate`], which rejects unknown
//! dependencies and cycles before any action runs.

use crate::core::task::{Task, TaskAction};
use crate::error::{Error, Result};
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// The build task graph.
///
/// Nodes are task names; an edge `a -> b` means `b` depends on `a`.
pub struct TaskGraph {
    /// The underlying directed graph.
    graph: DiGraph<String, ()>,
    /// Index mapping from task name to NodeIndex for fast lookups.
    task_index: HashMap<String, NodeIndex>,
    /// Registered tasks by name.
    tasks: HashMap<String, Task>,
    /// Registration order, used to keep scheduling deterministic.
    order: Vec<String>,
    validated: bool,
}

impl TaskGraph {
    /// Create a new empty graph.
    pub fn new() -> Self {
        Self {
            graph: DiGraph::new(),
            task_index: HashMap::new(),
            tasks: HashMap::new(),
            order: Vec::new(),
            validated: false,
        }
    }

    /// Register a task. Dependencies may name tasks registered later.
    ///
    /// # Errors
    /// Returns a configuration error if the name is already taken.
    pub fn register_task(
        &mut self,
        name: &str,
        depends_on: &[&str],
        action: Arc<dyn TaskAction>,
    ) -> Result<()> {
        self.add(Task::new(name, depends_on, action))
    }

    /// Register a prebuilt [`Task`].
    pub fn add(&mut self, task: Task) -> Result<()> {
        if self.task_index.contains_key(&task.name) {
            return Err(Error::Configuration(format!(
                "task '{}' registered twice",
                task.name
            )));
        }
        let index = self.graph.add_node(task.name.clone());
        self.task_index.insert(task.name.clone(), index);
        self.order.push(task.name.clone());
        self.tasks.insert(task.name.clone(), task);
        self.validated = false;
        Ok(())
    }

    /// Resolve dependency edges and check the graph is acyclic.
    ///
    /// # Errors
    /// Returns a configuration error if a dependency names an unknown task
    /// or if the dependencies form a cycle.
    pub fn validate(&mut self) -> Result<()> {
        self.graph.clear_edges();

        for name in &self.order {
            let task = &self.tasks[name];
            let to = self.task_index[name];
            for dep in &task.depends_on {
                let from = self.task_index.get(dep).ok_or_else(|| {
                    Error::Configuration(format!(
                        "task '{}' depends on unknown task '{}'",
                        name, dep
                    ))
                })?;
                self.graph.add_edge(*from, to, ());
            }
        }

        self.topological_order()?;
        self.validated = true;
        Ok(())
    }

    pub fn is_validated(&self) -> bool {
        self.validated
    }

    /// Get a task by name.
    pub fn get(&self, name: &str) -> Option<&Task> {
        self.tasks.get(name)
    }

    /// Check if the graph contains a task.
    pub fn contains(&self, name: &str) -> bool {
        self.task_index.contains_key(name)
    }

    /// Task names in registration order.
    pub fn task_names(&self) -> &[String] {
        &self.order
    }

    /// Get the number of tasks in the graph.
    pub fn task_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Get the number of resolved dependency edges.
    pub fn dependency_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Declared dependencies of a task.
    pub fn dependencies(&self, name: &str) -> &[String] {
        self.tasks
            .get(name)
            .map(|t| t.depends_on.as_slice())
            .unwrap_or(&[])
    }

    /// Tasks that directly depend on the given task.
    pub fn dependents(&self, name: &str) -> Vec<&str> {
        match self.task_index.get(name) {
            Some(&index) => self
                .graph
                .neighbors_directed(index, Direction::Outgoing)
                .filter_map(|n| self.graph.node_weight(n))
                .map(|s| s.as_str())
                .collect(),
            None => Vec::new(),
        }
    }

    /// The requested tasks plus everything they transitively depend on.
    ///
    /// # Errors
    /// Returns a configuration error for an unknown task name.
    pub fn closure(&self, names: &[&str]) -> Result<HashSet<String>> {
        let mut scope = HashSet::new();
        let mut stack: Vec<String> = Vec::new();

        for name in names {
            if !self.contains(name) {
                return Err(Error::Configuration(format!("unknown task '{}'", name)));
            }
            stack.push(name.to_string());
        }

        while let Some(name) = stack.pop() {
            if !scope.insert(name.clone()) {
                continue;
            }
            for dep in self.dependencies(&name) {
                if !scope.contains(dep) {
                    stack.push(dep.clone());
                }
            }
        }

        Ok(scope)
    }

    /// Tasks in `scope` that can start now.
    ///
    /// A task is ready if it has not been started and all of its
    /// dependencies are in `completed`. Returned in registration order.
    pub fn ready_tasks(
        &self,
        scope: &HashSet<String>,
        completed: &HashSet<String>,
        started: &HashSet<String>,
    ) -> Vec<String> {
        self.order
            .iter()
            .filter(|name| scope.contains(*name) && !started.contains(*name))
            .filter(|name| {
                self.dependencies(name)
                    .iter()
                    .all(|dep| completed.contains(dep))
            })
            .cloned()
            .collect()
    }

    /// Task names in topological order.
    pub fn topological_order(&self) -> Result<Vec<&str>> {
        let sorted = toposort(&self.graph, None).map_err(|cycle| {
            let task_name = self
                .graph
                .node_weight(cycle.node_id())
                .map(|t| t.as_str())
                .unwrap_or("unknown");
            Error::Configuration(format!("dependency cycle detected at task '{}'", task_name))
        })?;

        Ok(sorted
            .into_iter()
            .filter_map(|index| self.graph.node_weight(index))
            .map(|s| s.as_str())
            .collect())
    }
}

impl Default for TaskGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TaskGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskGraph")
            .field("tasks", &self.task_count())
            .field("dependencies", &self.dependency_count())
            .field("validated", &self.validated)
            .finish()
    }
}
