//! Task data model for the build graph.
//!
//! A task is a named unit of build work with an ordered list of upstream
//! tasks and an action. Tasks are created while the graph is set up and
//! never change afterwards.

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::error::Result;
use crate::mode::BuildContext;

/// A file written by a stage.
///
/// Each output path belongs to exactly one stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    /// Stage that wrote the file.
    pub stage: String,
    /// Absolute output path.
    pub path: PathBuf,
    /// Number of bytes written.
    pub bytes: usize,
}

impl Artifact {
    pub fn new(stage: &str, path: PathBuf, bytes: usize) -> Self {
        Self {
            stage: stage.to_string(),
            path,
            bytes,
        }
    }
}

/// The work a task performs.
///
/// Actions receive the run's immutable [`BuildContext`] and complete with
/// the artifacts they wrote, or an error.
pub trait TaskAction: Send + Sync {
    fn run<'a>(&'a self, ctx: &'a BuildContext) -> BoxFuture<'a, Result<Vec<Artifact>>>;
}

/// A node of the task graph.
///
/// Tasks carry no concurrency flag. Whether tasks run side by side is
/// decided by how they are requested: names passed together to
/// [`Orchestrator::run`] run concurrently, and the groups of
/// [`Orchestrator::run_sequence`] run one after another.
///
/// [`Orchestrator::run`]: crate::orchestration::Orchestrator::run
/// [`Orchestrator::run_sequence`]: crate::orchestration::Orchestrator::run_sequence
#[derive(Clone)]
pub struct Task {
    /// Unique task name.
    pub name: String,
    /// Tasks that must complete before this one starts.
    pub depends_on: Vec<String>,
    pub action: Arc<dyn TaskAction>,
}

impl Task {
    pub fn new(name: &str, depends_on: &[&str], action: Arc<dyn TaskAction>) -> Self {
        Self {
            name: name.to_string(),
            depends_on: depends_on.iter().map(|d| d.to_string()).collect(),
            action,
        }
    }
}

impl std::fmt::Debug for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task")
            .field("name", &self.name)
            .field("depends_on", &self.depends_on)
            .finish()
    }
}

/// Outcome of one task within a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum TaskStatus {
    /// Task completed successfully.
    Completed,
    /// Task action returned an error.
    Failed {
        /// Error message describing the failure.
        error: String,
    },
    /// Task never started because an upstream task did not complete.
    Skipped {
        /// Which dependency blocked it.
        reason: String,
    },
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskStatus::Completed => write!(f, "completed"),
            TaskStatus::Failed { error } => write!(f, "failed: {}", error),
            TaskStatus::Skipped { reason } => write!(f, "skipped: {}", reason),
        }
    }
}

/// Per-task record collected by the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskReport {
    pub name: String,
    pub status: TaskStatus,
    pub artifacts: Vec<Artifact>,
    pub elapsed: Duration,
}

impl TaskReport {
    pub fn is_success(&self) -> bool {
        self.status == TaskStatus::Completed
    }
}
