//! Orchestrator for dependency-ordered task execution.
//!
//! The Orchestrator runs tasks from the [`TaskGraph`], starting every task
//! whose dependencies have completed and running independent tasks
//! concurrently. Failures are collected per task; a group reports failure
//! only once every member has settled.

use std::collections::{HashMap, HashSet};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::FutureExt;
use tokio::sync::mpsc;
use tokio::task::JoinSet;

use crate::core::dag::TaskGraph;
use crate::core::task::{Artifact, TaskReport, TaskStatus};
use crate::error::{Error, Result};
use crate::mode::BuildContext;
use crate::{klog, klog_debug, klog_error};

/// Events emitted by the orchestrator for task lifecycle changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskEvent {
    /// A task's action has been started.
    Started {
        /// The task that was started.
        task: String,
    },
    /// A task completed successfully.
    Completed {
        /// The task that completed.
        task: String,
        /// Number of artifacts it wrote.
        artifacts: usize,
    },
    /// A task failed with an error.
    Failed {
        /// The task that failed.
        task: String,
        /// Error message describing the failure.
        error: String,
    },
    /// A task was not started because an upstream task did not complete.
    Skipped {
        /// The skipped task.
        task: String,
        /// Why it was skipped.
        reason: String,
    },
}

/// Everything one `run` produced.
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    /// Task names in the order their actions were started.
    pub started: Vec<String>,
    /// Per-task outcomes in the order they settled.
    pub reports: Vec<TaskReport>,
}

impl RunReport {
    pub fn get(&self, task: &str) -> Option<&TaskReport> {
        self.reports.iter().find(|r| r.name == task)
    }

    pub fn artifacts(&self) -> impl Iterator<Item = &Artifact> {
        self.reports.iter().flat_map(|r| r.artifacts.iter())
    }

    fn extend(&mut self, other: RunReport) {
        self.started.extend(other.started);
        self.reports.extend(other.reports);
    }
}

/// Runs tasks from a validated graph with one immutable [`BuildContext`].
///
/// # Example
///
/// ```ignore
/// let mut graph = TaskGraph::new();
/// graph.register_task("styles", &[], styles)?;
/// graph.register_task("serve", &["styles"], serve)?;
///
/// let orchestrator = Orchestrator::new(graph, ctx)?;
/// let report = orchestrator.run(&["serve"]).await?;
/// ```
#[derive(Clone)]
pub struct Orchestrator {
    /// The validated task graph.
    graph: Arc<TaskGraph>,
    /// Context passed to every action.
    ctx: Arc<BuildContext>,
    /// Optional channel for lifecycle events.
    event_tx: Option<mpsc::UnboundedSender<TaskEvent>>,
}

impl Orchestrator {
    /// Validate the graph and build an orchestrator for it.
    ///
    /// # Errors
    /// Returns a configuration error for unknown dependencies or cycles. No
    /// action has run at that point.
    pub fn new(mut graph: TaskGraph, ctx: BuildContext) -> Result<Self> {
        graph.validate()?;
        klog_debug!(
            "Orchestrator: {} tasks, {} dependencies, mode={}",
            graph.task_count(),
            graph.dependency_count(),
            ctx.mode.label()
        );
        klog_debug!("Orchestrator: resolved order {:?}", graph.topological_order()?);
        Ok(Self {
            graph: Arc::new(graph),
            ctx: Arc::new(ctx),
            event_tx: None,
        })
    }

    /// Emit lifecycle events on `tx`.
    pub fn with_events(mut self, tx: mpsc::UnboundedSender<TaskEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    pub fn graph(&self) -> &TaskGraph {
        &self.graph
    }

    pub fn context(&self) -> &BuildContext {
        &self.ctx
    }

    fn emit(&self, event: TaskEvent) {
        if let Some(tx) = &self.event_tx {
            let _ = tx.send(event);
        }
    }

    /// Run the named tasks and everything they depend on.
    ///
    /// Tasks without an ordering relation run concurrently; a task starts
    /// only after all of its dependencies completed.
    ///
    /// # Errors
    /// A configuration error for unknown names, or `TasksFailed` naming
    /// every failed task once all started tasks have settled.
    pub async fn run(&self, names: &[&str]) -> Result<RunReport> {
        self.run_scope(names, &HashSet::new()).await
    }

    /// Run groups one after another; tasks within a group run as in
    /// [`Orchestrator::run`]. Stops at the first failing group. Tasks already
    /// completed by an earlier group are not run again.
    pub async fn run_sequence(&self, steps: &[&[&str]]) -> Result<RunReport> {
        let mut done = HashSet::new();
        let mut all = RunReport::default();
        for step in steps {
            let report = self.run_scope(step, &done).await?;
            done.extend(
                report
                    .reports
                    .iter()
                    .filter(|r| r.is_success())
                    .map(|r| r.name.clone()),
            );
            all.extend(report);
        }
        Ok(all)
    }

    /// Re-run a single task without its dependencies.
    ///
    /// Failures are reported in the returned [`TaskReport`]; only an unknown
    /// task name is an error.
    pub async fn run_task(&self, name: &str) -> Result<TaskReport> {
        if !self.graph.contains(name) {
            return Err(Error::Configuration(format!("unknown task '{}'", name)));
        }
        self.emit(TaskEvent::Started {
            task: name.to_string(),
        });
        let (_, result, elapsed) = self.execute(name.to_string()).await;
        Ok(self.settle(name, result, elapsed))
    }

    async fn run_scope(&self, names: &[&str], done_before: &HashSet<String>) -> Result<RunReport> {
        let mut scope = self.graph.closure(names)?;
        scope.retain(|name| !done_before.contains(name));

        let mut completed: HashSet<String> = done_before.clone();
        let mut started: HashSet<String> = HashSet::new();
        let mut blocked: HashMap<String, String> = HashMap::new();
        let mut running: JoinSet<(String, Result<Vec<Artifact>>, Duration)> = JoinSet::new();
        let mut report = RunReport::default();

        loop {
            self.skip_blocked(&scope, &mut started, &mut blocked, &mut report);

            for name in self.graph.ready_tasks(&scope, &completed, &started) {
                started.insert(name.clone());
                report.started.push(name.clone());
                self.emit(TaskEvent::Started { task: name.clone() });
                klog!("Starting '{}'", name);

                let this = self.clone();
                running.spawn(async move { this.execute(name).await });
            }

            let Some(joined) = running.join_next().await else {
                break;
            };
            let (name, result, elapsed) = joined.map_err(|e| Error::TaskJoin(e.to_string()))?;
            let task_report = self.settle(&name, result, elapsed);
            match &task_report.status {
                TaskStatus::Completed => {
                    completed.insert(name);
                }
                TaskStatus::Failed { error } => {
                    blocked.insert(name, error.clone());
                }
                TaskStatus::Skipped { .. } => {}
            }
            report.reports.push(task_report);
        }

        let failures: Vec<(String, String)> = report
            .reports
            .iter()
            .filter_map(|r| match &r.status {
                TaskStatus::Failed { error } => Some((r.name.clone(), error.clone())),
                _ => None,
            })
            .collect();

        if failures.is_empty() {
            Ok(report)
        } else {
            Err(Error::TasksFailed(failures))
        }
    }

    /// Mark every not-yet-started task downstream of a failure as skipped.
    fn skip_blocked(
        &self,
        scope: &HashSet<String>,
        started: &mut HashSet<String>,
        blocked: &mut HashMap<String, String>,
        report: &mut RunReport,
    ) {
        loop {
            let newly: Vec<(String, String)> = self
                .graph
                .task_names()
                .iter()
                .filter(|name| scope.contains(*name) && !started.contains(*name))
                .filter_map(|name| {
                    self.graph
                        .dependencies(name)
                        .iter()
                        .find(|dep| blocked.contains_key(*dep))
                        .map(|dep| (name.clone(), format!("dependency '{}' did not complete", dep)))
                })
                .collect();

            if newly.is_empty() {
                return;
            }

            for (name, reason) in newly {
                klog_debug!("Skipping '{}': {}", name, reason);
                started.insert(name.clone());
                blocked.insert(name.clone(), reason.clone());
                self.emit(TaskEvent::Skipped {
                    task: name.clone(),
                    reason: reason.clone(),
                });
                report.reports.push(TaskReport {
                    name,
                    status: TaskStatus::Skipped { reason },
                    artifacts: Vec::new(),
                    elapsed: Duration::ZERO,
                });
            }
        }
    }

    async fn execute(&self, name: String) -> (String, Result<Vec<Artifact>>, Duration) {
        let start = Instant::now();
        let result = match self.graph.get(&name) {
            Some(task) => {
                let action = Arc::clone(&task.action);
                AssertUnwindSafe(action.run(&self.ctx))
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|_| Err(Error::TaskJoin(format!("task '{}' panicked", name))))
            }
            None => Err(Error::Configuration(format!("unknown task '{}'", name))),
        };
        (name, result, start.elapsed())
    }

    fn settle(&self, name: &str, result: Result<Vec<Artifact>>, elapsed: Duration) -> TaskReport {
        let (status, artifacts) = match result {
            Ok(artifacts) => {
                klog!("Finished '{}' after {:?}", name, elapsed);
                self.emit(TaskEvent::Completed {
                    task: name.to_string(),
                    artifacts: artifacts.len(),
                });
                (TaskStatus::Completed, artifacts)
            }
            Err(e) => {
                klog_error!("'{}' errored after {:?}: {}", name, elapsed, e);
                self.emit(TaskEvent::Failed {
                    task: name.to_string(),
                    error: e.to_string(),
                });
                (
                    TaskStatus::Failed {
                        error: e.to_string(),
                    },
                    Vec::new(),
                )
            }
        };
        TaskReport {
            name: name.to_string(),
            status,
            artifacts,
            elapsed,
        }
    }
}
