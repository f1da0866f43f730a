//! Orchestration layer: runs the task graph once, and re-runs single tasks
//! on behalf of the file watcher.

mod rebuild;
mod scheduler;

pub use rebuild::RebuildQueue;
pub use scheduler::{Orchestrator, RunReport, TaskEvent};
