//! Core domain models for build orchestration.
//!
//! This module contains the task model and the dependency graph the
//! orchestrator schedules from.

pub mod dag;
pub mod task;

pub use dag::TaskGraph;
pub use task::{Artifact, Task, TaskAction, TaskReport, TaskStatus};
