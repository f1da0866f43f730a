//! Coalescing re-run queue for the watch loop.
//!
//! At most one rebuild of a given task is in flight. Requests that arrive
//! while it runs collapse into a single follow-up run, so two rebuilds never
//! write the same artifact at once.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::task::JoinHandle;

use crate::orchestration::scheduler::Orchestrator;
use crate::server::{LiveReload, ReloadKind};
use crate::{klog_debug, klog_error, klog_warn};

#[derive(Debug, Default, Clone, Copy)]
struct Slot {
    running: bool,
    pending: bool,
}

/// Re-runs tasks on behalf of the file watcher and signals reloads.
#[derive(Clone)]
pub struct RebuildQueue {
    orchestrator: Orchestrator,
    reload: LiveReload,
    slots: Arc<Mutex<HashMap<String, Slot>>>,
}

impl RebuildQueue {
    pub fn new(orchestrator: Orchestrator, reload: LiveReload) -> Self {
        Self {
            orchestrator,
            reload,
            slots: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Ask for `task` to run again.
    ///
    /// Returns the handle of a newly started worker, or `None` if a rebuild
    /// of the task was already in flight and this request was folded into
    /// its follow-up run.
    pub fn request(&self, task: &str) -> Option<JoinHandle<()>> {
        {
            let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
            let slot = slots.entry(task.to_string()).or_default();
            if slot.running {
                slot.pending = true;
                klog_debug!("RebuildQueue: '{}' in flight, coalescing", task);
                return None;
            }
            slot.running = true;
        }

        let this = self.clone();
        let task = task.to_string();
        Some(tokio::spawn(async move { this.drive(task).await }))
    }

    /// Whether a rebuild of `task` is currently running.
    pub fn is_running(&self, task: &str) -> bool {
        let slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        slots.get(task).map(|s| s.running).unwrap_or(false)
    }

    async fn drive(&self, task: String) {
        loop {
            match self.orchestrator.run_task(&task).await {
                Ok(report) if report.is_success() => {
                    // Tasks that wrote nothing (lint, a failed dev transform)
                    // leave the page as it is.
                    if !report.artifacts.is_empty() {
                        self.reload.notify(ReloadKind::for_task(&task));
                    }
                }
                Ok(report) => {
                    klog_warn!("Rebuild of '{}' {}", task, report.status);
                }
                Err(e) => {
                    klog_error!("Rebuild of '{}' could not start: {}", task, e);
                }
            }

            if !self.finish(&task) {
                break;
            }
        }
    }

    /// Returns true if another run was requested meanwhile.
    fn finish(&self, task: &str) -> bool {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        let slot = slots.entry(task.to_string()).or_default();
        if slot.pending {
            slot.pending = false;
            true
        } else {
            slot.running = false;
            false
        }
    }
}
