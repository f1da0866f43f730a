//! File watching: raw filesystem events, per-path debouncing, and the
//! routing table that maps a changed path to the tasks it affects.

mod debounce;
mod routes;
mod watcher;

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

pub use debounce::Debouncer;
pub use routes::RouteTable;
pub use watcher::FileWatcher;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Added,
    Modified,
    Removed,
}

/// One detected change. Consumed by the router and dropped after dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEvent {
    pub path: PathBuf,
    pub kind: ChangeKind,
}

impl WatchEvent {
    pub fn new(path: impl Into<PathBuf>, kind: ChangeKind) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }
}
