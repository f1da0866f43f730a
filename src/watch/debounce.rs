//! Trailing-edge, per-path debouncing.
//!
//! Every event for a path pushes that path's deadline out by one window.
//! A path is released once the window passes without further events, so
//! an editor writing a file three times per save yields a single event.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use super::{ChangeKind, WatchEvent};

#[derive(Debug)]
pub struct Debouncer {
    window: Duration,
    pending: HashMap<PathBuf, (ChangeKind, Instant)>,
}

impl Debouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            pending: HashMap::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn push(&mut self, event: WatchEvent, now: Instant) {
        let deadline = now + self.window;
        let kind = match self.pending.get(&event.path) {
            Some((previous, _)) => merge(*previous, event.kind),
            None => event.kind,
        };
        self.pending.insert(event.path, (kind, deadline));
    }

    /// Events whose window has elapsed, ordered by path.
    pub fn due(&mut self, now: Instant) -> Vec<WatchEvent> {
        let ready: Vec<PathBuf> = self
            .pending
            .iter()
            .filter(|(_, (_, deadline))| *deadline <= now)
            .map(|(path, _)| path.clone())
            .collect();
        let mut events: Vec<WatchEvent> = ready
            .into_iter()
            .filter_map(|path| {
                self.pending
                    .remove(&path)
                    .map(|(kind, _)| WatchEvent::new(path, kind))
            })
            .collect();
        events.sort_by(|a, b| a.path.cmp(&b.path));
        events
    }

    /// Everything still pending, regardless of deadlines.
    pub fn flush(&mut self) -> Vec<WatchEvent> {
        let mut events: Vec<WatchEvent> = self
            .pending
            .drain()
            .map(|(path, (kind, _))| WatchEvent::new(path, kind))
            .collect();
        events.sort_by(|a, b| a.path.cmp(&b.path));
        events
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending.values().map(|(_, deadline)| *deadline).min()
    }
}

fn merge(previous: ChangeKind, next: ChangeKind) -> ChangeKind {
    use ChangeKind::*;
    match (previous, next) {
        (Added, Modified) => Added,
        (Removed, Added) | (Removed, Modified) => Modified,
        (_, next) => next,
    }
}
