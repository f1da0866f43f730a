//! Filesystem watcher built on `notify`.
//!
//! The notify callback runs on notify's own thread and only forwards raw
//! events into a channel. A tokio task debounces them and emits the
//! settled events to the caller.

use std::path::PathBuf;
use std::time::Duration;

use notify::event::{CreateKind, ModifyKind};
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::{ChangeKind, Debouncer, WatchEvent};
use crate::{klog_debug, klog_error, klog_trace, klog_warn, Error, Result};

/// Keeps the OS watch alive; dropping it stops watching.
pub struct FileWatcher {
    _watcher: RecommendedWatcher,
    watched: Vec<PathBuf>,
    debounce: JoinHandle<()>,
}

impl FileWatcher {
    /// Watch `paths` recursively and send debounced events to `out`.
    ///
    /// A path that cannot be watched is logged and skipped; the others keep
    /// being watched.
    pub fn start(
        paths: &[PathBuf],
        window: Duration,
        out: mpsc::UnboundedSender<WatchEvent>,
        cancel: CancellationToken,
    ) -> Result<Self> {
        let (raw_tx, raw_rx) = mpsc::unbounded_channel();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    let Some(kind) = classify(&event.kind) else {
                        return;
                    };
                    for path in event.paths {
                        let _ = raw_tx.send(WatchEvent::new(path, kind));
                    }
                }
                Err(e) => klog_error!("{}", Error::from(e)),
            },
            Config::default(),
        )?;

        let mut watched = Vec::new();
        for path in paths {
            if !path.exists() {
                klog_debug!("FileWatcher: skipping missing {}", path.display());
                continue;
            }
            match watcher.watch(path, RecursiveMode::Recursive) {
                Ok(()) => watched.push(path.clone()),
                Err(e) => klog_warn!("{} ({})", Error::from(e), path.display()),
            }
        }
        if watched.is_empty() {
            klog_warn!("FileWatcher: nothing could be watched");
        }

        let debounce = tokio::spawn(debounce_loop(raw_rx, out, window, cancel));
        Ok(Self {
            _watcher: watcher,
            watched,
            debounce,
        })
    }

    pub fn watched(&self) -> &[PathBuf] {
        &self.watched
    }
}

impl Drop for FileWatcher {
    fn drop(&mut self) {
        self.debounce.abort();
    }
}

fn classify(kind: &EventKind) -> Option<ChangeKind> {
    match kind {
        EventKind::Create(CreateKind::Folder) => None,
        EventKind::Create(_) => Some(ChangeKind::Added),
        EventKind::Modify(ModifyKind::Metadata(_)) => None,
        EventKind::Modify(_) => Some(ChangeKind::Modified),
        EventKind::Remove(_) => Some(ChangeKind::Removed),
        _ => None,
    }
}

async fn debounce_loop(
    mut raw: mpsc::UnboundedReceiver<WatchEvent>,
    out: mpsc::UnboundedSender<WatchEvent>,
    window: Duration,
    cancel: CancellationToken,
) {
    let mut debouncer = Debouncer::new(window);
    loop {
        let wake = debouncer
            .next_deadline()
            .map(Instant::from_std)
            .unwrap_or_else(|| Instant::now() + Duration::from_secs(3600));

        tokio::select! {
            _ = cancel.cancelled() => break,
            event = raw.recv() => match event {
                Some(event) => {
                    klog_trace!("FileWatcher: raw {:?} {}", event.kind, event.path.display());
                    debouncer.push(event, std::time::Instant::now());
                }
                None => {
                    for event in debouncer.flush() {
                        let _ = out.send(event);
                    }
                    break;
                }
            },
            _ = tokio::time::sleep_until(wake) => {}
        }

        for event in debouncer.due(std::time::Instant::now()) {
            if out.send(event).is_err() {
                return;
            }
        }
    }
    klog_debug!("FileWatcher: debounce loop stopped");
}
