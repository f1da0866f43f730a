//! Live-reload notifier.
//!
//! Connected development clients subscribe to a broadcast channel. A
//! notification with nobody listening is a no-op.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::{klog_debug, klog_trace};

/// Capacity of the reload channel; slow clients skip to the newest signal.
const CHANNEL_CAPACITY: usize = 16;

/// What a client should do after a rebuild.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReloadKind {
    /// Navigate again.
    FullReload,
    /// Re-fetch stylesheets in place.
    StyleInject,
}

impl ReloadKind {
    /// Style rebuilds are injected; every other stage reloads the page.
    pub fn for_task(task: &str) -> Self {
        if task == "styles" {
            ReloadKind::StyleInject
        } else {
            ReloadKind::FullReload
        }
    }

    /// Event name on the wire.
    pub fn event_name(&self) -> &'static str {
        match self {
            ReloadKind::FullReload => "reload",
            ReloadKind::StyleInject => "style",
        }
    }
}

/// Handle shared by the dev server and everything that triggers reloads.
#[derive(Debug, Clone)]
pub struct LiveReload {
    tx: broadcast::Sender<ReloadKind>,
}

impl LiveReload {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { tx }
    }

    /// Register a client.
    pub fn subscribe(&self) -> broadcast::Receiver<ReloadKind> {
        self.tx.subscribe()
    }

    /// Number of clients currently connected.
    pub fn client_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Signal connected clients. Returns whether anything was sent.
    pub fn notify(&self, kind: ReloadKind) -> bool {
        if self.client_count() == 0 {
            klog_trace!("LiveReload: no clients, dropping {:?}", kind);
            return false;
        }
        match self.tx.send(kind) {
            Ok(n) => {
                klog_debug!("LiveReload: {} sent to {} client(s)", kind.event_name(), n);
                true
            }
            // The last client went away between the check and the send.
            Err(_) => false,
        }
    }
}

impl Default for LiveReload {
    fn default() -> Self {
        Self::new()
    }
}
