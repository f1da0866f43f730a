//! Development server and live-reload channel.

mod dev;
mod reload;

pub use dev::{bind, inject_client, DevServer, CLIENT_PATH, EVENTS_PATH};
pub use reload::{LiveReload, ReloadKind};
