//! Static file server with an optional live-reload channel.
//!
//! Roots are tried in order and the first one holding the requested file
//! answers. When live reload is on, HTML responses get the client script
//! injected and clients listen on a Server-Sent Events stream.

use std::convert::Infallible;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_stream::stream;
use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::{header, StatusCode};
use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use futures::Stream;
use percent_encoding::percent_decode_str;
use tokio::net::TcpListener;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;
use tower_http::services::ServeFile;

use super::LiveReload;
use crate::{klog, klog_debug, klog_trace, Error, Result};

pub const CLIENT_PATH: &str = "/__kiln/livereload.js";
pub const EVENTS_PATH: &str = "/__kiln/events";

const CLIENT_SCRIPT: &str = r#"(function () {
  var source = new EventSource("/__kiln/events");
  source.addEventListener("reload", function () {
    window.location.reload();
  });
  source.addEventListener("style", function () {
    var links = document.querySelectorAll('link[rel="stylesheet"]');
    for (var i = 0; i < links.length; i++) {
      var url = new URL(links[i].href);
      url.searchParams.set("kiln", Date.now());
      links[i].href = url.toString();
    }
  });
})();
"#;

#[derive(Clone)]
struct ServerState {
    roots: Arc<Vec<PathBuf>>,
    reload: Option<LiveReload>,
    shutdown: CancellationToken,
}

pub struct DevServer {
    roots: Vec<PathBuf>,
    reload: Option<LiveReload>,
}

impl DevServer {
    /// Serve `roots` in priority order. `reload` turns on the client
    /// injection and the event stream.
    pub fn new(roots: Vec<PathBuf>, reload: Option<LiveReload>) -> Self {
        Self { roots, reload }
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    pub fn router(&self) -> Router {
        self.router_with(CancellationToken::new())
    }

    fn router_with(&self, shutdown: CancellationToken) -> Router {
        let state = ServerState {
            roots: Arc::new(self.roots.clone()),
            reload: self.reload.clone(),
            shutdown,
        };
        let mut router = Router::new();
        if self.reload.is_some() {
            router = router
                .route(CLIENT_PATH, get(client_script))
                .route(EVENTS_PATH, get(events));
        }
        router.fallback(serve_static).with_state(state)
    }

    /// Serve until `cancel` fires. Open event streams are closed on
    /// shutdown so the server can drain.
    pub async fn serve(self, listener: TcpListener, cancel: CancellationToken) -> Result<()> {
        let addr = listener.local_addr()?;
        let roots = self
            .roots
            .iter()
            .map(|r| r.display().to_string())
            .collect::<Vec<_>>()
            .join(", ");
        klog!("Serving [{}] at http://{}", roots, addr);

        let app = self.router_with(cancel.clone());
        axum::serve(listener, app)
            .with_graceful_shutdown(async move { cancel.cancelled().await })
            .await
            .map_err(|e| Error::Server(e.to_string()))
    }
}

/// Bind the listening socket up front so a taken port fails the caller.
pub async fn bind(host: &str, port: u16) -> Result<TcpListener> {
    TcpListener::bind((host, port))
        .await
        .map_err(|e| Error::Server(format!("cannot bind {}:{}: {}", host, port, e)))
}

/// Insert the reload client before `</body>`, or append it.
pub fn inject_client(html: &str) -> String {
    let tag = format!("<script src=\"{}\"></script>", CLIENT_PATH);
    match html.rfind("</body>") {
        Some(at) => format!("{}{}\n{}", &html[..at], tag, &html[at..]),
        None => format!("{}{}\n", html, tag),
    }
}

async fn client_script() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "application/javascript; charset=utf-8")],
        CLIENT_SCRIPT,
    )
}

async fn events(
    State(state): State<ServerState>,
) -> std::result::Result<Sse<impl Stream<Item = std::result::Result<SseEvent, Infallible>>>, StatusCode>
{
    let reload = state.reload.ok_or(StatusCode::NOT_FOUND)?;
    let mut rx = reload.subscribe();
    let shutdown = state.shutdown;
    klog_debug!("LiveReload: client connected ({} total)", reload.client_count());

    let event_stream = stream! {
        loop {
            let received = tokio::select! {
                _ = shutdown.cancelled() => break,
                received = rx.recv() => received,
            };
            match received {
                Ok(kind) => {
                    let name = kind.event_name();
                    yield Ok(SseEvent::default().event(name).data(name));
                }
                Err(RecvError::Lagged(skipped)) => {
                    klog_trace!("LiveReload: client lagged by {}", skipped);
                    continue;
                }
                Err(RecvError::Closed) => break,
            }
        }
    };

    Ok(Sse::new(event_stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15))))
}

/// Map a request path onto a root-relative file path. `None` for anything
/// that tries to leave the root.
/// Map a request path onto a path relative to a served root. Escapes are
/// decoded before `..` is rejected.
fn request_path(uri_path: &str) -> Option<PathBuf> {
    let decoded = percent_decode_str(uri_path).decode_utf8().ok()?;
    let trimmed = decoded.trim_start_matches('/');
    let mut rel = PathBuf::new();
    for component in Path::new(trimmed).components() {
        match component {
            Component::Normal(part) => rel.push(part),
            Component::CurDir => {}
            _ => return None,
        }
    }
    if trimmed.is_empty() || trimmed.ends_with('/') {
        rel.push("index.html");
    }
    Some(rel)
}

fn is_html(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.eq_ignore_ascii_case("html") || ext.eq_ignore_ascii_case("htm"))
        .unwrap_or(false)
}

async fn serve_static(State(state): State<ServerState>, req: Request) -> Response {
    let Some(rel) = request_path(req.uri().path()) else {
        return StatusCode::BAD_REQUEST.into_response();
    };

    for root in state.roots.iter() {
        let mut candidate = root.join(&rel);
        if tokio::fs::metadata(&candidate)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false)
        {
            candidate.push("index.html");
        }
        if !tokio::fs::metadata(&candidate)
            .await
            .map(|m| m.is_file())
            .unwrap_or(false)
        {
            continue;
        }

        if state.reload.is_some() && is_html(&candidate) {
            return match tokio::fs::read(&candidate).await {
                Ok(bytes) => (
                    [(header::CONTENT_TYPE, "text/html; charset=utf-8")],
                    inject_client(&String::from_utf8_lossy(&bytes)),
                )
                    .into_response(),
                Err(_) => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
            };
        }

        return match ServeFile::new(&candidate).oneshot(req).await {
            Ok(response) => response.map(Body::new),
            Err(never) => match never {},
        };
    }

    StatusCode::NOT_FOUND.into_response()
}
