//! Reload signalling after rebuilds.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use kiln::bundler::spawn_watch;
use kiln::orchestration::{Orchestrator, RebuildQueue};
use kiln::server::{LiveReload, ReloadKind};
use kiln::transform::Toolchain;
use kiln::watch::{ChangeKind, WatchEvent};
use kiln::Mode;

use crate::fixtures::{with_script_compiler, FailOn, TestProject};

/// Test: No clients
/// notify with nobody connected succeeds and sends nothing
#[test]
fn test_notify_without_clients_is_noop() {
    let reload = LiveReload::new();
    assert_eq!(reload.client_count(), 0);
    assert!(!reload.notify(ReloadKind::StyleInject));
    assert!(!reload.notify(ReloadKind::FullReload));
}

/// Test: Reload kind per stage
/// Style rebuilds inject; markup and image rebuilds reload the page
#[tokio::test]
async fn test_rebuild_signals_by_stage() {
    let t = TestProject::new();
    let project = t.project(t.config(), Toolchain::builtin());
    let ctx = project.context(Mode::develop());
    let graph = project.task_graph(project.bundler(&ctx)).unwrap();
    let orchestrator = Orchestrator::new(graph, ctx).unwrap();

    let reload = LiveReload::new();
    let mut client = reload.subscribe();
    let queue = RebuildQueue::new(orchestrator, reload.clone());

    queue.request("styles").unwrap().await.unwrap();
    assert_eq!(client.recv().await.unwrap(), ReloadKind::StyleInject);

    queue.request("markup").unwrap().await.unwrap();
    assert_eq!(client.recv().await.unwrap(), ReloadKind::FullReload);

    queue.request("images").unwrap().await.unwrap();
    assert_eq!(client.recv().await.unwrap(), ReloadKind::FullReload);

    // lint writes nothing, so the page stays as it is
    queue.request("lint").unwrap().await.unwrap();
    assert!(client.try_recv().is_err());
}

/// Test: Bundler subscription
/// A script change re-bundles and reloads; a compile error keeps the last
/// good bundle and sends nothing
#[tokio::test]
async fn test_bundler_subscription_reloads_and_survives_errors() {
    let t = TestProject::new();
    let project = t.project(
        t.config(),
        with_script_compiler(Arc::new(FailOn::new("@@oops"))),
    );
    let ctx = project.context(Mode::develop());
    let bundler = project.bundler(&ctx);
    bundler.lock().await.build(&ctx).await.unwrap();

    let reload = LiveReload::new();
    let mut client = reload.subscribe();
    let (tx, rx) = mpsc::unbounded_channel();
    let handle = spawn_watch(Arc::clone(&bundler), Arc::new(ctx), rx, reload);

    t.write("app/scripts/util.js", "exports.flip = function () {};\n");
    tx.send(WatchEvent::new(t.path("app/scripts/util.js"), ChangeKind::Modified))
        .unwrap();
    assert_eq!(client.recv().await.unwrap(), ReloadKind::FullReload);
    let good = t.read(".tmp/scripts/main.js");
    assert!(String::from_utf8_lossy(&good).contains("exports.flip = function () {};"));

    t.write("app/scripts/util.js", "@@oops\n");
    tx.send(WatchEvent::new(t.path("app/scripts/util.js"), ChangeKind::Modified))
        .unwrap();
    let nothing = tokio::time::timeout(Duration::from_millis(300), client.recv()).await;
    assert!(nothing.is_err(), "failed pass must not reload");
    assert_eq!(t.read(".tmp/scripts/main.js"), good);

    drop(tx);
    handle.await.unwrap();
}
