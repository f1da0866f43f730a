//! Watch → route → rebuild tests.

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::{BoxFuture, FutureExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use kiln::config::{Config, RouteConfig};
use kiln::core::dag::TaskGraph;
use kiln::core::task::{Artifact, TaskAction};
use kiln::orchestration::{Orchestrator, RebuildQueue};
use kiln::server::{LiveReload, ReloadKind};
use kiln::transform::Toolchain;
use kiln::watch::{ChangeKind, Debouncer, FileWatcher, RouteTable, WatchEvent};
use kiln::{BuildContext, Mode};

use crate::fixtures::TestProject;

struct CountingTask {
    runs: Arc<AtomicUsize>,
    delay: Duration,
}

impl TaskAction for CountingTask {
    fn run<'a>(&'a self, _ctx: &'a BuildContext) -> BoxFuture<'a, kiln::Result<Vec<Artifact>>> {
        async move {
            self.runs.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            Ok(vec![Artifact::new("markup", PathBuf::from("index.html"), 1)])
        }
        .boxed()
    }
}

fn markup_queue(t: &TestProject, delay: Duration) -> (RebuildQueue, Arc<AtomicUsize>) {
    let runs = Arc::new(AtomicUsize::new(0));
    let mut graph = TaskGraph::new();
    graph
        .register_task(
            "markup",
            &[],
            Arc::new(CountingTask {
                runs: Arc::clone(&runs),
                delay,
            }),
        )
        .unwrap();
    let ctx = BuildContext::new(Mode::develop(), &t.root, Config::default());
    let orchestrator = Orchestrator::new(graph, ctx).unwrap();
    (RebuildQueue::new(orchestrator, LiveReload::new()), runs)
}

/// Test: Debounced rebuild
/// Given two change events for the same file inside the debounce window
/// When they are routed
/// Then exactly one rebuild runs
#[tokio::test]
async fn test_burst_within_window_rebuilds_once() {
    let t = TestProject::new();
    let (queue, runs) = markup_queue(&t, Duration::from_millis(5));
    let routes = RouteTable::new(&Config::default().watch.routes, |task| {
        ["markup", "styles", "lint", "images"].contains(&task)
    })
    .unwrap();

    let window = Duration::from_millis(150);
    let mut debouncer = Debouncer::new(window);
    let t0 = Instant::now();
    let index = t.path("app/index.html");
    debouncer.push(WatchEvent::new(&index, ChangeKind::Modified), t0);
    debouncer.push(
        WatchEvent::new(&index, ChangeKind::Modified),
        t0 + Duration::from_millis(60),
    );

    assert!(debouncer.due(t0 + Duration::from_millis(100)).is_empty());
    let settled = debouncer.due(t0 + Duration::from_millis(300));
    assert_eq!(settled.len(), 1);

    let mut workers = Vec::new();
    for event in settled {
        for task in routes.route_path(&t.path("app"), &event.path) {
            workers.extend(queue.request(&task));
        }
    }
    for worker in workers {
        worker.await.unwrap();
    }
    assert_eq!(runs.load(Ordering::SeqCst), 1);
}

/// Test: In-flight coalescing
/// Requests for a task that is already rebuilding collapse into one more run
#[tokio::test]
async fn test_requests_during_rebuild_coalesce() {
    let t = TestProject::new();
    let (queue, runs) = markup_queue(&t, Duration::from_millis(50));

    let worker = queue.request("markup").unwrap();
    for _ in 0..4 {
        assert!(queue.request("markup").is_none());
    }
    worker.await.unwrap();
    assert_eq!(runs.load(Ordering::SeqCst), 2);
}

/// Test: Route validation
/// Default routes are valid for the project's tasks; a route to an unknown
/// task is a configuration error
#[tokio::test]
async fn test_routes_validated_against_task_graph() {
    let t = TestProject::new();
    let project = t.project(t.config(), Toolchain::builtin());
    let ctx = project.context(Mode::develop());
    let graph = project.task_graph(project.bundler(&ctx)).unwrap();

    assert!(RouteTable::new(&t.config().watch.routes, |task| graph.contains(task)).is_ok());

    let bad = vec![RouteConfig {
        pattern: "**/*.less".to_string(),
        tasks: vec!["less".to_string()],
    }];
    let err = RouteTable::new(&bad, |task| graph.contains(task)).unwrap_err();
    assert!(err.is_configuration());
}

/// Test: Real filesystem events
/// Several quick writes to one file reach the router as a single event
#[tokio::test]
async fn test_file_watcher_debounces_real_writes() {
    let t = TestProject::new();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let cancel = CancellationToken::new();
    let _watcher = FileWatcher::start(
        &[t.path("app")],
        Duration::from_millis(200),
        tx,
        cancel.clone(),
    )
    .unwrap();
    tokio::time::sleep(Duration::from_millis(150)).await;

    for i in 0..3 {
        t.write("app/index.html", &format!("<p>{}</p>", i));
    }

    let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("watcher event")
        .unwrap();
    assert!(event.path.ends_with("index.html"));

    let routes = RouteTable::new(&Config::default().watch.routes, |_| true).unwrap();
    let app = std::fs::canonicalize(t.path("app")).unwrap();
    let path = std::fs::canonicalize(&event.path).unwrap();
    assert_eq!(routes.route_path(&app, &path), vec!["markup"]);

    tokio::time::sleep(Duration::from_millis(400)).await;
    let extra: Vec<_> = std::iter::from_fn(|| rx.try_recv().ok())
        .filter(|e| e.path.ends_with("index.html"))
        .collect();
    assert!(extra.is_empty(), "burst should collapse, got {:?}", extra);
    cancel.cancel();
}

/// Test: Whole develop loop
/// Given a running `develop` session
/// When a stylesheet and then a script module are saved
/// Then styles are re-injected, the bundle is rewritten with a full reload,
/// and cancelling ends the session cleanly
#[tokio::test]
async fn test_develop_rebuilds_and_reloads_until_cancelled() {
    let t = TestProject::new();
    let project = t.project(t.config(), Toolchain::builtin());
    let reload = LiveReload::new();
    let mut client = reload.subscribe();
    let cancel = CancellationToken::new();

    let session = {
        let cancel = cancel.clone();
        let reload = reload.clone();
        tokio::spawn(async move { project.develop_with(Some(0), reload, cancel).await })
    };

    let css = t.path(".tmp/styles/main.css");
    let bundle = t.path(".tmp/scripts/main.js");
    let deadline = Instant::now() + Duration::from_secs(10);
    while !(css.exists() && bundle.exists()) {
        assert!(Instant::now() < deadline, "initial build never finished");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    // let the watcher arm after the initial build
    tokio::time::sleep(Duration::from_millis(300)).await;

    t.write("app/styles/main.scss", "body {\n  color: #c0ffee;\n}\n");
    let kind = wait_for(&mut client, ReloadKind::StyleInject).await;
    assert_eq!(kind, ReloadKind::StyleInject);
    assert!(String::from_utf8_lossy(&t.read(".tmp/styles/main.css")).contains("#c0ffee"));

    t.write(
        "app/scripts/util.js",
        "exports.flip = function (el) { el.toggleClass('shut'); };\n",
    );
    wait_for(&mut client, ReloadKind::FullReload).await;
    assert!(String::from_utf8_lossy(&t.read(".tmp/scripts/main.js")).contains("'shut'"));

    cancel.cancel();
    let result = tokio::time::timeout(Duration::from_secs(5), session)
        .await
        .expect("develop did not stop after cancel")
        .unwrap();
    assert!(result.is_ok(), "develop returned {:?}", result);
}

async fn wait_for(
    client: &mut tokio::sync::broadcast::Receiver<ReloadKind>,
    want: ReloadKind,
) -> ReloadKind {
    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            match client.recv().await {
                Ok(kind) if kind == want => return kind,
                Ok(_) => continue,
                Err(e) => panic!("reload channel closed: {}", e),
            }
        }
    })
    .await
    .unwrap_or_else(|_| panic!("no {:?} reload", want))
}
