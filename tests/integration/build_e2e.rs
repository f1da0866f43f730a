//! End-to-end build tests.

use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};

use kiln::core::dag::TaskGraph;
use kiln::core::task::{Artifact, TaskAction};
use kiln::orchestration::Orchestrator;
use kiln::transform::Toolchain;
use kiln::{BuildContext, Error, Mode};

use crate::fixtures::{with_style_preprocessor, FailOn, TestProject};

/// Test: Release build
/// Given a typical project
/// When `build` runs
/// Then every stage writes into the distribution root and nothing else
#[tokio::test]
async fn test_release_build_writes_distribution() {
    let t = TestProject::new();
    let report = t
        .project(t.config(), Toolchain::builtin())
        .build()
        .await
        .unwrap();

    for task in ["clean", "styles", "lint", "markup", "scripts", "images", "copy", "vendor"] {
        assert!(report.get(task).is_some_and(|r| r.is_success()), "{} should complete", task);
    }

    assert!(t.exists("dist/index.html"));
    assert!(t.exists("dist/styles/main.css"));
    assert!(t.exists("dist/scripts/main.js"));
    assert!(t.exists("dist/images/logo.png"));
    assert!(t.exists("dist/robots.txt"));
    assert!(t.exists("dist/.htaccess"));
    assert!(t.exists("dist/modules/jquery/dist/jquery.js"));

    // release output carries no source maps and nothing from staging
    assert!(!t.exists("dist/styles/main.css.map"));
    assert!(!t.exists("dist/scripts/main.js.map"));
    assert!(!t.exists(".tmp"));

    let bundle = String::from_utf8(t.read("dist/scripts/main.js")).unwrap();
    assert!(bundle.contains("\"scripts/toggle.js\""));
    assert!(bundle.contains("\"scripts/util.js\""));
    assert!(!bundle.contains("sourceMappingURL"));
}

/// Test: Determinism
/// Given unchanged sources
/// When `build` runs twice
/// Then the distribution roots are byte-identical
#[tokio::test]
async fn test_release_build_is_deterministic() {
    let t = TestProject::new();
    let project = t.project(t.config(), Toolchain::builtin());

    project.build().await.unwrap();
    let first = t.snapshot("dist");
    project.build().await.unwrap();
    let second = t.snapshot("dist");

    assert!(!first.is_empty());
    assert_eq!(first, second);
}

/// Test: Release failure
/// Given a stylesheet the preprocessor rejects
/// When `build` runs
/// Then the build fails and no distribution style artifact is written
#[tokio::test]
async fn test_broken_stylesheet_fails_release() {
    let t = TestProject::new();
    t.write("app/styles/broken.scss", "body { @@broken");
    let mut config = t.config();
    config.styles.entries.push("styles/broken.scss".to_string());

    let project = t.project(
        config,
        with_style_preprocessor(Arc::new(FailOn::new("@@broken"))),
    );
    let err = project.build().await.unwrap_err();
    match &err {
        Error::TasksFailed(failed) => {
            assert_eq!(failed.len(), 1);
            assert_eq!(failed[0].0, "styles");
            assert!(failed[0].1.contains("broken.scss"));
        }
        other => panic!("expected TasksFailed, got {:?}", other),
    }

    assert!(!t.exists("dist/styles/broken.css"));
    assert!(!t.exists("dist/styles/main.css"));
    // the failing group stops the sequence
    assert!(!t.exists("dist/index.html"));
}

/// Test: Dev failure policy
/// Given a style artifact from an earlier good run
/// When the stylesheet breaks and the style task re-runs in watch mode
/// Then the task still completes and the previous artifact is untouched
#[tokio::test]
async fn test_broken_stylesheet_keeps_previous_dev_artifact() {
    let t = TestProject::new();
    t.write("app/styles/broken.scss", "body { color: red; }");
    let mut config = t.config();
    config.styles.entries = vec!["styles/broken.scss".to_string()];

    let project = t.project(
        config,
        with_style_preprocessor(Arc::new(FailOn::new("@@broken"))),
    );
    let ctx = project.context(Mode::develop());
    let graph = project.task_graph(project.bundler(&ctx)).unwrap();
    let orchestrator = Orchestrator::new(graph, ctx).unwrap();

    orchestrator.run(&["styles"]).await.unwrap();
    let good = t.read(".tmp/styles/broken.css");

    t.write("app/styles/broken.scss", "body { @@broken");
    let report = orchestrator.run_task("styles").await.unwrap();
    assert!(report.is_success());
    assert!(report.artifacts.is_empty());
    assert_eq!(t.read(".tmp/styles/broken.css"), good);
}

/// Test: Clean keeps the deploy checkout
#[tokio::test]
async fn test_build_preserves_dist_git() {
    let t = TestProject::new();
    t.write("dist/.git/HEAD", "ref: refs/heads/gh-pages\n");
    t.write("dist/stale.html", "old");
    t.write(".tmp/styles/main.css", "stale");

    t.project(t.config(), Toolchain::builtin())
        .build()
        .await
        .unwrap();

    assert!(t.exists("dist/.git/HEAD"));
    assert!(!t.exists("dist/stale.html"));
    assert!(!t.exists(".tmp"));
}

struct Never(Arc<std::sync::atomic::AtomicBool>);

impl TaskAction for Never {
    fn run<'a>(&'a self, _ctx: &'a BuildContext) -> BoxFuture<'a, kiln::Result<Vec<Artifact>>> {
        self.0.store(true, std::sync::atomic::Ordering::SeqCst);
        async { Ok(Vec::new()) }.boxed()
    }
}

/// Test: Cyclic graph
/// Given A depends on B and B depends on A
/// When the orchestrator is created
/// Then a configuration error is returned and no action has run
#[tokio::test]
async fn test_cycle_is_rejected_before_any_action() {
    let t = TestProject::empty();
    let ran = Arc::new(std::sync::atomic::AtomicBool::new(false));

    let mut graph = TaskGraph::new();
    graph.register_task("a", &["b"], Arc::new(Never(Arc::clone(&ran)))).unwrap();
    graph.register_task("b", &["a"], Arc::new(Never(Arc::clone(&ran)))).unwrap();

    let ctx = BuildContext::new(Mode::release(), &t.root, t.config());
    let err = Orchestrator::new(graph, ctx).err().expect("cycle must be rejected");
    assert!(err.is_configuration());
    assert!(!ran.load(std::sync::atomic::Ordering::SeqCst));
}
