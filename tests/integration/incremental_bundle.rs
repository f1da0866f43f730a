//! Incremental bundling through the public bundler and task APIs.

use std::sync::Arc;

use kiln::bundler::ScriptBundler;
use kiln::orchestration::Orchestrator;
use kiln::transform::TrimWhitespace;
use kiln::Mode;

use crate::fixtures::{with_script_compiler, Recording, TestProject};

/// entry → {a, b}, a → {c}
fn diamond() -> TestProject {
    let t = TestProject::empty();
    t.write(
        "app/scripts/main.js",
        "import a from './a';\nimport b from './b';\nconsole.log(a, b);\n",
    );
    t.write("app/scripts/a.js", "import c from './c';\nexport default c + 1;\n");
    t.write("app/scripts/b.js", "export default 2;\n");
    t.write("app/scripts/c.js", "export default 3;\n");
    t
}

fn bundler(t: &TestProject, compiler: &Recording) -> ScriptBundler {
    ScriptBundler::new(
        t.path("app"),
        "scripts/main.js",
        "scripts/main.js",
        Arc::new(compiler.clone()),
        Arc::new(TrimWhitespace),
    )
}

/// Test: Cache hit
/// Given a bundled module graph
/// When bundling again with no source change
/// Then no module is recompiled
#[tokio::test]
async fn test_second_pass_without_changes_compiles_nothing() {
    let t = diamond();
    let compiler = Recording::new();
    let mut b = bundler(&t, &compiler);

    b.bundle(Mode::develop()).await.unwrap();
    assert_eq!(compiler.take().len(), 4);

    b.bundle(Mode::develop()).await.unwrap();
    assert_eq!(compiler.count(), 0);
}

/// Test: Dependent-side invalidation
/// Given the same graph
/// When only c changes
/// Then exactly c, a and the entry are recompiled and b is untouched
#[tokio::test]
async fn test_leaf_change_recompiles_exactly_its_dependents() {
    let t = diamond();
    let compiler = Recording::new();
    let mut b = bundler(&t, &compiler);
    b.bundle(Mode::develop()).await.unwrap();
    compiler.take();

    t.write("app/scripts/c.js", "export default 30;\n");
    b.bundle(Mode::develop()).await.unwrap();

    assert_eq!(
        compiler.take_relative(&t.path("app")),
        vec!["scripts/a.js", "scripts/c.js", "scripts/main.js"]
    );
}

/// Test: Middle change
/// When a changes, c (its dependency) and b stay cached
#[tokio::test]
async fn test_middle_change_leaves_dependencies_cached() {
    let t = diamond();
    let compiler = Recording::new();
    let mut b = bundler(&t, &compiler);
    b.bundle(Mode::develop()).await.unwrap();
    compiler.take();

    t.write("app/scripts/a.js", "import c from './c';\nexport default c * 2;\n");
    b.bundle(Mode::develop()).await.unwrap();

    assert_eq!(
        compiler.take_relative(&t.path("app")),
        vec!["scripts/a.js", "scripts/main.js"]
    );
}

/// Test: Task-level cache
/// The scripts task shares one bundler across runs of the same orchestrator
#[tokio::test]
async fn test_scripts_task_reuses_cache_between_runs() {
    let t = diamond();
    let compiler = Recording::new();
    let project = t.project(
        t.config(),
        with_script_compiler(Arc::new(compiler.clone())),
    );
    let ctx = project.context(Mode::develop());
    let graph = project.task_graph(project.bundler(&ctx)).unwrap();
    let orchestrator = Orchestrator::new(graph, ctx).unwrap();

    orchestrator.run(&["scripts"]).await.unwrap();
    assert_eq!(compiler.take().len(), 4);
    assert!(t.exists(".tmp/scripts/main.js"));
    assert!(t.exists(".tmp/scripts/main.js.map"));

    let report = orchestrator.run_task("scripts").await.unwrap();
    assert!(report.is_success());
    assert_eq!(compiler.count(), 0);
}
