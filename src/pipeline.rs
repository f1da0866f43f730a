//! Project wiring: the task graph, and the `build`, `develop`, `preview`
//! and `clean` entry points built on it.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex as StdMutex};

use futures::future::{BoxFuture, FutureExt};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::bundler::{spawn_watch, ScriptBundler, ScriptsTask};
use crate::config::{Config, CONFIG_FILE};
use crate::core::dag::TaskGraph;
use crate::core::task::{Artifact, TaskAction};
use crate::mode::{BuildContext, Mode};
use crate::orchestration::{Orchestrator, RebuildQueue, RunReport};
use crate::server::{bind, DevServer, LiveReload};
use crate::stages::{
    CleanStage, ImageStage, LintStage, MarkupStage, StaticCopyStage, StyleStage, VendorStage,
};
use crate::transform::Toolchain;
use crate::watch::{FileWatcher, RouteTable};
use crate::{klog, klog_debug, Error, Result};

/// Release build order. Groups run one after another; tasks inside a group
/// run concurrently.
pub const BUILD_SEQUENCE: &[&[&str]] = &[
    &["clean"],
    &["styles"],
    &["lint", "markup", "scripts", "images", "copy", "vendor"],
];

/// Tasks the dev server waits for.
pub const DEVELOP_TASKS: &[&str] = &["vendor", "scripts", "styles", "markup", "images", "copy"];

/// Tasks a watch route may not target.
const UNROUTABLE: &[&str] = &["clean", "serve"];

/// A loaded, validated project.
#[derive(Debug, Clone)]
pub struct Project {
    root: PathBuf,
    config: Config,
    toolchain: Toolchain,
}

impl Project {
    /// Load `kiln.toml` (or `config_path`) and validate it.
    pub fn load(root: &Path, config_path: Option<&Path>) -> Result<Self> {
        let path = config_path
            .map(Path::to_path_buf)
            .unwrap_or_else(|| root.join(CONFIG_FILE));
        let config = Config::load(&path)?;
        config.validate()?;
        let toolchain = Toolchain::from_config(&config);
        klog_debug!("Project::load root={} toolchain={:?}", root.display(), toolchain);
        Ok(Self::new(root, config, toolchain))
    }

    pub fn new(root: &Path, config: Config, toolchain: Toolchain) -> Self {
        Self {
            root: root.to_path_buf(),
            config,
            toolchain,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn context(&self, mode: Mode) -> BuildContext {
        BuildContext::new(mode, &self.root, self.config.clone())
    }

    pub fn bundler(&self, ctx: &BuildContext) -> Arc<Mutex<ScriptBundler>> {
        Arc::new(Mutex::new(ScriptBundler::from_context(ctx, &self.toolchain)))
    }

    /// Every stage task. None of them depend on one another; ordering comes
    /// from the run sequence.
    pub fn task_graph(&self, bundler: Arc<Mutex<ScriptBundler>>) -> Result<TaskGraph> {
        let tc = &self.toolchain;
        let mut graph = TaskGraph::new();
        graph.register_task("clean", &[], Arc::new(CleanStage))?;
        graph.register_task(
            "styles",
            &[],
            Arc::new(StyleStage::new(
                Arc::clone(&tc.style_preprocessor),
                Arc::clone(&tc.style_minifier),
            )),
        )?;
        graph.register_task("lint", &[], Arc::new(LintStage::new(tc.linter.clone())))?;
        graph.register_task(
            "markup",
            &[],
            Arc::new(MarkupStage::new(Arc::clone(&tc.markup_minifier))),
        )?;
        graph.register_task("scripts", &[], Arc::new(ScriptsTask::new(bundler)))?;
        graph.register_task(
            "images",
            &[],
            Arc::new(ImageStage::new(Arc::clone(&tc.image_optimizer))),
        )?;
        graph.register_task("copy", &[], Arc::new(StaticCopyStage))?;
        graph.register_task("vendor", &[], Arc::new(VendorStage))?;
        Ok(graph)
    }

    /// One-shot release build into the distribution root.
    pub async fn build(&self) -> Result<RunReport> {
        let ctx = self.context(Mode::release());
        let dist = ctx.layout.dist.clone();
        let graph = self.task_graph(self.bundler(&ctx))?;
        let orchestrator = Orchestrator::new(graph, ctx)?;
        let report = orchestrator.run_sequence(BUILD_SEQUENCE).await?;
        klog!(
            "Build finished: {} artifact(s) in {}",
            report.artifacts().count(),
            dist.display()
        );
        Ok(report)
    }

    pub async fn clean(&self) -> Result<()> {
        let ctx = self.context(Mode::release());
        let graph = self.task_graph(self.bundler(&ctx))?;
        Orchestrator::new(graph, ctx)?.run(&["clean"]).await?;
        Ok(())
    }

    /// Watch mode: initial build, dev server, then rebuild on change until
    /// `cancel` fires.
    pub async fn develop(&self, port: Option<u16>, cancel: CancellationToken) -> Result<()> {
        self.develop_with(port, LiveReload::new(), cancel).await
    }

    /// [`Project::develop`] signalling on a caller-supplied `reload`.
    pub async fn develop_with(
        &self,
        port: Option<u16>,
        reload: LiveReload,
        cancel: CancellationToken,
    ) -> Result<()> {
        let ctx = self.context(Mode::develop());
        let bundler = self.bundler(&ctx);

        let mut graph = self.task_graph(Arc::clone(&bundler))?;
        let serve = Arc::new(ServeTask::new(
            vec![ctx.layout.staging.clone(), ctx.layout.source.clone()],
            Some(reload.clone()),
            port.unwrap_or(self.config.server.port),
            cancel.clone(),
        ));
        graph.register_task("serve", DEVELOP_TASKS, serve.clone())?;

        let routes = RouteTable::new(&self.config.watch.routes, |task| {
            graph.contains(task) && !UNROUTABLE.contains(&task)
        })?;
        klog_debug!("develop: {} watch route(s)", routes.len());

        let source = ctx.layout.source.clone();
        let orchestrator = Orchestrator::new(graph, ctx.clone())?;
        orchestrator.run(&["serve"]).await?;

        let (tx, mut rx) = mpsc::unbounded_channel();
        let watcher = FileWatcher::start(
            std::slice::from_ref(&source),
            self.config.watch.debounce(),
            tx,
            cancel.clone(),
        )?;
        let (bundle_tx, bundle_rx) = mpsc::unbounded_channel();
        let subscription = spawn_watch(bundler, Arc::new(ctx), bundle_rx, reload.clone());
        let queue = RebuildQueue::new(orchestrator, reload);

        klog!("Watching {} (Ctrl-C to stop)", source.display());
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                event = rx.recv() => {
                    let Some(event) = event else { break };
                    let tasks = routes.route_path(&source, &event.path);
                    klog_debug!("{:?} {} -> {:?}", event.kind, event.path.display(), tasks);
                    for task in &tasks {
                        queue.request(task);
                    }
                    let _ = bundle_tx.send(event);
                }
            }
        }

        drop(watcher);
        drop(bundle_tx);
        let _ = subscription.await;
        serve.wait().await
    }

    /// Release build, then serve the distribution root without live reload.
    pub async fn preview(&self, port: Option<u16>, cancel: CancellationToken) -> Result<()> {
        self.build().await?;
        let listener = bind(
            &self.config.server.host,
            port.unwrap_or(self.config.server.preview_port),
        )
        .await?;
        let dist = self.context(Mode::release()).layout.dist;
        DevServer::new(vec![dist], None).serve(listener, cancel).await
    }
}

/// Starts the dev server once its upstream stages are done. The server
/// keeps running after the task completes.
struct ServeTask {
    roots: Vec<PathBuf>,
    reload: Option<LiveReload>,
    port: u16,
    cancel: CancellationToken,
    handle: StdMutex<Option<JoinHandle<Result<()>>>>,
}

impl ServeTask {
    fn new(
        roots: Vec<PathBuf>,
        reload: Option<LiveReload>,
        port: u16,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            roots,
            reload,
            port,
            cancel,
            handle: StdMutex::new(None),
        }
    }

    /// Wait for the server to shut down.
    async fn wait(&self) -> Result<()> {
        let handle = self
            .handle
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        match handle {
            Some(handle) => handle.await.map_err(|e| Error::TaskJoin(e.to_string()))?,
            None => Ok(()),
        }
    }
}

impl TaskAction for ServeTask {
    fn run<'a>(&'a self, ctx: &'a BuildContext) -> BoxFuture<'a, Result<Vec<Artifact>>> {
        async move {
            let listener = bind(&ctx.config.server.host, self.port).await?;
            let server = DevServer::new(self.roots.clone(), self.reload.clone());
            let handle = tokio::spawn(server.serve(listener, self.cancel.clone()));
            *self.handle.lock().unwrap_or_else(|e| e.into_inner()) = Some(handle);
            Ok(Vec::new())
        }
        .boxed()
    }
}
