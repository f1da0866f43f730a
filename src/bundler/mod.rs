//! Incremental script bundler.
//!
//! The bundler owns a [`ModuleGraph`] that outlives individual passes. Each
//! pass re-fingerprints the known modules, drops the entries of changed
//! modules and of everything that transitively requires them, recompiles
//! only what is missing and re-links the bundle from the cached units.

mod graph;
mod link;
mod resolve;

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

use crate::core::task::{Artifact, TaskAction};
use crate::error::TransformError;
use crate::mode::{BuildContext, Mode};
use crate::server::{LiveReload, ReloadKind};
use crate::sourcemap::{script_trailer, SourceMap};
use crate::transform::{Toolchain, Transform, TransformOptions};
use crate::util::{fingerprint, relative_slash, write_file};
use crate::watch::WatchEvent;
use crate::{klog, klog_debug, klog_error, Result};

pub use graph::{ModuleEntry, ModuleGraph};
pub use link::link;
pub use resolve::{resolve, scan_imports, Resolution};

const STAGE: &str = "scripts";

/// What one pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassStats {
    /// Modules compiled during the pass.
    pub compiled: BTreeSet<String>,
    /// Modules served from the cache.
    pub reused: usize,
    /// Modules dropped because the entry no longer reaches them.
    pub pruned: Vec<String>,
    pub elapsed: Duration,
}

/// Output of one pass, not yet written anywhere.
#[derive(Debug, Clone)]
pub struct Bundle {
    pub code: Vec<u8>,
    /// Sidecar source map; only produced outside release mode.
    pub map: Option<Vec<u8>>,
    pub stats: PassStats,
}

pub struct ScriptBundler {
    root: PathBuf,
    entry: String,
    output: String,
    graph: ModuleGraph,
    compiler: Arc<dyn Transform>,
    minifier: Arc<dyn Transform>,
    failed: bool,
}

impl ScriptBundler {
    /// `root` is the source root; `entry` and `output` are relative to the
    /// source root and the output root respectively.
    pub fn new(
        root: impl Into<PathBuf>,
        entry: &str,
        output: &str,
        compiler: Arc<dyn Transform>,
        minifier: Arc<dyn Transform>,
    ) -> Self {
        Self {
            root: root.into(),
            entry: entry.trim_start_matches("./").to_string(),
            output: output.to_string(),
            graph: ModuleGraph::new(),
            compiler,
            minifier,
            failed: false,
        }
    }

    pub fn from_context(ctx: &BuildContext, toolchain: &Toolchain) -> Self {
        Self::new(
            ctx.layout.source.clone(),
            &ctx.config.scripts.entry,
            &ctx.config.scripts.output,
            Arc::clone(&toolchain.script_compiler),
            Arc::clone(&toolchain.script_minifier),
        )
    }

    pub fn graph(&self) -> &ModuleGraph {
        &self.graph
    }

    pub fn entry(&self) -> &str {
        &self.entry
    }

    /// Whether the last pass failed. Cleared by the next successful pass.
    pub fn failed(&self) -> bool {
        self.failed
    }

    /// Whether a change to `path` can affect the bundle: the entry, a cached
    /// module, or a module some cached entry requires but that has not
    /// compiled yet.
    pub fn tracks(&self, path: &Path) -> bool {
        relative_slash(path, &self.root)
            .map(|id| id == self.entry || self.graph.contains(&id) || self.graph.is_required(&id))
            .unwrap_or(false)
    }

    /// Run one bundle pass.
    ///
    /// A failing module aborts the pass; entries compiled before the failure
    /// stay cached for the next one.
    pub async fn bundle(&mut self, mode: Mode) -> std::result::Result<Bundle, TransformError> {
        let result = self.pass(mode).await;
        self.failed = result.is_err();
        result
    }

    async fn pass(&mut self, mode: Mode) -> std::result::Result<Bundle, TransformError> {
        let start = Instant::now();
        let mut stats = PassStats::default();

        self.refresh().await;

        let mut visited = BTreeSet::new();
        let mut stack = vec![self.entry.clone()];
        while let Some(id) = stack.pop() {
            if !visited.insert(id.clone()) {
                continue;
            }
            let requires: Vec<String> = match self.graph.get(&id) {
                Some(cached) => {
                    stats.reused += 1;
                    cached.requires.values().cloned().collect()
                }
                None => {
                    let entry = self.compile(&id, mode).await?;
                    let requires = entry.requires.values().cloned().collect();
                    stats.compiled.insert(id.clone());
                    self.graph.insert(entry);
                    requires
                }
            };
            stack.extend(requires.into_iter().filter(|r| !visited.contains(r)));
        }

        stats.pruned = self.graph.retain_reachable(&self.entry);
        for id in &stats.pruned {
            klog_debug!("ScriptBundler: pruned unreachable module {}", id);
        }

        let mut code = link(&self.entry, &self.graph);
        let mut map = None;
        let options = TransformOptions {
            source_maps: !mode.release,
            ..TransformOptions::new(STAGE, self.root.join(&self.entry))
        };
        if mode.release {
            code = self.minifier.transform(&code, &options).await?;
        } else {
            let file = Path::new(&self.output)
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| self.output.clone());
            let map_name = format!("{}.map", file);
            let mut source_map = SourceMap::new(&file);
            for module in self.graph.modules() {
                source_map.add_source(&module.id, &module.source);
            }
            map = Some(
                source_map
                    .to_bytes()
                    .map_err(|e| options.error(e.to_string()))?,
            );
            code.extend_from_slice(script_trailer(&map_name).as_bytes());
        }

        stats.elapsed = start.elapsed();
        klog!(
            "Bundled {} in {:?} ({} compiled, {} cached)",
            self.entry,
            stats.elapsed,
            stats.compiled.len(),
            stats.reused
        );
        Ok(Bundle { code, map, stats })
    }

    /// Drop cached entries whose source changed or disappeared.
    async fn refresh(&mut self) {
        let known: Vec<(String, String)> = self
            .graph
            .modules()
            .map(|m| (m.id.clone(), m.fingerprint.clone()))
            .collect();
        for (id, old) in known {
            if !self.graph.contains(&id) {
                continue;
            }
            let current = tokio::fs::read(self.root.join(&id))
                .await
                .map(|bytes| fingerprint(&bytes))
                .ok();
            if current.as_deref() != Some(old.as_str()) {
                let dropped = self.graph.invalidate(&id);
                klog_debug!("ScriptBundler: {} changed, invalidated {:?}", id, dropped);
            }
        }
    }

    async fn compile(&self, id: &str, mode: Mode) -> std::result::Result<ModuleEntry, TransformError> {
        let path = self.root.join(id);
        let options = TransformOptions {
            source_maps: !mode.release,
            ..TransformOptions::new(STAGE, path.clone())
        };
        let source = tokio::fs::read(&path)
            .await
            .map_err(|e| options.error(format!("cannot read module: {}", e)))?;
        let compiled = self.compiler.transform(&source, &options).await?;

        let mut requires = std::collections::BTreeMap::new();
        for specifier in scan_imports(&String::from_utf8_lossy(&source)) {
            match resolve(&self.root, id, &specifier) {
                Resolution::Module(target) => {
                    requires.insert(specifier, target);
                }
                Resolution::External => {}
                Resolution::NotFound => {
                    return Err(options.error(format!("cannot resolve '{}'", specifier)));
                }
            }
        }

        klog_debug!("ScriptBundler: compiled {} ({} imports)", id, requires.len());
        Ok(ModuleEntry {
            id: id.to_string(),
            fingerprint: fingerprint(&source),
            source,
            compiled,
            requires,
        })
    }

    /// Bundle and write the output under the context's output root.
    ///
    /// Transform failures go through the mode's failure policy: while
    /// developing nothing is written and the previous bundle stays in place.
    pub async fn build(&mut self, ctx: &BuildContext) -> Result<Vec<Artifact>> {
        let bundle = match self.bundle(ctx.mode).await {
            Ok(bundle) => bundle,
            Err(err) => {
                ctx.escalate(vec![err])?;
                return Ok(Vec::new());
            }
        };

        let out = ctx.output_root().join(&self.output);
        write_file(&out, &bundle.code).await?;
        let mut artifacts = vec![Artifact::new(STAGE, out.clone(), bundle.code.len())];

        let map_path = PathBuf::from(format!("{}.map", out.display()));
        match &bundle.map {
            Some(map) => {
                write_file(&map_path, map).await?;
                artifacts.push(Artifact::new(STAGE, map_path, map.len()));
            }
            None => {
                if tokio::fs::try_exists(&map_path).await.unwrap_or(false) {
                    tokio::fs::remove_file(&map_path).await?;
                }
            }
        }
        Ok(artifacts)
    }
}

/// The `scripts` task. Shares its bundler with the watch subscription so
/// both see the same cache.
pub struct ScriptsTask {
    bundler: Arc<Mutex<ScriptBundler>>,
}

impl ScriptsTask {
    pub fn new(bundler: Arc<Mutex<ScriptBundler>>) -> Self {
        Self { bundler }
    }
}

impl TaskAction for ScriptsTask {
    fn run<'a>(
        &'a self,
        ctx: &'a BuildContext,
    ) -> futures::future::BoxFuture<'a, Result<Vec<Artifact>>> {
        Box::pin(async move { self.bundler.lock().await.build(ctx).await })
    }
}

/// Re-bundle whenever a tracked module changes.
///
/// Events queued while a pass runs are drained together, so a burst costs
/// one pass. A failed pass logs and leaves the last good bundle in place;
/// while the bundler is in a failed state, from this subscription or from
/// the `scripts` task, any event retries.
pub fn spawn_watch(
    bundler: Arc<Mutex<ScriptBundler>>,
    ctx: Arc<BuildContext>,
    mut events: mpsc::UnboundedReceiver<WatchEvent>,
    reload: LiveReload,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(first) = events.recv().await {
            let mut batch = vec![first];
            while let Ok(more) = events.try_recv() {
                batch.push(more);
            }

            let mut guard = bundler.lock().await;
            let relevant = guard.failed() || batch.iter().any(|e| guard.tracks(&e.path));
            if !relevant {
                continue;
            }

            match guard.build(&ctx).await {
                Ok(_) if guard.failed() => {}
                Ok(_) => {
                    reload.notify(ReloadKind::FullReload);
                }
                Err(e) => klog_error!("Script bundle failed: {}", e),
            }
        }
        klog_debug!("ScriptBundler: watch subscription closed");
    })
}
