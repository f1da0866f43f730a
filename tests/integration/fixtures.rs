//! Test fixtures for integration tests.
//!
//! Provides helpers for:
//! - Creating temporary projects with a typical `app/` tree
//! - Fake transforms that count calls or fail on demand
//! - Snapshotting an output root

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use futures::future::{BoxFuture, FutureExt};
use tempfile::TempDir;
use walkdir::WalkDir;

use kiln::config::Config;
use kiln::transform::{Toolchain, Transform, TransformOptions, TransformResult};
use kiln::Project;

/// A project in a temporary directory.
pub struct TestProject {
    /// Keeps the directory alive.
    pub temp_dir: TempDir,
    /// Project root.
    pub root: PathBuf,
}

impl TestProject {
    /// An empty project.
    pub fn empty() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let root = temp_dir.path().to_path_buf();
        Self { temp_dir, root }
    }

    /// A project with markup, styles, a small script graph, an image,
    /// top-level static files and one vendored package.
    pub fn new() -> Self {
        let project = Self::empty();
        project.write("app/index.html", "<html>\n  <body>\n    <p>Hello</p>\n  </body>\n</html>\n");
        project.write("app/styles/main.scss", "body {\n  color: #333;\n}\n");
        project.write(
            "app/scripts/main.js",
            "import toggle from './toggle';\nimport $ from 'jquery';\ntoggle($('.menu'));\n",
        );
        project.write(
            "app/scripts/toggle.js",
            "const util = require('./util');\nmodule.exports = function (el) { util.flip(el); };\n",
        );
        project.write("app/scripts/util.js", "exports.flip = function (el) { el.toggleClass('open'); };\n");
        project.write("app/images/logo.png", "\u{89}PNG logo bytes");
        project.write("app/robots.txt", "User-agent: *\n");
        project.write("app/.htaccess", "Options -Indexes\n");
        project.write("node_modules/jquery/dist/jquery.js", "/* jquery */\n");
        project
    }

    pub fn path(&self, rel: &str) -> PathBuf {
        self.root.join(rel)
    }

    pub fn write(&self, rel: &str, content: &str) {
        let path = self.path(rel);
        std::fs::create_dir_all(path.parent().unwrap()).expect("Failed to create parent");
        std::fs::write(path, content).expect("Failed to write file");
    }

    pub fn read(&self, rel: &str) -> Vec<u8> {
        std::fs::read(self.path(rel)).unwrap_or_else(|e| panic!("read {}: {}", rel, e))
    }

    pub fn exists(&self, rel: &str) -> bool {
        self.path(rel).exists()
    }

    /// Defaults plus the vendored jquery build.
    pub fn config(&self) -> Config {
        let mut config = Config::default();
        config.vendor.patterns = vec!["jquery/dist/*.js".to_string()];
        config
    }

    pub fn project(&self, config: Config, toolchain: Toolchain) -> Project {
        Project::new(&self.root, config, toolchain)
    }

    /// Every file under `rel`, keyed by its path relative to `rel`.
    pub fn snapshot(&self, rel: &str) -> BTreeMap<String, Vec<u8>> {
        let base = self.path(rel);
        WalkDir::new(&base)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| {
                let key = e
                    .path()
                    .strip_prefix(&base)
                    .unwrap()
                    .to_string_lossy()
                    .replace('\\', "/");
                (key, std::fs::read(e.path()).unwrap())
            })
            .collect()
    }
}

/// Identity transform that records every path it is called for.
#[derive(Clone, Default)]
pub struct Recording {
    pub calls: Arc<Mutex<Vec<PathBuf>>>,
}

impl Recording {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn take(&self) -> Vec<PathBuf> {
        std::mem::take(&mut *self.calls.lock().unwrap())
    }

    /// Recorded paths relative to `base`, sorted.
    pub fn take_relative(&self, base: &Path) -> Vec<String> {
        let mut rel: Vec<String> = self
            .take()
            .iter()
            .map(|p| p.strip_prefix(base).unwrap().to_string_lossy().replace('\\', "/"))
            .collect();
        rel.sort();
        rel
    }
}

impl Transform for Recording {
    fn name(&self) -> String {
        "recording".to_string()
    }

    fn transform<'a>(
        &'a self,
        source: &'a [u8],
        options: &'a TransformOptions,
    ) -> BoxFuture<'a, TransformResult> {
        self.calls.lock().unwrap().push(options.path.clone());
        async move { Ok(source.to_vec()) }.boxed()
    }
}

/// Identity transform that rejects any source containing `marker`.
pub struct FailOn {
    pub marker: &'static str,
    pub calls: Arc<AtomicUsize>,
}

impl FailOn {
    pub fn new(marker: &'static str) -> Self {
        Self {
            marker,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl Transform for FailOn {
    fn name(&self) -> String {
        format!("fail-on {}", self.marker)
    }

    fn transform<'a>(
        &'a self,
        source: &'a [u8],
        options: &'a TransformOptions,
    ) -> BoxFuture<'a, TransformResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        async move {
            if String::from_utf8_lossy(source).contains(self.marker) {
                Err(options.error(format!("syntax error near {}", self.marker)))
            } else {
                Ok(source.to_vec())
            }
        }
        .boxed()
    }
}

/// Built-in toolchain with the style preprocessor swapped out.
pub fn with_style_preprocessor(preprocessor: Arc<dyn Transform>) -> Toolchain {
    Toolchain {
        style_preprocessor: preprocessor,
        ..Toolchain::builtin()
    }
}

/// Built-in toolchain with the script compiler swapped out.
pub fn with_script_compiler(compiler: Arc<dyn Transform>) -> Toolchain {
    Toolchain {
        script_compiler: compiler,
        ..Toolchain::builtin()
    }
}
