//! Build mode and the per-run context handed to every stage.
//!
//! The mode is fixed once at startup and never mutated. Stages receive it
//! through [`BuildContext`] instead of reading process-wide flags.

use std::path::{Path, PathBuf};

use crate::config::{Config, PathsConfig};
use crate::error::TransformError;
use crate::{klog_error, klog_warn, Error, Result};

/// Which transform chain the stages select.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Mode {
    /// Keep the process alive and rebuild on change.
    pub watch: bool,
    /// Minify, drop source maps, write to the distribution root.
    pub release: bool,
}

impl Mode {
    pub const fn develop() -> Self {
        Self {
            watch: true,
            release: false,
        }
    }

    pub const fn release() -> Self {
        Self {
            watch: false,
            release: true,
        }
    }

    pub fn label(&self) -> &'static str {
        match (self.watch, self.release) {
            (_, true) => "release",
            (true, false) => "develop",
            (false, false) => "dev",
        }
    }
}

/// Absolute project directories.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    pub root: PathBuf,
    pub source: PathBuf,
    pub staging: PathBuf,
    pub dist: PathBuf,
    pub cache: PathBuf,
    pub node_modules: PathBuf,
}

impl Layout {
    /// An existing `root` is canonicalized first, so paths reported by
    /// watch backends that resolve symlinks still fall under `source`.
    pub fn new(root: &Path, paths: &PathsConfig) -> Self {
        let root = std::fs::canonicalize(root).unwrap_or_else(|_| root.to_path_buf());
        let root = root.as_path();
        Self {
            root: root.to_path_buf(),
            source: root.join(&paths.source),
            staging: root.join(&paths.staging),
            dist: root.join(&paths.dist),
            cache: root.join(&paths.cache),
            node_modules: root.join(&paths.node_modules),
        }
    }
}

/// Immutable context shared by every task of one run.
#[derive(Debug, Clone)]
pub struct BuildContext {
    pub mode: Mode,
    pub layout: Layout,
    pub config: Config,
}

impl BuildContext {
    pub fn new(mode: Mode, root: &Path, config: Config) -> Self {
        Self {
            mode,
            layout: Layout::new(root, &config.paths),
            config,
        }
    }

    /// Staging root while developing, distribution root in release.
    pub fn output_root(&self) -> &Path {
        if self.mode.release {
            &self.layout.dist
        } else {
            &self.layout.staging
        }
    }

    /// Apply the mode's failure policy to the transform errors of one stage.
    ///
    /// Release builds turn any error into a failure. Otherwise the errors are
    /// logged and the stage carries on with whatever it produced.
    pub fn escalate(&self, mut errors: Vec<TransformError>) -> Result<()> {
        if errors.is_empty() {
            return Ok(());
        }
        if self.mode.release {
            for err in &errors {
                klog_error!("{}", err);
            }
            if errors.len() == 1 {
                if let Some(err) = errors.pop() {
                    return Err(Error::Transform(err));
                }
            }
            return Err(Error::TransformFailures(errors));
        }
        for err in &errors {
            klog_warn!("{} (keeping previous output)", err);
        }
        Ok(())
    }
}
