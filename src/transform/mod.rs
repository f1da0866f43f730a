//! External transform collaborators.
//!
//! Every preprocessor, compiler, minifier, optimizer and linter is reached
//! through the [`Transform`] trait: source bytes plus options in,
//! transformed bytes or a [`TransformError`] out. The core never depends on
//! what a transform does internally.

mod builtin;
mod command;

use std::path::PathBuf;
use std::sync::Arc;

use futures::future::BoxFuture;

use crate::config::{CommandSpec, Config};
use crate::error::TransformError;

pub use builtin::{Identity, TrimWhitespace};
pub use command::CommandTransform;

/// Per-invocation options.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransformOptions {
    /// Stage name, used to label errors.
    pub stage: String,
    /// Path of the asset being transformed.
    pub path: PathBuf,
    /// Whether the caller will attach source-map metadata.
    pub source_maps: bool,
    /// Extra lookup directories (stylesheet includes).
    pub include_paths: Vec<PathBuf>,
}

impl TransformOptions {
    pub fn new(stage: &str, path: impl Into<PathBuf>) -> Self {
        Self {
            stage: stage.to_string(),
            path: path.into(),
            ..Default::default()
        }
    }

    pub fn error(&self, message: impl Into<String>) -> TransformError {
        TransformError::new(&self.stage, self.path.clone(), message)
    }
}

pub type TransformResult = std::result::Result<Vec<u8>, TransformError>;

/// A pure function from source bytes to output bytes.
pub trait Transform: Send + Sync {
    /// Stable identity, part of memoization keys.
    fn name(&self) -> String;

    fn transform<'a>(
        &'a self,
        source: &'a [u8],
        options: &'a TransformOptions,
    ) -> BoxFuture<'a, TransformResult>;
}

/// The set of collaborators a project builds with.
#[derive(Clone)]
pub struct Toolchain {
    pub style_preprocessor: Arc<dyn Transform>,
    pub style_minifier: Arc<dyn Transform>,
    pub script_compiler: Arc<dyn Transform>,
    pub script_minifier: Arc<dyn Transform>,
    pub markup_minifier: Arc<dyn Transform>,
    pub image_optimizer: Arc<dyn Transform>,
    /// No linter means the lint task has nothing to check.
    pub linter: Option<Arc<dyn Transform>>,
}

impl Toolchain {
    /// Built-in defaults: identity for preprocessing and compiling,
    /// whitespace trimming for minifying, no linter.
    pub fn builtin() -> Self {
        Self {
            style_preprocessor: Arc::new(Identity),
            style_minifier: Arc::new(TrimWhitespace),
            script_compiler: Arc::new(Identity),
            script_minifier: Arc::new(TrimWhitespace),
            markup_minifier: Arc::new(TrimWhitespace),
            image_optimizer: Arc::new(Identity),
            linter: None,
        }
    }

    /// Configured commands where present, built-ins otherwise.
    pub fn from_config(config: &Config) -> Self {
        let builtin = Self::builtin();
        let pick = |spec: &Option<CommandSpec>, fallback: Arc<dyn Transform>| match spec {
            Some(spec) => Arc::new(CommandTransform::new(spec.clone())) as Arc<dyn Transform>,
            None => fallback,
        };
        Self {
            style_preprocessor: pick(&config.styles.preprocessor, builtin.style_preprocessor),
            style_minifier: pick(&config.styles.minifier, builtin.style_minifier),
            script_compiler: pick(&config.scripts.compiler, builtin.script_compiler),
            script_minifier: pick(&config.scripts.minifier, builtin.script_minifier),
            markup_minifier: pick(&config.markup.minifier, builtin.markup_minifier),
            image_optimizer: pick(&config.images.optimizer, builtin.image_optimizer),
            linter: config
                .scripts
                .linter
                .clone()
                .map(|spec| Arc::new(CommandTransform::new(spec)) as Arc<dyn Transform>),
        }
    }
}

impl std::fmt::Debug for Toolchain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Toolchain")
            .field("style_preprocessor", &self.style_preprocessor.name())
            .field("script_compiler", &self.script_compiler.name())
            .field("image_optimizer", &self.image_optimizer.name())
            .field("linter", &self.linter.as_ref().map(|l| l.name()))
            .finish()
    }
}
