//! Transform stages.
//!
//! Each stage is a [`TaskAction`](crate::core::task::TaskAction) that reads
//! its sources, runs them through its transform chain for the current mode
//! and writes under the mode's output root. Stages first compute every
//! output, then apply the mode's failure policy, then write: a failing
//! release build never leaves a partial artifact behind, and a failing dev
//! rebuild leaves the previous artifact of the failing file in place.

mod clean;
mod copy;
mod image;
mod lint;
mod markup;
mod style;

use std::path::{Path, PathBuf};

use crate::core::task::Artifact;
use crate::error::TransformError;
use crate::transform::TransformOptions;
use crate::util::{blocking, collect_files, write_file};
use crate::{klog_debug, Result};

pub use clean::CleanStage;
pub use copy::{StaticCopyStage, VendorStage};
pub use image::{ImageCache, ImageStage};
pub use lint::LintStage;
pub use markup::MarkupStage;
pub use style::StyleStage;

/// A computed output waiting to be written.
#[derive(Debug, Clone)]
pub(crate) struct Output {
    pub path: PathBuf,
    pub bytes: Vec<u8>,
}

impl Output {
    pub fn new(path: PathBuf, bytes: Vec<u8>) -> Self {
        Self { path, bytes }
    }
}

/// Files under `root` matching `patterns`, walked off the async runtime.
pub(crate) async fn sources(
    root: &Path,
    patterns: &[String],
    exclude: &[String],
) -> Result<Vec<PathBuf>> {
    let root = root.to_path_buf();
    let patterns = patterns.to_vec();
    let exclude = exclude.to_vec();
    blocking(move || collect_files(&root, &patterns, &exclude)).await
}

/// Read a source asset, turning I/O failures into a [`TransformError`] for
/// that file.
pub(crate) async fn read_source(
    options: &TransformOptions,
) -> std::result::Result<Vec<u8>, TransformError> {
    tokio::fs::read(&options.path)
        .await
        .map_err(|e| options.error(format!("cannot read: {}", e)))
}

pub(crate) async fn write_outputs(stage: &str, outputs: Vec<Output>) -> Result<Vec<Artifact>> {
    let mut artifacts = Vec::with_capacity(outputs.len());
    for output in outputs {
        write_file(&output.path, &output.bytes).await?;
        klog_debug!("{}: wrote {} ({} bytes)", stage, output.path.display(), output.bytes.len());
        artifacts.push(Artifact::new(stage, output.path, output.bytes.len()));
    }
    Ok(artifacts)
}
