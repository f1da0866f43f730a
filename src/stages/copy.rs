//! Verbatim copies: top-level static files and vendored packages.

use std::path::Path;

use futures::future::{BoxFuture, FutureExt};

use super::{sources, write_outputs, Output};
use crate::core::task::{Artifact, TaskAction};
use crate::mode::BuildContext;
use crate::{klog_debug, Result};

async fn copy_tree(
    stage: &str,
    from: &Path,
    patterns: &[String],
    exclude: &[String],
    to: &Path,
) -> Result<Vec<Artifact>> {
    let files = sources(from, patterns, exclude).await?;
    let mut outputs = Vec::with_capacity(files.len());
    for file in files {
        let bytes = tokio::fs::read(&file).await?;
        let rel = file.strip_prefix(from).unwrap_or(&file);
        outputs.push(Output::new(to.join(rel), bytes));
    }
    write_outputs(stage, outputs).await
}

/// Copies the top-level files of the source root, dot files included.
/// Markup belongs to the markup stage and is left out.
#[derive(Debug, Default)]
pub struct StaticCopyStage;

impl TaskAction for StaticCopyStage {
    fn run<'a>(&'a self, ctx: &'a BuildContext) -> BoxFuture<'a, Result<Vec<Artifact>>> {
        async move {
            copy_tree(
                "copy",
                &ctx.layout.source,
                &["*".to_string()],
                &["*.html".to_string()],
                ctx.output_root(),
            )
            .await
        }
        .boxed()
    }
}

/// Copies configured files out of `node_modules` into `<output root>/modules`.
#[derive(Debug, Default)]
pub struct VendorStage;

impl TaskAction for VendorStage {
    fn run<'a>(&'a self, ctx: &'a BuildContext) -> BoxFuture<'a, Result<Vec<Artifact>>> {
        async move {
            let patterns = &ctx.config.vendor.patterns;
            if patterns.is_empty() {
                klog_debug!("vendor: no patterns configured");
                return Ok(Vec::new());
            }
            copy_tree(
                "vendor",
                &ctx.layout.node_modules,
                patterns,
                &[],
                &ctx.output_root().join("modules"),
            )
            .await
        }
        .boxed()
    }
}
