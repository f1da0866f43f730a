use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};

use super::{read_source, sources, write_outputs, Output};
use crate::core::task::{Artifact, TaskAction};
use crate::mode::BuildContext;
use crate::transform::{Transform, TransformOptions};
use crate::Result;

const STAGE: &str = "markup";

/// Runs every markup file through the markup minifier. Only the output
/// root depends on the mode.
pub struct MarkupStage {
    minifier: Arc<dyn Transform>,
}

impl MarkupStage {
    pub fn new(minifier: Arc<dyn Transform>) -> Self {
        Self { minifier }
    }
}

impl TaskAction for MarkupStage {
    fn run<'a>(&'a self, ctx: &'a BuildContext) -> BoxFuture<'a, Result<Vec<Artifact>>> {
        async move {
            let source_root = &ctx.layout.source;
            let files = sources(source_root, &ctx.config.markup.patterns, &[]).await?;

            let mut outputs = Vec::with_capacity(files.len());
            let mut errors = Vec::new();
            for file in files {
                let options = TransformOptions::new(STAGE, file.clone());
                let result = match read_source(&options).await {
                    Ok(source) => self.minifier.transform(&source, &options).await,
                    Err(e) => Err(e),
                };
                match result {
                    Ok(bytes) => {
                        let rel = file.strip_prefix(source_root).unwrap_or(&file);
                        outputs.push(Output::new(ctx.output_root().join(rel), bytes));
                    }
                    Err(e) => errors.push(e),
                }
            }

            ctx.escalate(errors)?;
            write_outputs(STAGE, outputs).await
        }
        .boxed()
    }
}
