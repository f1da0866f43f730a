use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};

use super::{read_source, sources};
use crate::core::task::{Artifact, TaskAction};
use crate::mode::BuildContext;
use crate::transform::{Transform, TransformOptions};
use crate::{klog_debug, Result};

const STAGE: &str = "lint";

/// Runs the linter over every script source. Writes nothing; findings go
/// through the mode's failure policy.
pub struct LintStage {
    linter: Option<Arc<dyn Transform>>,
}

impl LintStage {
    pub fn new(linter: Option<Arc<dyn Transform>>) -> Self {
        Self { linter }
    }
}

impl TaskAction for LintStage {
    fn run<'a>(&'a self, ctx: &'a BuildContext) -> BoxFuture<'a, Result<Vec<Artifact>>> {
        async move {
            let Some(linter) = &self.linter else {
                klog_debug!("lint: no linter configured");
                return Ok(Vec::new());
            };

            let files = sources(&ctx.layout.source, &ctx.config.scripts.lint, &[]).await?;
            let mut errors = Vec::new();
            for file in &files {
                let options = TransformOptions::new(STAGE, file.clone());
                let checked = match read_source(&options).await {
                    Ok(source) => linter.transform(&source, &options).await.map(|_| ()),
                    Err(e) => Err(e),
                };
                if let Err(e) = checked {
                    errors.push(e);
                }
            }
            klog_debug!("lint: {} file(s), {} with findings", files.len(), errors.len());
            ctx.escalate(errors)?;
            Ok(Vec::new())
        }
        .boxed()
    }
}
