use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};

use super::{read_source, write_outputs, Output};
use crate::core::task::{Artifact, TaskAction};
use crate::error::TransformError;
use crate::mode::BuildContext;
use crate::sourcemap::{style_trailer, SourceMap};
use crate::transform::{Transform, TransformOptions};
use crate::util::relative_slash;
use crate::Result;

const STAGE: &str = "styles";

/// Preprocesses the entry stylesheets.
///
/// Dev output carries a sidecar map; release output is minified and has
/// none.
pub struct StyleStage {
    preprocessor: Arc<dyn Transform>,
    minifier: Arc<dyn Transform>,
}

impl StyleStage {
    pub fn new(preprocessor: Arc<dyn Transform>, minifier: Arc<dyn Transform>) -> Self {
        Self {
            preprocessor,
            minifier,
        }
    }

    fn output_path(ctx: &BuildContext, entry: &str) -> PathBuf {
        let stem = Path::new(entry)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| entry.to_string());
        ctx.output_root()
            .join(&ctx.config.styles.output_dir)
            .join(format!("{}.css", stem))
    }

    async fn compile(
        &self,
        ctx: &BuildContext,
        entry: &str,
    ) -> std::result::Result<Vec<Output>, TransformError> {
        let source_path = ctx.layout.source.join(entry);
        let mut include_paths: Vec<PathBuf> = source_path
            .parent()
            .map(|p| vec![p.to_path_buf()])
            .unwrap_or_default();
        include_paths.extend(
            ctx.config
                .styles
                .include_paths
                .iter()
                .map(|p| ctx.layout.root.join(p)),
        );
        let options = TransformOptions {
            source_maps: !ctx.mode.release,
            include_paths,
            ..TransformOptions::new(STAGE, source_path.clone())
        };

        let source = read_source(&options).await?;
        let mut css = self.preprocessor.transform(&source, &options).await?;
        let out = Self::output_path(ctx, entry);

        if ctx.mode.release {
            css = self.minifier.transform(&css, &options).await?;
            return Ok(vec![Output::new(out, css)]);
        }

        let file = out
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let map_name = format!("{}.map", file);
        let mut map = SourceMap::new(&file);
        let source_name = relative_slash(&source_path, &ctx.layout.source)
            .unwrap_or_else(|| entry.to_string());
        map.add_source(&source_name, &source);
        let map_bytes = map.to_bytes().map_err(|e| options.error(e.to_string()))?;
        css.extend_from_slice(style_trailer(&map_name).as_bytes());

        let map_path = out.with_file_name(&map_name);
        Ok(vec![Output::new(out, css), Output::new(map_path, map_bytes)])
    }
}

impl TaskAction for StyleStage {
    fn run<'a>(&'a self, ctx: &'a BuildContext) -> BoxFuture<'a, Result<Vec<Artifact>>> {
        async move {
            let mut outputs = Vec::new();
            let mut errors = Vec::new();
            for entry in &ctx.config.styles.entries {
                match self.compile(ctx, entry).await {
                    Ok(mut out) => outputs.append(&mut out),
                    Err(e) => errors.push(e),
                }
            }
            ctx.escalate(errors)?;
            write_outputs(STAGE, outputs).await
        }
        .boxed()
    }
}
