//! Image optimization with a persistent, content-addressed cache.

use std::path::PathBuf;
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};

use super::{read_source, sources, write_outputs, Output};
use crate::core::task::{Artifact, TaskAction};
use crate::mode::BuildContext;
use crate::transform::{Transform, TransformOptions};
use crate::util::{fingerprint, write_file};
use crate::{klog_debug, klog_warn, Result};

const STAGE: &str = "images";

/// Optimized images keyed by the fingerprint of the original bytes and the
/// optimizer identity. Shared by dev and release runs.
#[derive(Debug, Clone)]
pub struct ImageCache {
    dir: PathBuf,
}

impl ImageCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn key(source: &[u8], optimizer: &str) -> String {
        let mut keyed = Vec::with_capacity(source.len() + optimizer.len() + 1);
        keyed.extend_from_slice(optimizer.as_bytes());
        keyed.push(0);
        keyed.extend_from_slice(source);
        fingerprint(&keyed)
    }

    pub async fn get(&self, key: &str) -> Option<Vec<u8>> {
        tokio::fs::read(self.dir.join(key)).await.ok()
    }

    pub async fn put(&self, key: &str, bytes: &[u8]) -> Result<()> {
        write_file(&self.dir.join(key), bytes).await
    }
}

pub struct ImageStage {
    optimizer: Arc<dyn Transform>,
}

impl ImageStage {
    pub fn new(optimizer: Arc<dyn Transform>) -> Self {
        Self { optimizer }
    }
}

impl TaskAction for ImageStage {
    fn run<'a>(&'a self, ctx: &'a BuildContext) -> BoxFuture<'a, Result<Vec<Artifact>>> {
        async move {
            let cache = ImageCache::new(ctx.layout.cache.join("images"));
            let optimizer = self.optimizer.name();
            let source_root = &ctx.layout.source;
            let files = sources(source_root, &ctx.config.images.patterns, &[]).await?;

            let mut outputs = Vec::with_capacity(files.len());
            let mut errors = Vec::new();
            let mut hits = 0usize;
            for file in files {
                let options = TransformOptions::new(STAGE, file.clone());
                let source = match read_source(&options).await {
                    Ok(source) => source,
                    Err(e) => {
                        errors.push(e);
                        continue;
                    }
                };

                let key = ImageCache::key(&source, &optimizer);
                let bytes = match cache.get(&key).await {
                    Some(bytes) => {
                        hits += 1;
                        bytes
                    }
                    None => match self.optimizer.transform(&source, &options).await {
                        Ok(bytes) => {
                            // A cache that cannot be written only costs a
                            // re-optimization next time.
                            if let Err(e) = cache.put(&key, &bytes).await {
                                klog_warn!("Image cache write failed for {}: {}", file.display(), e);
                            }
                            bytes
                        }
                        Err(e) => {
                            errors.push(e);
                            continue;
                        }
                    },
                };

                let rel = file.strip_prefix(source_root).unwrap_or(&file);
                outputs.push(Output::new(ctx.output_root().join(rel), bytes));
            }

            klog_debug!("images: {} of {} served from cache", hits, outputs.len());
            ctx.escalate(errors)?;
            write_outputs(STAGE, outputs).await
        }
        .boxed()
    }
}
