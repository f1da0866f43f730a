use futures::future::{BoxFuture, FutureExt};

use crate::core::task::{Artifact, TaskAction};
use crate::mode::BuildContext;
use crate::{klog_debug, Result};

/// Entries of the distribution root that survive a clean.
const PRESERVED: &[&str] = &[".git"];

/// Removes the staging root and empties the distribution root.
#[derive(Debug, Default)]
pub struct CleanStage;

impl TaskAction for CleanStage {
    fn run<'a>(&'a self, ctx: &'a BuildContext) -> BoxFuture<'a, Result<Vec<Artifact>>> {
        async move {
            let staging = &ctx.layout.staging;
            if tokio::fs::try_exists(staging).await? {
                tokio::fs::remove_dir_all(staging).await?;
                klog_debug!("clean: removed {}", staging.display());
            }

            let dist = &ctx.layout.dist;
            if tokio::fs::try_exists(dist).await? {
                let mut entries = tokio::fs::read_dir(dist).await?;
                while let Some(entry) = entries.next_entry().await? {
                    let name = entry.file_name();
                    if PRESERVED.iter().any(|p| name.as_os_str() == *p) {
                        continue;
                    }
                    let path = entry.path();
                    if entry.file_type().await?.is_dir() {
                        tokio::fs::remove_dir_all(&path).await?;
                    } else {
                        tokio::fs::remove_file(&path).await?;
                    }
                }
                klog_debug!("clean: emptied {}", dist.display());
            }
            Ok(Vec::new())
        }
        .boxed()
    }
}
