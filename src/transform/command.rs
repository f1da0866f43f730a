use std::process::Stdio;
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use super::{Transform, TransformOptions, TransformResult};
use crate::config::CommandSpec;
use crate::klog_trace;

/// Default upper bound for one external transform invocation.
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Runs an external program: source on stdin, result on stdout.
///
/// A non-zero exit status is a [`crate::TransformError`] carrying the
/// program's stderr (or stdout when stderr is empty).
#[derive(Debug, Clone)]
pub struct CommandTransform {
    spec: CommandSpec,
    timeout: Duration,
}

impl CommandTransform {
    pub fn new(spec: CommandSpec) -> Self {
        Self {
            spec,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn args(&self, options: &TransformOptions) -> Vec<String> {
        let file = options.path.to_string_lossy();
        self.spec
            .args
            .iter()
            .map(|arg| arg.replace("{file}", &file))
            .collect()
    }

    async fn run(&self, source: &[u8], options: &TransformOptions) -> TransformResult {
        let include_paths = std::env::join_paths(&options.include_paths)
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_default();

        klog_trace!(
            "CommandTransform: {} on {}",
            self.name(),
            options.path.display()
        );

        let mut child = Command::new(&self.spec.program)
            .args(self.args(options))
            .env("KILN_SOURCE_PATH", &options.path)
            .env("KILN_SOURCE_MAPS", if options.source_maps { "1" } else { "0" })
            .env("KILN_INCLUDE_PATHS", include_paths)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| options.error(format!("failed to start {}: {}", self.spec.program, e)))?;

        // Feed stdin from its own task so a chatty child cannot deadlock us.
        if let Some(mut stdin) = child.stdin.take() {
            let input = source.to_vec();
            tokio::spawn(async move {
                let _ = stdin.write_all(&input).await;
            });
        }

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| options.error(format!("timed out after {:?}", self.timeout)))?
            .map_err(|e| options.error(e.to_string()))?;

        if output.status.success() {
            return Ok(output.stdout);
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        let message = if stderr.trim().is_empty() {
            let stdout = String::from_utf8_lossy(&output.stdout);
            if stdout.trim().is_empty() {
                format!(
                    "{} exited with code {}",
                    self.spec.program,
                    output.status.code().unwrap_or(-1)
                )
            } else {
                stdout.trim().to_string()
            }
        } else {
            stderr.trim().to_string()
        };
        Err(options.error(message))
    }
}

impl Transform for CommandTransform {
    fn name(&self) -> String {
        if self.spec.args.is_empty() {
            self.spec.program.clone()
        } else {
            format!("{} {}", self.spec.program, self.spec.args.join(" "))
        }
    }

    fn transform<'a>(
        &'a self,
        source: &'a [u8],
        options: &'a TransformOptions,
    ) -> BoxFuture<'a, TransformResult> {
        self.run(source, options).boxed()
    }
}
