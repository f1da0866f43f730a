use futures::future::{self, BoxFuture, FutureExt};

use super::{Transform, TransformOptions, TransformResult};

/// Returns its input unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct Identity;

impl Transform for Identity {
    fn name(&self) -> String {
        "identity".to_string()
    }

    fn transform<'a>(
        &'a self,
        source: &'a [u8],
        _options: &'a TransformOptions,
    ) -> BoxFuture<'a, TransformResult> {
        future::ready(Ok(source.to_vec())).boxed()
    }
}

/// Line-level minifier: strips surrounding whitespace and drops blank lines.
///
/// Line breaks are kept, so statement boundaries in scripts survive.
#[derive(Debug, Clone, Copy, Default)]
pub struct TrimWhitespace;

impl Transform for TrimWhitespace {
    fn name(&self) -> String {
        "trim-whitespace".to_string()
    }

    fn transform<'a>(
        &'a self,
        source: &'a [u8],
        options: &'a TransformOptions,
    ) -> BoxFuture<'a, TransformResult> {
        let result = match std::str::from_utf8(source) {
            Ok(text) => {
                let mut out = text
                    .lines()
                    .map(str::trim)
                    .filter(|line| !line.is_empty())
                    .collect::<Vec<_>>()
                    .join("\n");
                if !out.is_empty() {
                    out.push('\n');
                }
                Ok(out.into_bytes())
            }
            Err(e) => Err(options.error(format!("not valid UTF-8: {}", e))),
        };
        future::ready(result).boxed()
    }
}
