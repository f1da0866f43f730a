//! Sidecar source-map metadata written next to dev-mode artifacts.

use serde::{Deserialize, Serialize};

use crate::Result;

/// Version 3 source map carrying sources and their contents.
///
/// Transforms are opaque to kiln, so `mappings` stays empty; browsers still
/// list the original sources in their devtools.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SourceMap {
    pub version: u8,
    pub file: String,
    pub sources: Vec<String>,
    pub sources_content: Vec<String>,
    pub names: Vec<String>,
    pub mappings: String,
}

impl SourceMap {
    pub fn new(file: &str) -> Self {
        Self {
            version: 3,
            file: file.to_string(),
            sources: Vec::new(),
            sources_content: Vec::new(),
            names: Vec::new(),
            mappings: String::new(),
        }
    }

    pub fn add_source(&mut self, name: &str, content: &[u8]) {
        self.sources.push(name.to_string());
        self.sources_content
            .push(String::from_utf8_lossy(content).into_owned());
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}

/// Trailer linking a script to its map.
pub fn script_trailer(map_name: &str) -> String {
    format!("\n//# sourceMappingURL={}\n", map_name)
}

/// Trailer linking a stylesheet to its map.
pub fn style_trailer(map_name: &str) -> String {
    format!("\n/*# sourceMappingURL={} */\n", map_name)
}
