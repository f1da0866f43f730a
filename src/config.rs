use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::{klog_debug, Error, Result};

/// File name looked up in the project root when no `--config` is given.
pub const CONFIG_FILE: &str = "kiln.toml";

/// An external program used as a transform collaborator.
///
/// The source bytes are written to the program's stdin and the transformed
/// bytes are read back from stdout. Any `{file}` in `args` is replaced with
/// the path of the asset being transformed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PathsConfig {
    pub source: PathBuf,
    pub staging: PathBuf,
    pub dist: PathBuf,
    pub cache: PathBuf,
    pub node_modules: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            source: PathBuf::from("app"),
            staging: PathBuf::from(".tmp"),
            dist: PathBuf::from("dist"),
            cache: PathBuf::from(".kiln-cache"),
            node_modules: PathBuf::from("node_modules"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct StylesConfig {
    /// Entry stylesheets relative to the source root.
    pub entries: Vec<String>,
    /// Output directory relative to the output root.
    pub output_dir: String,
    /// Extra include paths handed to the preprocessor.
    pub include_paths: Vec<String>,
    pub preprocessor: Option<CommandSpec>,
    pub minifier: Option<CommandSpec>,
}

impl Default for StylesConfig {
    fn default() -> Self {
        Self {
            entries: vec!["styles/main.scss".to_string()],
            output_dir: "styles".to_string(),
            include_paths: Vec::new(),
            preprocessor: None,
            minifier: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ScriptsConfig {
    /// Bundle entry point relative to the source root.
    pub entry: String,
    /// Bundle path relative to the output root.
    pub output: String,
    /// Sources checked by the lint task, relative to the source root.
    pub lint: Vec<String>,
    pub compiler: Option<CommandSpec>,
    pub minifier: Option<CommandSpec>,
    pub linter: Option<CommandSpec>,
}

impl Default for ScriptsConfig {
    fn default() -> Self {
        Self {
            entry: "scripts/main.js".to_string(),
            output: "scripts/main.js".to_string(),
            lint: vec!["scripts/**/*.js".to_string()],
            compiler: None,
            minifier: None,
            linter: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct MarkupConfig {
    pub patterns: Vec<String>,
    pub minifier: Option<CommandSpec>,
}

impl Default for MarkupConfig {
    fn default() -> Self {
        Self {
            patterns: vec!["**/*.html".to_string()],
            minifier: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ImagesConfig {
    pub patterns: Vec<String>,
    pub optimizer: Option<CommandSpec>,
}

impl Default for ImagesConfig {
    fn default() -> Self {
        Self {
            patterns: vec!["images/**/*".to_string()],
            optimizer: None,
        }
    }
}

/// Files copied out of `node_modules` into `<output root>/modules`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct VendorConfig {
    pub patterns: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub preview_port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
            preview_port: 3001,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RouteConfig {
    /// Glob matched against the changed path relative to the source root.
    pub pattern: String,
    pub tasks: Vec<String>,
}

impl RouteConfig {
    fn new(pattern: &str, tasks: &[&str]) -> Self {
        Self {
            pattern: pattern.to_string(),
            tasks: tasks.iter().map(|t| t.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct WatchConfig {
    pub debounce_ms: u64,
    pub routes: Vec<RouteConfig>,
}

impl WatchConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 150,
            // Script sources are followed by the bundler itself; the route
            // only has to re-run the linter.
            routes: vec![
                RouteConfig::new("**/*.html", &["markup"]),
                RouteConfig::new("styles/**/*.scss", &["styles"]),
                RouteConfig::new("styles/**/*.css", &["styles"]),
                RouteConfig::new("scripts/**/*.js", &["lint"]),
                RouteConfig::new("images/**/*", &["images"]),
            ],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    pub paths: PathsConfig,
    pub styles: StylesConfig,
    pub scripts: ScriptsConfig,
    pub markup: MarkupConfig,
    pub images: ImagesConfig,
    pub vendor: VendorConfig,
    pub server: ServerConfig,
    pub watch: WatchConfig,
}

impl Config {
    /// Load `path`, falling back to defaults when the file does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        klog_debug!("Config::load path={}", path.display());
        if !path.exists() {
            klog_debug!("Config file not found, using defaults");
            return Ok(Self::default());
        }
        let config: Self = toml::from_str(&fs::read_to_string(path)?)?;
        klog_debug!(
            "Config loaded: source={}, staging={}, dist={}",
            config.paths.source.display(),
            config.paths.staging.display(),
            config.paths.dist.display()
        );
        Ok(config)
    }

    /// Every configured external program.
    pub fn commands(&self) -> Vec<&CommandSpec> {
        [
            &self.styles.preprocessor,
            &self.styles.minifier,
            &self.scripts.compiler,
            &self.scripts.minifier,
            &self.scripts.linter,
            &self.markup.minifier,
            &self.images.optimizer,
        ]
        .into_iter()
        .filter_map(|c| c.as_ref())
        .collect()
    }

    /// Startup validation. Runs before any task.
    pub fn validate(&self) -> Result<()> {
        if self.styles.entries.is_empty() {
            return Err(Error::Configuration(
                "styles.entries must name at least one stylesheet".to_string(),
            ));
        }
        if self.scripts.entry.trim().is_empty() {
            return Err(Error::Configuration("scripts.entry is empty".to_string()));
        }
        if self.paths.staging == self.paths.dist {
            return Err(Error::Configuration(
                "paths.staging and paths.dist must differ".to_string(),
            ));
        }
        if self.paths.dist.starts_with(&self.paths.staging)
            || self.paths.staging.starts_with(&self.paths.dist)
        {
            return Err(Error::Configuration(
                "paths.staging and paths.dist must not contain one another".to_string(),
            ));
        }
        for command in self.commands() {
            which::which(&command.program).map_err(|_| {
                Error::Configuration(format!(
                    "transform program not found on PATH: {}",
                    command.program
                ))
            })?;
        }
        Ok(())
    }
}
