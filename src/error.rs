use std::path::PathBuf;

use thiserror::Error;

/// A single asset that an external transform rejected.
///
/// Whether this is fatal depends on the build mode: while developing it is
/// logged and the previous artifact is kept, in release it aborts the build.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("[{stage}] {}: {message}", .path.display())]
pub struct TransformError {
    /// Stage that invoked the transform (e.g. "styles").
    pub stage: String,
    /// Source asset (or module identifier) that failed.
    pub path: PathBuf,
    /// Message reported by the transform.
    pub message: String,
}

impl TransformError {
    pub fn new(stage: &str, path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self {
            stage: stage.to_string(),
            path: path.into(),
            message: message.into(),
        }
    }
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Transform error: {0}")]
    Transform(#[from] TransformError),

    #[error("{} transform error(s), first: {}", .0.len(), .0.first().map(|e| e.to_string()).unwrap_or_default())]
    TransformFailures(Vec<TransformError>),

    #[error("Watch error: {0}")]
    Watch(String),

    #[error("Task(s) failed: {}", failed_summary(.0))]
    TasksFailed(Vec<(String, String)>),

    #[error("Task join error: {0}")]
    TaskJoin(String),

    #[error("Server error: {0}")]
    Server(String),
}

fn failed_summary(failures: &[(String, String)]) -> String {
    failures
        .iter()
        .map(|(task, error)| format!("{}: {}", task, error))
        .collect::<Vec<_>>()
        .join("; ")
}

impl From<notify::Error> for Error {
    fn from(err: notify::Error) -> Self {
        Error::Watch(err.to_string())
    }
}

impl From<glob::PatternError> for Error {
    fn from(err: glob::PatternError) -> Self {
        Error::Configuration(format!("invalid glob pattern: {}", err))
    }
}

impl Error {
    /// Whether this error came from the task graph definition itself.
    pub fn is_configuration(&self) -> bool {
        matches!(self, Error::Configuration(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
