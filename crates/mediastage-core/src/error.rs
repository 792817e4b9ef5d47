use std::path::PathBuf;

use thiserror::Error;

/// Errors that abort a whole stage run.
///
/// Anything that concerns a single media file is caught inside the engine and
/// ends up as a skip or failure entry of the [`StageReport`](crate::engine::StageReport).
#[derive(Debug, Error)]
pub enum StageError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Metadata(#[from] MetadataError),

    #[error("conversion failed: {0}")]
    Conversion(String),

    #[error(transparent)]
    Track(#[from] TrackError),

    #[error("directory walk failed: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("{0}")]
    Evaluation(String),
}

impl StageError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StageError::Io {
            path: path.into(),
            source,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("configuration file not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("unsupported configuration format: {0} (expected yaml, yml or json)")]
    UnsupportedFormat(String),

    #[error("failed to read configuration: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse YAML configuration: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("failed to parse JSON configuration: {0}")]
    Json(#[from] serde_json::Error),

    #[error("missing required setting: {0}")]
    MissingRequired(String),

    #[error("invalid value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

impl ConfigError {
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        ConfigError::InvalidValue {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("failed to run {tool}: {source}")]
    Spawn {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{tool} exited with {status}: {stderr}")]
    ToolFailed {
        tool: String,
        status: String,
        stderr: String,
    },

    #[error("unexpected metadata output: {0}")]
    Parse(String),

    #[error("invalid value for tag {tag}: {reason}")]
    InvalidValue { tag: String, reason: String },
}

#[derive(Debug, Error)]
pub enum TrackError {
    #[error("cannot read track {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unsupported track format: {}", .0.display())]
    UnsupportedFormat(PathBuf),

    #[error("malformed track {}: {reason}", path.display())]
    Malformed { path: PathBuf, reason: String },
}

pub type StageResult<T> = Result<T, StageError>;
