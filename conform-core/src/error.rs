//! Error types for conform-core.

use std::path::PathBuf;

use thiserror::Error;

/// Reasons a manifest path is refused as a filesystem destination.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    #[error("path is empty")]
    Empty,

    #[error("absolute paths are not allowed: {0:?}")]
    Absolute(String),

    #[error("parent traversal not allowed: {0:?}")]
    ParentTraversal(String),

    /// A segment that is not a plain file name, e.g. `C:` or `file:stream`.
    #[error("path segment {segment:?} not allowed in {path:?}")]
    Segment { path: String, segment: String },
}

/// All errors that can arise while parsing a manifest document.
#[derive(Debug, Error)]
pub enum ManifestError {
    /// The document is not valid JSON or does not have the expected shape
    /// (missing fields, non-numeric size, negative size).
    #[error("malformed manifest JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// An entry path failed traversal checks.
    #[error("invalid path in manifest entry {index}: {source}")]
    InvalidPath {
        index: usize,
        #[source]
        source: PathError,
    },

    /// An entry hash is not 16 hex digits.
    #[error("invalid content hash {value:?} for {path}")]
    InvalidHash { path: String, value: String },

    /// Two entries normalize to the same relative path.
    #[error("duplicate manifest path: {0}")]
    DuplicatePath(String),

    /// Entry sizes add up to more than `u64::MAX` bytes.
    #[error("manifest sizes overflow at entry {index}")]
    SizeOverflow { index: usize },
}

/// All errors that can arise from configuration load/save.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Underlying I/O failure, with annotated path.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// YAML serialization error (save path).
    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// YAML parse error on load, with the offending file.
    #[error("failed to parse config at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// The config file does not exist.
    #[error("config not found at {path}; run `conform init` first")]
    NotFound { path: PathBuf },

    /// A field holds a value the engine cannot use.
    #[error("invalid config value for `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> ConfigError {
    ConfigError::Io {
        path: path.into(),
        source,
    }
}
