//! Error types for conform-sync.
//!
//! Only [`SyncError`] aborts a run. Everything else is per file and ends up
//! in the run report as a [`FailureReason`].

use std::path::PathBuf;

use thiserror::Error;

use conform_core::{ContentHash, ManifestError};

/// A request to the object store did not produce a body.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("HTTP status {0}")]
    Status(u16),

    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("connection failed: {0}")]
    Connection(String),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),
}

impl TransportError {
    /// Timeouts, connection failures, 5xx and 429 are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            TransportError::Status(code) => *code >= 500 || *code == 429,
            TransportError::Timeout(_) | TransportError::Connection(_) => true,
            TransportError::InvalidUrl(_) => false,
        }
    }
}

/// Failure while streaming one object.
#[derive(Debug, Error)]
pub enum DownloadError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("response body read failed: {0}")]
    Body(#[source] std::io::Error),

    #[error("response exceeded the expected {expected} bytes")]
    TooLarge { expected: u64 },

    #[error("response ended after {received} of {expected} bytes")]
    Truncated { expected: u64, received: u64 },

    /// Writing received bytes locally failed. Not a network problem.
    #[error("local write failed: {0}")]
    Sink(#[source] std::io::Error),

    #[error("download cancelled")]
    Cancelled,
}

impl DownloadError {
    pub fn is_retryable(&self) -> bool {
        match self {
            DownloadError::Transport(e) => e.is_retryable(),
            DownloadError::Body(_) | DownloadError::Truncated { .. } => true,
            DownloadError::TooLarge { .. } | DownloadError::Sink(_) | DownloadError::Cancelled => {
                false
            }
        }
    }
}

/// Why the manifest could not be obtained.
#[derive(Debug, Error)]
pub enum ManifestFetchError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("failed to read manifest body: {0}")]
    Read(#[source] std::io::Error),

    #[error(transparent)]
    Malformed(#[from] ManifestError),
}

/// Errors that abort a sync run.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("manifest unavailable from {url}: {cause}")]
    ManifestUnavailable {
        url: String,
        #[source]
        cause: ManifestFetchError,
    },
}

/// Why a single file could not be brought into conformance.
#[derive(Debug, Error)]
pub enum FailureReason {
    #[error("download failed: {0}")]
    DownloadFailed(#[source] DownloadError),

    #[error("fetched content hashed to {actual}, expected {expected}")]
    Corrupt {
        expected: ContentHash,
        actual: ContentHash,
    },

    #[error("filesystem error at {path}: {source}")]
    Filesystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cancelled before completion")]
    Cancelled,
}

/// Convenience constructor for [`FailureReason::Filesystem`].
pub(crate) fn fs_failure(path: impl Into<PathBuf>, source: std::io::Error) -> FailureReason {
    FailureReason::Filesystem {
        path: path.into(),
        source,
    }
}
