//! Common error types used throughout plexrelay.
//!
//! One unified taxonomy covers the failure cases the HTTP layer needs to
//! distinguish: configuration problems (fatal at startup), upstream library
//! failures, malformed requests, encoder build failures, and the two
//! "try again" shapes (not ready, not found).

use std::sync::Arc;

/// Common error type for plexrelay.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Required configuration is missing or malformed. Fatal at startup.
    #[error("configuration error: {0}")]
    Config(String),

    /// The media library failed a metadata or stream-URL lookup.
    #[error("library error: {0}")]
    Upstream(String),

    /// The requested segment name does not match the fixed pattern, or its
    /// resolved path escapes the cache directory.
    #[error("invalid segment name")]
    InvalidSegmentName,

    /// The asset identifier contains characters that are never valid.
    #[error("invalid asset id")]
    InvalidAssetId,

    /// The encoder failed to spawn or exited abnormally.
    #[error("encoder failed: {detail}")]
    Build {
        detail: String,
        /// Exit code of the encoder process, when it got that far.
        code: Option<i32>,
    },

    /// The stream or segment was not produced before the deadline; the client
    /// is expected to retry.
    #[error("stream not ready")]
    NotReady,

    /// The resolved path does not exist and no build is owed for it.
    #[error("not found")]
    NotFound,

    /// An I/O operation failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A deduplicated build owned by another caller settled with this failure.
    #[error("{0}")]
    Shared(Arc<Error>),
}

impl Error {
    /// Create a new Config error.
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new Upstream error.
    pub fn upstream<S: Into<String>>(msg: S) -> Self {
        Self::Upstream(msg.into())
    }

    /// Create a new Build error.
    pub fn build<S: Into<String>>(detail: S, code: Option<i32>) -> Self {
        Self::Build {
            detail: detail.into(),
            code,
        }
    }

    /// Unwrap the shared layer added by the build registry, if any.
    pub fn root(&self) -> &Error {
        match self {
            Self::Shared(inner) => inner.root(),
            other => other,
        }
    }
}

impl From<Arc<Error>> for Error {
    fn from(inner: Arc<Error>) -> Self {
        Self::Shared(inner)
    }
}

/// Result type alias using the common Error type.
pub type Result<T> = std::result::Result<T, Error>;
