//! Error types for the enrichment pipeline.
//!
//! Library crates use [`EnricherError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all enrichment operations.
#[derive(Debug, thiserror::Error)]
pub enum EnricherError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Transport failure: connection error, timeout, or a retryable non-2xx status.
    #[error("network error: {0}")]
    Network(String),

    /// The provider rejected the query itself. Retrying will not help.
    #[error("malformed query to {provider}: {message}")]
    MalformedQuery { provider: String, message: String },

    /// Payload or spreadsheet could not be decoded.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Input validation error (missing column, bad argument).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The run was cancelled before this operation finished.
    #[error("operation cancelled")]
    Cancelled,

    /// Alert or report hand-off failed.
    #[error("notification error: {0}")]
    Notification(String),

    /// Output serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, EnricherError>;

impl EnricherError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Create a malformed-query error attributed to a provider.
    pub fn malformed(provider: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::MalformedQuery {
            provider: provider.into(),
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether the retry executor should try the operation again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network(_))
    }
}
