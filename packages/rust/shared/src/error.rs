//! Error types for the enrichment service.
//!
//! Library crates use [`EnrichmentError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.
//!
//! Cache and webhook failures are soft: collaborators log them and degrade
//! instead of returning these variants to the orchestrator.

use std::path::PathBuf;

/// Top-level error type for all enrichment operations.
#[derive(Debug, thiserror::Error)]
pub enum EnrichmentError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Malformed request or batch input, rejected before processing.
    #[error("validation error: {message}")]
    Validation { message: String },

    /// An analyzer failed; fatal to the enclosing message.
    #[error("{analyzer} analyzer failed: {message}")]
    Analyzer { analyzer: String, message: String },

    /// Database or storage layer error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Cache read/write error.
    #[error("cache error: {0}")]
    Cache(String),

    /// Network/HTTP error talking to an upstream service.
    #[error("network error: {0}")]
    Network(String),

    /// Webhook delivery error.
    #[error("webhook error: {0}")]
    Webhook(String),

    /// JSON encoding or decoding error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, EnrichmentError>;

impl EnrichmentError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Create an analyzer error naming the analyzer that failed.
    pub fn analyzer(analyzer: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Analyzer {
            analyzer: analyzer.into(),
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

    /// Whether this error was raised by input validation.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation { .. })
    }
}
