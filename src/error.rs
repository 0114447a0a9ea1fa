//! Error types for the Unified Cache
//!
//! Ordinary cache misses, admission rejections and quota-skipped writes are
//! not errors; they surface as `None` or as outcome enums. Only configuration
//! mistakes, storage I/O failures and network failures end up here.

use std::sync::Arc;
use thiserror::Error;

/// Unified error type for the cache manager
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Internal Errors
    // =========================================================================
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    // =========================================================================
    // Strategy Errors
    // =========================================================================
    #[error("Invalid strategy configuration: {0}")]
    InvalidStrategy(String),

    #[error("Invalid key pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    // =========================================================================
    // Storage Errors
    // =========================================================================
    #[error("Storage operation failed: {backend} - {operation}: {reason}")]
    Storage {
        backend: String,
        operation: String,
        reason: String,
    },

    #[error("Cached value for key '{key}' does not match the requested type: {reason}")]
    TypeMismatch { key: String, reason: String },

    // =========================================================================
    // HTTP Errors
    // =========================================================================
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Network request failed for {url}: {reason}")]
    Network { url: String, reason: String },

    #[error("Request cancelled: {url}")]
    Cancelled { url: String },

    #[error("Shared in-flight request failed: {0}")]
    SharedFetch(Arc<Error>),

    // =========================================================================
    // Parse Errors
    // =========================================================================
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    // =========================================================================
    // IO Errors
    // =========================================================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Check if retrying the same call may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::SharedFetch(inner) => inner.is_retryable(),
            _ => self.is_transient(),
        }
    }

    /// Check if this error is transient (network or I/O hiccup)
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::Http(_) | Error::Network { .. } | Error::Io(_) | Error::Cancelled { .. }
        )
    }

    /// Check if this error comes from invalid configuration (fail-fast class)
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Error::Configuration(_)
                | Error::InvalidStrategy(_)
                | Error::InvalidPattern { .. }
                | Error::Yaml(_)
        )
    }

    /// Check if this error reports a cancelled request
    pub fn is_cancelled(&self) -> bool {
        match self {
            Error::Cancelled { .. } => true,
            Error::SharedFetch(inner) => inner.is_cancelled(),
            _ => false,
        }
    }

    pub(crate) fn storage(
        backend: impl Into<String>,
        operation: impl Into<String>,
        reason: impl std::fmt::Display,
    ) -> Self {
        Error::Storage {
            backend: backend.into(),
            operation: operation.into(),
            reason: reason.to_string(),
        }
    }
}

/// Result type alias for the cache
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        let err = Error::InvalidStrategy("capacity must be positive".into());
        assert!(err.is_configuration());
        assert!(!err.is_retryable());

        let err = Error::Network {
            url: "https://example.com".into(),
            reason: "connection reset".into(),
        };
        assert!(err.is_transient());
        assert!(err.is_retryable());
        assert!(!err.is_configuration());
    }

    #[test]
    fn test_shared_fetch_delegates() {
        let inner = Arc::new(Error::Cancelled {
            url: "https://example.com/a".into(),
        });
        let err = Error::SharedFetch(inner);
        assert!(err.is_cancelled());
        assert!(err.is_retryable());
        assert!(!err.is_transient());
    }
}
