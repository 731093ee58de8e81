//! Error types for ohpm-atlas.
//!
//! Library crates use [`AtlasError`] via `thiserror`.
//! The CLI app wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all ohpm-atlas operations.
#[derive(Debug, thiserror::Error)]
pub enum AtlasError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Transient network/HTTP failure during the registry fetch.
    /// Retried with backoff; surfaces only once retries are exhausted.
    #[error("fetch failed: network error: {0}")]
    Network(String),

    /// The registry signalled throttling (HTTP 429).
    /// Retried with backoff honoring the server's retry-after hint.
    #[error("fetch failed: rate limited by registry (retry-after: {retry_after_secs:?}s)")]
    RateLimited { retry_after_secs: Option<u64> },

    /// A raw registry entry could not be normalized. Recovered per-entry;
    /// only the aggregate rejection-rate ceiling escalates this to fatal.
    #[error("normalize failed: {message}")]
    Malformed { message: String },

    /// The fetched catalog is implausibly small relative to the configured
    /// floor. A warning by default; fatal in strict mode.
    #[error("crawl produced {got} packages, below the sanity floor of {floor}")]
    IncompleteCatalog { got: usize, floor: usize },

    /// Failure to atomically publish the catalog snapshot. Always fatal;
    /// the previous snapshot stays in place.
    #[error("persist failed: {0}")]
    Persistence(String),

    /// Data validation error (schema mismatch, invalid snapshot, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, AtlasError>;

impl AtlasError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a malformed-entry error from any displayable message.
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::Malformed {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
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
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = AtlasError::config("missing base_url");
        assert_eq!(err.to_string(), "config error: missing base_url");

        let err = AtlasError::IncompleteCatalog {
            got: 12,
            floor: 100,
        };
        assert!(err.to_string().contains("12"));
        assert!(err.to_string().contains("100"));
    }

    #[test]
    fn stage_is_named_in_fatal_errors() {
        let err = AtlasError::Network("connection reset".into());
        assert!(err.to_string().starts_with("fetch failed"));

        let err = AtlasError::Persistence("rename failed".into());
        assert!(err.to_string().starts_with("persist failed"));
    }
}
