//! Error types for cache operations
//!
//! This module defines the error taxonomy of the analytics cache. Upstream
//! fetch failures are only surfaced when there is no previously cached value
//! to fall back on.

use std::error::Error as StdError;
use std::sync::Arc;
use thiserror::Error;

/// Shared, cloneable error produced by a fetcher.
///
/// Every caller joined on the same in-flight fetch receives the same source.
pub type FetchError = Arc<dyn StdError + Send + Sync + 'static>;

/// Main error type for cache operations
#[derive(Error, Debug, Clone)]
pub enum CacheError {
    /// Cache keys must be non-empty
    #[error("Invalid cache key: {0:?}")]
    InvalidKey(String),

    /// The upstream fetcher failed and no cached value exists for the key
    #[error("Fetch failed for key '{key}': {source}")]
    FetchFailed {
        key: String,
        #[source]
        source: FetchError,
    },

    /// The fetch task was dropped before producing a result
    #[error("Fetch for key '{key}' was aborted before completing")]
    FetchAborted { key: String },

    /// The cached value for a key has a different type than requested
    #[error("Cached value for key '{key}' is not of type {expected}")]
    TypeMismatch { key: String, expected: &'static str },

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl CacheError {
    /// Failure of the fetch for `key`
    pub fn fetch_failed(key: impl Into<String>, source: FetchError) -> Self {
        CacheError::FetchFailed {
            key: key.into(),
            source,
        }
    }

    /// Whether this error originates from the upstream fetcher
    pub fn is_fetch_failure(&self) -> bool {
        matches!(
            self,
            CacheError::FetchFailed { .. } | CacheError::FetchAborted { .. }
        )
    }
}

/// Result type alias for cache operations
pub type Result<T> = std::result::Result<T, CacheError>;

/// Convert whatever a fetcher failed with into a shareable [`FetchError`]
pub fn into_fetch_error(err: impl Into<anyhow::Error>) -> FetchError {
    let err: anyhow::Error = err.into();
    let boxed: Box<dyn StdError + Send + Sync + 'static> = err.into();
    Arc::from(boxed)
}
