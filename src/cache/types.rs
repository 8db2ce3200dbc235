//! Core type definitions for the cache system

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Cache key type - opaque, non-empty string
pub type CacheKey = String;

/// Label attached to entries for bulk invalidation
pub type Tag = String;

/// How a value returned from the cache was obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheStatus {
    /// Served from cache within its TTL
    Fresh,

    /// Served from cache past its TTL while a background refresh runs
    Stale,

    /// Fetched from upstream for this call
    Fetched,

    /// Upstream failed; the last successfully fetched value was served
    StaleFallback,
}

impl CacheStatus {
    /// Whether the value came out of the store rather than the fetcher
    pub fn is_cached(&self) -> bool {
        !matches!(self, CacheStatus::Fetched)
    }
}

impl fmt::Display for CacheStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheStatus::Fresh => write!(f, "fresh"),
            CacheStatus::Stale => write!(f, "stale"),
            CacheStatus::Fetched => write!(f, "fetched"),
            CacheStatus::StaleFallback => write!(f, "stale_fallback"),
        }
    }
}

/// Result of a cache read, carrying freshness metadata
#[derive(Debug)]
pub struct CacheRead<T> {
    /// The value
    pub value: Arc<T>,

    /// How the value was obtained
    pub status: CacheStatus,

    /// Age of the value at the time it was returned
    pub age: Duration,
}

impl<T> CacheRead<T> {
    /// Consume the read, keeping only the value
    pub fn into_value(self) -> Arc<T> {
        self.value
    }

    /// Whether the value is older than its TTL
    pub fn is_stale(&self) -> bool {
        matches!(self.status, CacheStatus::Stale | CacheStatus::StaleFallback)
    }
}

impl<T> Clone for CacheRead<T> {
    fn clone(&self) -> Self {
        Self {
            value: Arc::clone(&self.value),
            status: self.status,
            age: self.age,
        }
    }
}

/// Diagnostic snapshot of the cache
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CacheStats {
    /// Number of entries currently in cache
    pub size: usize,

    /// Keys currently in cache, sorted
    pub entries: Vec<CacheKey>,

    /// Fetches currently in flight
    pub in_flight: usize,

    /// Reads served fresh from cache
    pub hits: u64,

    /// Reads served stale while revalidating
    pub stale_hits: u64,

    /// Reads that had to wait on the fetcher
    pub misses: u64,

    /// Upstream fetches started
    pub fetches: u64,

    /// Fetches started in the background by stale reads
    pub revalidations: u64,

    /// Upstream fetches that failed
    pub fetch_failures: u64,

    /// Failed fetches answered with older cached data
    pub stale_fallbacks: u64,

    /// Entries removed by key or tag invalidation
    pub invalidations: u64,

    /// Entries removed by the cleanup sweep
    pub swept: u64,
}

impl CacheStats {
    /// Share of reads answered from cache (fresh or stale), as a percentage
    pub fn hit_rate(&self) -> f64 {
        let served = self.hits + self.stale_hits;
        let total = served + self.misses;
        if total == 0 {
            0.0
        } else {
            (served as f64 / total as f64) * 100.0
        }
    }

    /// Calculate miss rate as a percentage
    pub fn miss_rate(&self) -> f64 {
        100.0 - self.hit_rate()
    }

    /// Render the snapshot as JSON for diagnostic endpoints
    pub fn to_json(&self) -> serde_json::Value {
        let mut value = serde_json::to_value(self).unwrap_or(serde_json::Value::Null);
        if let Some(map) = value.as_object_mut() {
            map.insert("hit_rate".to_string(), serde_json::json!(self.hit_rate()));
        }
        value
    }
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CacheStats {{ size: {}, hits: {}, stale_hits: {}, misses: {}, hit_rate: {:.2}%, fetches: {}, failures: {} }}",
            self.size,
            self.hits,
            self.stale_hits,
            self.misses,
            self.hit_rate(),
            self.fetches,
            self.fetch_failures
        )
    }
}
