//! Invalidation bookkeeping
//!
//! Entries leave the store for one of a few reasons: a tag or key was
//! invalidated, the cleanup sweep found them long dead, or the cache was
//! cleared. Each removal pass is reported as an [`InvalidationEvent`].

use crate::cache::types::{CacheKey, Tag};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Reason for cache invalidation
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InvalidationReason {
    /// Invalidated by tag match
    TagMatch { tag: Tag },

    /// Explicit invalidation of a single key
    Manual,

    /// Removed by the cleanup sweep
    Expired,

    /// Whole cache cleared
    Cleared,
}

impl std::fmt::Display for InvalidationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InvalidationReason::TagMatch { tag } => write!(f, "tag match: {}", tag),
            InvalidationReason::Manual => write!(f, "manual invalidation"),
            InvalidationReason::Expired => write!(f, "past stale window and grace period"),
            InvalidationReason::Cleared => write!(f, "cache cleared"),
        }
    }
}

/// Event for cache invalidation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvalidationEvent {
    /// Reason for invalidation
    pub reason: InvalidationReason,

    /// When the invalidation occurred
    pub timestamp: DateTime<Utc>,

    /// Keys that were invalidated
    pub keys: Vec<CacheKey>,

    /// Additional context
    pub context: Option<String>,
}

impl InvalidationEvent {
    /// Create a new invalidation event
    pub fn new(reason: InvalidationReason, keys: Vec<CacheKey>, timestamp: DateTime<Utc>) -> Self {
        Self {
            reason,
            timestamp,
            keys,
            context: None,
        }
    }

    /// Add context to the event
    pub fn with_context(mut self, context: String) -> Self {
        self.context = Some(context);
        self
    }

    /// Number of keys removed
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Whether nothing was removed
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}
