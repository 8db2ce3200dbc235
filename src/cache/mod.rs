//! # Read-Through Cache
//!
//! This module implements a read-through cache with stale-while-revalidate
//! semantics for expensive, rate-limited upstreams such as an analytics
//! provider.
//!
//! ## Features
//!
//! - **TTL freshness**: entries within their TTL are served without touching
//!   the upstream
//! - **Stale-while-revalidate**: recently expired entries are served at once
//!   while a single background fetch refreshes them
//! - **In-flight deduplication**: at most one upstream fetch per key
//! - **Stale on error**: a failing upstream falls back to the last good value
//! - **Tag invalidation**: bulk removal by label, plus removal by key
//! - **Cleanup sweep**: a stoppable background task drops long-dead entries
//!
//! ## Example
//!
//! ```rust
//! use analytics_cache::cache::{CacheConfig, GetOptions, ReadThroughCache};
//! use std::time::Duration;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let cache = ReadThroughCache::new(CacheConfig::default());
//!
//! let options = GetOptions::ttl_secs(3600)
//!     .stale_while_revalidate(Duration::from_secs(3600))
//!     .tags(["analytics", "article:42"]);
//!
//! let views = cache
//!     .get("article:42", || async { Ok::<u64, anyhow::Error>(1_234) }, options)
//!     .await?;
//! println!("views: {}", views);
//!
//! cache.invalidate("article:42").await;
//! # Ok(())
//! # }
//! ```

pub mod cleanup;
pub mod clock;
pub mod config;
pub mod entry;
pub mod integration;
pub mod invalidation;
pub mod store;
pub mod types;

pub use cleanup::CleanupHandle;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{CacheConfig, CacheConfigBuilder};
pub use entry::{CacheEntry, GetOptions};
pub use integration::{
    AnalyticsCache, AnalyticsScope, ArticleMetrics, AuthorMetrics, CacheKeyBuilder,
};
pub use invalidation::{InvalidationEvent, InvalidationReason};
pub use store::ReadThroughCache;
pub use types::{CacheKey, CacheRead, CacheStats, CacheStatus, Tag};
