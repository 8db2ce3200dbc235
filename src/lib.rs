//! # Analytics Cache (analytics-cache)
//!
//! A read-through cache for an expensive, rate-limited analytics source.
//!
//! ## Features
//!
//! - Stale-while-revalidate: expired-but-recent data is served immediately
//!   while one background fetch refreshes it
//! - Deduplication of concurrent fetches for the same key
//! - Fallback to the last good value when the upstream fails
//! - Tag-based and key-based invalidation
//! - Periodic cleanup of long-dead entries, started and stopped explicitly
//! - Async-first design using tokio
//!
//! ## Reading through the cache
//!
//! ```no_run
//! use analytics_cache::{CacheConfig, GetOptions, ReadThroughCache};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let cache = ReadThroughCache::new(CacheConfig::from_env()?);
//!     let cleanup = cache.start_cleanup();
//!
//!     let options = GetOptions::ttl_secs(60)
//!         .stale_while_revalidate(Duration::from_secs(300))
//!         .tag("analytics");
//!
//!     let read = cache
//!         .get_with_status("site:overview", || async { Ok::<u64, anyhow::Error>(42) }, options)
//!         .await?;
//!     println!("{} ({})", read.value, read.status);
//!
//!     cleanup.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Analytics lookups
//!
//! ```no_run
//! use analytics_cache::{AnalyticsCache, ArticleMetrics, CacheConfig, ReadThroughCache};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let analytics = AnalyticsCache::new(ReadThroughCache::new(CacheConfig::default()));
//!
//!     let metrics = analytics
//!         .article_metrics("42", || async {
//!             Ok::<_, anyhow::Error>(ArticleMetrics {
//!                 article_id: "42".to_string(),
//!                 views: 1_234,
//!                 unique_visitors: 800,
//!                 average_read_secs: 95.0,
//!                 shares: 12,
//!                 computed_at: chrono::Utc::now(),
//!             })
//!         })
//!         .await?;
//!     println!("views: {}", metrics.views);
//!
//!     // An article was edited: drop its numbers
//!     analytics.invalidate_article("42").await;
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod error;

// Re-export main types for convenience
pub use cache::{
    AnalyticsCache, AnalyticsScope, ArticleMetrics, AuthorMetrics, CacheConfig,
    CacheConfigBuilder, CacheEntry, CacheKey, CacheKeyBuilder, CacheRead, CacheStats, CacheStatus,
    CleanupHandle, Clock, GetOptions, InvalidationEvent, InvalidationReason, ManualClock,
    ReadThroughCache, SystemClock, Tag,
};
pub use error::{CacheError, FetchError, Result};
