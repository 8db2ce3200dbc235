//! Analytics integration
//!
//! High-level caching for the platform's analytics lookups:
//! - Key and tag construction per analytics scope
//! - Article and author metrics with the standard freshness policy
//! - Invalidation per article, per author, or for all analytics

use crate::cache::{
    entry::GetOptions,
    store::ReadThroughCache,
    types::{CacheKey, CacheStats, Tag},
};
use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Tag carried by every analytics entry
pub const ANALYTICS_TAG: &str = "analytics";

/// Freshness window for analytics lookups
pub const METRICS_TTL: Duration = Duration::from_secs(3600);

/// Stale window for analytics lookups
pub const METRICS_STALE_WINDOW: Duration = Duration::from_secs(3600);

/// What an analytics key refers to
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AnalyticsScope {
    /// A single article
    Article,

    /// A contributor
    Author,

    /// Site-wide aggregates
    Site,

    /// Custom scope
    Custom(String),
}

impl std::fmt::Display for AnalyticsScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AnalyticsScope::Article => write!(f, "article"),
            AnalyticsScope::Author => write!(f, "author"),
            AnalyticsScope::Site => write!(f, "site"),
            AnalyticsScope::Custom(s) => write!(f, "custom:{}", s),
        }
    }
}

/// Cache key builder for analytics lookups
pub struct CacheKeyBuilder {
    scope: AnalyticsScope,
    identifier: String,
    params: Vec<(String, String)>,
}

impl CacheKeyBuilder {
    /// Create a new cache key builder
    pub fn new(scope: AnalyticsScope) -> Self {
        Self {
            scope,
            identifier: String::new(),
            params: Vec::new(),
        }
    }

    /// Set the primary identifier
    pub fn identifier(mut self, id: impl Into<String>) -> Self {
        self.identifier = id.into();
        self
    }

    /// Add a parameter to the key
    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((key.into(), value.into()));
        self
    }

    /// Tag shared by every key of this scope and identifier, whatever the
    /// parameters
    pub fn tag(&self) -> Tag {
        format!("{}:{}", self.scope, self.identifier)
    }

    /// Build the cache key
    pub fn build(self) -> CacheKey {
        let mut key = self.tag();

        if !self.params.is_empty() {
            let params_str: Vec<String> = self
                .params
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect();
            key.push_str(&format!("?{}", params_str.join("&")));
        }

        key
    }
}

/// Engagement numbers for one article
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArticleMetrics {
    pub article_id: String,
    pub views: u64,
    pub unique_visitors: u64,
    pub average_read_secs: f64,
    pub shares: u64,
    /// When the upstream computed these numbers
    pub computed_at: DateTime<Utc>,
}

/// Aggregated numbers for one contributor over a period
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthorMetrics {
    pub author_id: String,
    pub period_days: u32,
    pub articles_published: u32,
    pub total_views: u64,
    pub computed_at: DateTime<Utc>,
}

/// Analytics cache wrapper
///
/// Wraps an injected [`ReadThroughCache`]; clones share the same store.
#[derive(Debug, Clone)]
pub struct AnalyticsCache {
    cache: ReadThroughCache,
}

impl AnalyticsCache {
    /// Wrap an existing cache
    pub fn new(cache: ReadThroughCache) -> Self {
        Self { cache }
    }

    /// Get the underlying cache instance
    pub fn inner(&self) -> &ReadThroughCache {
        &self.cache
    }

    /// Metrics for an article, cached under `article:<id>`
    pub async fn article_metrics<F, Fut, E>(
        &self,
        article_id: &str,
        fetcher: F,
    ) -> Result<Arc<ArticleMetrics>>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = std::result::Result<ArticleMetrics, E>> + Send + 'static,
        E: Into<anyhow::Error> + Send + 'static,
    {
        let builder = CacheKeyBuilder::new(AnalyticsScope::Article).identifier(article_id);
        self.lookup(builder, fetcher).await
    }

    /// Metrics for an author over the last `period_days`
    pub async fn author_metrics<F, Fut, E>(
        &self,
        author_id: &str,
        period_days: u32,
        fetcher: F,
    ) -> Result<Arc<AuthorMetrics>>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = std::result::Result<AuthorMetrics, E>> + Send + 'static,
        E: Into<anyhow::Error> + Send + 'static,
    {
        let builder = CacheKeyBuilder::new(AnalyticsScope::Author)
            .identifier(author_id)
            .param("range", format!("{}d", period_days));
        self.lookup(builder, fetcher).await
    }

    /// Any analytics value under the given scope and identifier
    pub async fn metrics<T, F, Fut, E>(
        &self,
        scope: AnalyticsScope,
        identifier: &str,
        fetcher: F,
    ) -> Result<Arc<T>>
    where
        T: Send + Sync + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = std::result::Result<T, E>> + Send + 'static,
        E: Into<anyhow::Error> + Send + 'static,
    {
        self.lookup(CacheKeyBuilder::new(scope).identifier(identifier), fetcher)
            .await
    }

    /// Drop cached metrics for an article
    pub async fn invalidate_article(&self, article_id: &str) -> usize {
        let tag = CacheKeyBuilder::new(AnalyticsScope::Article)
            .identifier(article_id)
            .tag();
        self.cache.invalidate(&tag).await.len()
    }

    /// Drop cached metrics for an author, for every period
    pub async fn invalidate_author(&self, author_id: &str) -> usize {
        let tag = CacheKeyBuilder::new(AnalyticsScope::Author)
            .identifier(author_id)
            .tag();
        self.cache.invalidate(&tag).await.len()
    }

    /// Drop every analytics entry
    pub async fn invalidate_all(&self) -> usize {
        self.cache.invalidate(ANALYTICS_TAG).await.len()
    }

    /// Get cache statistics
    pub async fn stats(&self) -> CacheStats {
        self.cache.get_stats().await
    }

    /// Cache statistics as JSON, for diagnostic endpoints
    pub async fn stats_json(&self) -> serde_json::Value {
        self.stats().await.to_json()
    }

    /// Internal: the standard analytics freshness policy
    fn options(tag: Tag) -> GetOptions {
        GetOptions::new(METRICS_TTL)
            .stale_while_revalidate(METRICS_STALE_WINDOW)
            .tag(ANALYTICS_TAG)
            .tag(tag)
    }

    async fn lookup<T, F, Fut, E>(&self, builder: CacheKeyBuilder, fetcher: F) -> Result<Arc<T>>
    where
        T: Send + Sync + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = std::result::Result<T, E>> + Send + 'static,
        E: Into<anyhow::Error> + Send + 'static,
    {
        let options = Self::options(builder.tag());
        let key = builder.build();
        self.cache.get(&key, fetcher, options).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::config::CacheConfig;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn article(id: &str, views: u64) -> ArticleMetrics {
        ArticleMetrics {
            article_id: id.to_string(),
            views,
            unique_visitors: views / 2,
            average_read_secs: 95.5,
            shares: 3,
            computed_at: Utc::now(),
        }
    }

    #[test]
    fn test_scope_display() {
        assert_eq!(format!("{}", AnalyticsScope::Article), "article");
        assert_eq!(format!("{}", AnalyticsScope::Author), "author");
        assert_eq!(format!("{}", AnalyticsScope::Site), "site");
        assert_eq!(
            format!("{}", AnalyticsScope::Custom("badges".to_string())),
            "custom:badges"
        );
    }

    #[test]
    fn test_cache_key_builder() {
        let key = CacheKeyBuilder::new(AnalyticsScope::Article)
            .identifier("42")
            .build();
        assert_eq!(key, "article:42");

        let builder = CacheKeyBuilder::new(AnalyticsScope::Author)
            .identifier("7")
            .param("range", "30d")
            .param("source", "web");
        assert_eq!(builder.tag(), "author:7");
        assert_eq!(builder.build(), "author:7?range=30d&source=web");
    }

    #[test]
    fn test_metrics_serialization() {
        let metrics = article("42", 100);
        let json = serde_json::to_value(&metrics).unwrap();
        assert_eq!(json["article_id"], "42");
        assert_eq!(json["views"], 100);
    }

    #[tokio::test]
    async fn test_article_metrics_cached_and_tagged() {
        let cache = AnalyticsCache::new(ReadThroughCache::new(CacheConfig::default()));
        let calls = Arc::new(AtomicUsize::new(0));

        for _ in 0..2 {
            let calls = Arc::clone(&calls);
            let metrics = cache
                .article_metrics("42", move || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, anyhow::Error>(article("42", 100))
                })
                .await
                .unwrap();
            assert_eq!(metrics.views, 100);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let stats = cache.stats().await;
        assert_eq!(stats.entries, vec!["article:42".to_string()]);

        assert_eq!(cache.invalidate_article("42").await, 1);
        assert!(cache.inner().is_empty().await);
    }

    #[tokio::test]
    async fn test_invalidate_author_covers_all_periods() {
        let cache = AnalyticsCache::new(ReadThroughCache::new(CacheConfig::default()));

        for days in [7, 30] {
            cache
                .author_metrics("7", days, move || async move {
                    Ok::<_, anyhow::Error>(AuthorMetrics {
                        author_id: "7".to_string(),
                        period_days: days,
                        articles_published: 2,
                        total_views: 500,
                        computed_at: Utc::now(),
                    })
                })
                .await
                .unwrap();
        }
        cache
            .metrics(AnalyticsScope::Site, "overview", || async {
                Ok::<_, anyhow::Error>(10_000u64)
            })
            .await
            .unwrap();

        assert_eq!(cache.invalidate_author("7").await, 2);
        assert_eq!(cache.stats().await.entries, vec!["site:overview".to_string()]);

        assert_eq!(cache.invalidate_all().await, 1);
        assert_eq!(cache.stats_json().await["size"], 0);
    }
}
