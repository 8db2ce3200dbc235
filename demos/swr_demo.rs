//! Stale-While-Revalidate Demo
//!
//! Walks through the article-metrics lifecycle against a simulated,
//! occasionally failing analytics provider.
//!
//! Usage:
//!   cargo run --example swr_demo
//!
//! Environment variables (also read from `.env`):
//!   ANALYTICS_CACHE_CLEANUP_INTERVAL_SECS - sweep interval (default: 300)
//!   ANALYTICS_CACHE_GRACE_PERIOD_SECS     - grace before sweeping (default: 3600)
//!   ANALYTICS_CACHE_TTL_JITTER            - TTL jitter factor (default: 0.0)
//!   RUST_LOG                              - log filter (default: info)

use analytics_cache::{
    AnalyticsCache, ArticleMetrics, CacheConfig, GetOptions, ManualClock, ReadThroughCache,
};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Simulated analytics provider
#[derive(Clone, Default)]
struct Provider {
    calls: Arc<AtomicU64>,
    down: Arc<AtomicBool>,
}

impl Provider {
    fn article_fetcher(
        &self,
        article_id: &'static str,
    ) -> impl FnOnce() -> futures::future::BoxFuture<'static, anyhow::Result<ArticleMetrics>> + Send + 'static
    {
        let provider = self.clone();
        move || -> futures::future::BoxFuture<'static, anyhow::Result<ArticleMetrics>> {
            Box::pin(async move {
                let call = provider.calls.fetch_add(1, Ordering::SeqCst) + 1;
                tokio::time::sleep(Duration::from_millis(50)).await;
                if provider.down.load(Ordering::SeqCst) {
                    anyhow::bail!("analytics provider unavailable");
                }
                Ok(ArticleMetrics {
                    article_id: article_id.to_string(),
                    views: call * 100,
                    unique_visitors: call * 60,
                    average_read_secs: 87.0,
                    shares: call,
                    computed_at: chrono::Utc::now(),
                })
            })
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("=== Analytics Cache SWR Demo ===");

    let config = CacheConfig::from_env()?;
    let clock = Arc::new(ManualClock::starting_now());
    let cache = ReadThroughCache::with_clock(config, clock.clone());
    let cleanup = cache.start_cleanup();
    let analytics = AnalyticsCache::new(cache.clone());
    let provider = Provider::default();

    info!("\n--- Cold read ---");
    let metrics = analytics.article_metrics("42", provider.article_fetcher("42")).await?;
    info!("views = {} (provider calls: {})", metrics.views, provider.calls.load(Ordering::SeqCst));

    info!("\n--- Fresh read ---");
    let metrics = analytics.article_metrics("42", provider.article_fetcher("42")).await?;
    info!("views = {} (provider calls: {})", metrics.views, provider.calls.load(Ordering::SeqCst));

    info!("\n--- One hour later: stale read, background refresh ---");
    clock.advance(Duration::from_secs(3601));
    let read = cache
        .get_with_status(
            "article:42",
            provider.article_fetcher("42"),
            GetOptions::ttl_secs(3600)
                .stale_while_revalidate(Duration::from_secs(3600))
                .tags(["analytics", "article:42"]),
        )
        .await?;
    info!("views = {} [{}, {:?} old]", read.value.views, read.status, read.age);
    tokio::time::sleep(Duration::from_millis(100)).await;
    let metrics = analytics.article_metrics("42", provider.article_fetcher("42")).await?;
    info!("after refresh: views = {}", metrics.views);

    info!("\n--- Provider outage past the stale window ---");
    provider.down.store(true, Ordering::SeqCst);
    clock.advance(Duration::from_secs(3 * 3600));
    let metrics = analytics.article_metrics("42", provider.article_fetcher("42")).await?;
    info!("served last good value: views = {}", metrics.views);

    info!("\n--- Outage on a cold key ---");
    match analytics.article_metrics("7", provider.article_fetcher("7")).await {
        Ok(metrics) => info!("unexpected value: {:?}", metrics),
        Err(e) if e.is_fetch_failure() => info!("error surfaced to caller: {}", e),
        Err(e) => return Err(e.into()),
    }

    info!("\n--- Invalidation ---");
    provider.down.store(false, Ordering::SeqCst);
    let removed = analytics.invalidate_article("42").await;
    info!("removed {} entries", removed);

    info!("\n--- Stats ---");
    info!("{}", serde_json::to_string_pretty(&analytics.stats_json().await)?);

    cleanup.shutdown().await;
    Ok(())
}
