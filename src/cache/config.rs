//! Configuration for the cache system
//!
//! Per-call freshness (TTL, stale window, tags) lives in
//! [`GetOptions`](crate::cache::GetOptions). This configuration covers the
//! process-wide behavior of a cache instance.

use crate::error::{CacheError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

const ENV_CLEANUP_INTERVAL: &str = "ANALYTICS_CACHE_CLEANUP_INTERVAL_SECS";
const ENV_GRACE_PERIOD: &str = "ANALYTICS_CACHE_GRACE_PERIOD_SECS";
const ENV_TTL_JITTER: &str = "ANALYTICS_CACHE_TTL_JITTER";
const ENV_AUTO_CLEANUP: &str = "ANALYTICS_CACHE_AUTO_CLEANUP";

/// Configuration for the read-through cache
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Interval between cleanup sweeps
    pub cleanup_interval: Duration,

    /// Extra age past `ttl + stale_while_revalidate` before the sweep
    /// removes an entry
    pub grace_period: Duration,

    /// TTL jitter factor (0.0 - 1.0)
    /// Spreads expiry of entries populated at the same moment
    pub ttl_jitter: f64,

    /// Start the cleanup sweep when the cache is built through
    /// [`ReadThroughCache::with_auto_cleanup`](crate::cache::ReadThroughCache::with_auto_cleanup)
    pub enable_auto_cleanup: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            // Sweep every 5 minutes
            cleanup_interval: Duration::from_secs(300),
            // Keep dead entries one extra hour
            grace_period: Duration::from_secs(3600),
            ttl_jitter: 0.0,
            enable_auto_cleanup: true,
        }
    }
}

impl CacheConfig {
    /// Create a new builder for cache configuration
    pub fn builder() -> CacheConfigBuilder {
        CacheConfigBuilder::default()
    }

    /// Load configuration from the environment, falling back to defaults
    ///
    /// A `.env` file in the working directory is read first if present.
    pub fn from_env() -> Result<Self> {
        if let Ok(path) = dotenv::dotenv() {
            debug!("Loaded environment from {}", path.display());
        }

        let defaults = Self::default();
        let config = Self {
            cleanup_interval: env_var(ENV_CLEANUP_INTERVAL)?
                .map(Duration::from_secs)
                .unwrap_or(defaults.cleanup_interval),
            grace_period: env_var(ENV_GRACE_PERIOD)?
                .map(Duration::from_secs)
                .unwrap_or(defaults.grace_period),
            ttl_jitter: env_var(ENV_TTL_JITTER)?.unwrap_or(defaults.ttl_jitter),
            enable_auto_cleanup: env_var(ENV_AUTO_CLEANUP)?
                .unwrap_or(defaults.enable_auto_cleanup),
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.cleanup_interval.is_zero() {
            return Err(CacheError::ConfigError(
                "cleanup_interval must be greater than 0".to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&self.ttl_jitter) {
            return Err(CacheError::ConfigError(
                "ttl_jitter must be between 0.0 and 1.0".to_string(),
            ));
        }

        Ok(())
    }

    /// Apply jitter to a TTL
    ///
    /// The result stays within `ttl * (1 ± ttl_jitter)`, whatever the TTL.
    pub fn ttl_with_jitter(&self, ttl: Duration) -> Duration {
        if self.ttl_jitter == 0.0 || ttl.is_zero() {
            return ttl;
        }

        let base_secs = ttl.as_secs_f64();
        let jitter_range = base_secs * self.ttl_jitter;
        let jitter = (rand::random::<f64>() * 2.0 - 1.0) * jitter_range;
        let final_secs =
            (base_secs + jitter).clamp(base_secs - jitter_range, base_secs + jitter_range);

        Duration::from_secs_f64(final_secs.max(0.0))
    }
}

fn env_var<T: std::str::FromStr>(name: &str) -> Result<Option<T>> {
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| CacheError::ConfigError(format!("{} has invalid value {:?}", name, raw))),
        Err(_) => Ok(None),
    }
}

/// Builder for cache configuration
#[derive(Debug, Default)]
pub struct CacheConfigBuilder {
    cleanup_interval: Option<Duration>,
    grace_period: Option<Duration>,
    ttl_jitter: Option<f64>,
    enable_auto_cleanup: Option<bool>,
}

impl CacheConfigBuilder {
    /// Set the cleanup sweep interval
    pub fn cleanup_interval(mut self, interval: Duration) -> Self {
        self.cleanup_interval = Some(interval);
        self
    }

    /// Set the grace period the sweep adds on top of each entry's stale window
    pub fn grace_period(mut self, grace: Duration) -> Self {
        self.grace_period = Some(grace);
        self
    }

    /// Set TTL jitter factor (0.0 - 1.0)
    pub fn ttl_jitter(mut self, jitter: f64) -> Self {
        self.ttl_jitter = Some(jitter);
        self
    }

    /// Enable or disable automatic cleanup
    pub fn enable_auto_cleanup(mut self, enable: bool) -> Self {
        self.enable_auto_cleanup = Some(enable);
        self
    }

    /// Build the cache configuration
    pub fn build(self) -> CacheConfig {
        let defaults = CacheConfig::default();

        CacheConfig {
            cleanup_interval: self.cleanup_interval.unwrap_or(defaults.cleanup_interval),
            grace_period: self.grace_period.unwrap_or(defaults.grace_period),
            ttl_jitter: self.ttl_jitter.unwrap_or(defaults.ttl_jitter),
            enable_auto_cleanup: self
                .enable_auto_cleanup
                .unwrap_or(defaults.enable_auto_cleanup),
        }
    }
}
