//! Read-through cache with stale-while-revalidate and tag invalidation

use crate::cache::{
    cleanup::CleanupHandle,
    clock::{Clock, SystemClock},
    config::CacheConfig,
    entry::{CacheEntry, EntryState, ErasedValue, GetOptions},
    invalidation::{InvalidationEvent, InvalidationReason},
    types::{CacheKey, CacheRead, CacheStats, CacheStatus, Tag},
};
use crate::error::{into_fetch_error, CacheError, FetchError, Result};
use chrono::{DateTime, Utc};
use futures::future::{FutureExt, Shared};
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, RwLock};
use tracing::{debug, info, warn};

type FetchOutcome = std::result::Result<(ErasedValue, DateTime<Utc>), FetchError>;
type FetchChannel = Shared<oneshot::Receiver<FetchOutcome>>;

/// Read-through cache in front of an expensive upstream
///
/// Values are produced by caller-supplied fetchers. Each entry keeps the
/// `ttl` it was stored with, while the stale window comes from the
/// [`GetOptions`] of the reading call:
/// - within `ttl` the cached value is returned as is
/// - within `ttl + stale_while_revalidate` the cached value is returned and a
///   background refresh is started
/// - otherwise the caller waits on the fetcher
///
/// At most one fetch per key runs at any time; concurrent callers join it.
/// When a fetch fails, the last successfully fetched value is served if one
/// is still cached.
///
/// The cache is cheap to clone; clones share the same store.
#[derive(Clone)]
pub struct ReadThroughCache {
    config: CacheConfig,
    clock: Arc<dyn Clock>,
    store: Arc<RwLock<CacheStore>>,
}

/// Internal cache storage
#[derive(Default)]
struct CacheStore {
    /// Main storage: key -> entry
    entries: HashMap<CacheKey, CacheEntry>,

    /// Fetches that have not settled yet, at most one per key
    in_flight: HashMap<CacheKey, InFlight>,

    /// Running counters, bumped under either lock mode
    stats: Counters,
}

#[derive(Default)]
struct Counters {
    hits: AtomicU64,
    stale_hits: AtomicU64,
    misses: AtomicU64,
    fetches: AtomicU64,
    revalidations: AtomicU64,
    fetch_failures: AtomicU64,
    stale_fallbacks: AtomicU64,
    invalidations: AtomicU64,
    swept: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn add(counter: &AtomicU64, n: usize) {
        counter.fetch_add(n as u64, Ordering::Relaxed);
    }

    fn snapshot(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            stale_hits: self.stale_hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            fetches: self.fetches.load(Ordering::Relaxed),
            revalidations: self.revalidations.load(Ordering::Relaxed),
            fetch_failures: self.fetch_failures.load(Ordering::Relaxed),
            stale_fallbacks: self.stale_fallbacks.load(Ordering::Relaxed),
            invalidations: self.invalidations.load(Ordering::Relaxed),
            swept: self.swept.load(Ordering::Relaxed),
            ..CacheStats::default()
        }
    }
}

struct InFlight {
    channel: FetchChannel,
    tags: HashSet<Tag>,
    /// Set when the key was invalidated while fetching; the result is then
    /// handed to waiters but not stored
    superseded: bool,
}

impl ReadThroughCache {
    /// Create a new cache on the system clock
    pub fn new(config: CacheConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Create a cache driven by the given clock
    pub fn with_clock(config: CacheConfig, clock: Arc<dyn Clock>) -> Self {
        info!("Initializing read-through cache with config: {:?}", config);

        Self {
            config,
            clock,
            store: Arc::new(RwLock::new(CacheStore::default())),
        }
    }

    /// Create a cache and start its cleanup sweep if the configuration asks
    /// for it
    ///
    /// Must be called from within a tokio runtime.
    pub fn with_auto_cleanup(config: CacheConfig) -> (Self, Option<CleanupHandle>) {
        let cache = Self::new(config);
        let handle = cache
            .config
            .enable_auto_cleanup
            .then(|| cache.start_cleanup());
        (cache, handle)
    }

    /// Cache configuration
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Start the periodic cleanup sweep
    ///
    /// The sweep runs until the returned handle is shut down or dropped.
    pub fn start_cleanup(&self) -> CleanupHandle {
        CleanupHandle::spawn(self.clone())
    }

    /// Get the value for `key`, fetching it when the cache cannot serve it
    pub async fn get<T, F, Fut, E>(&self, key: &str, fetcher: F, options: GetOptions) -> Result<Arc<T>>
    where
        T: Send + Sync + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = std::result::Result<T, E>> + Send + 'static,
        E: Into<anyhow::Error> + Send + 'static,
    {
        self.get_with_status(key, fetcher, options)
            .await
            .map(CacheRead::into_value)
    }

    /// Like [`get`](Self::get), also reporting how the value was obtained
    pub async fn get_with_status<T, F, Fut, E>(
        &self,
        key: &str,
        fetcher: F,
        options: GetOptions,
    ) -> Result<CacheRead<T>>
    where
        T: Send + Sync + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = std::result::Result<T, E>> + Send + 'static,
        E: Into<anyhow::Error> + Send + 'static,
    {
        if key.is_empty() {
            return Err(CacheError::InvalidKey(key.to_string()));
        }

        let now = self.clock.now();

        // Fresh hits only need shared access
        {
            let store = self.store.read().await;
            if let Some(entry) = store.entries.get(key).filter(|entry| entry.is_fresh(now)) {
                return fresh_hit(&store, key, entry, now);
            }
        }

        let channel = {
            let mut store = self.store.write().await;
            let stale_window = options.stale_while_revalidate;

            let cached = store.entries.get_mut(key).map(|entry| {
                entry.widen_stale_bound(stale_window);
                (entry.state(now, stale_window), entry.age(now), entry.value::<T>())
            });

            match cached {
                Some((EntryState::Fresh, _, _)) => {
                    // Refreshed between the read and write lock
                    if let Some(entry) = store.entries.get(key) {
                        return fresh_hit(&store, key, entry, now);
                    }
                }
                Some((EntryState::Stale, age, value)) => {
                    let value = value.ok_or_else(|| type_mismatch::<T>(key))?;
                    Counters::bump(&store.stats.stale_hits);

                    if store.in_flight.contains_key(key) {
                        debug!("Stale hit, revalidation already running: {}", key);
                    } else {
                        debug!("Stale hit, revalidating in background: {}", key);
                        Counters::bump(&store.stats.revalidations);
                        // Detached: the stale value is this caller's answer
                        let _ = self.start_fetch(&mut store, key, fetcher, options);
                    }

                    return Ok(CacheRead {
                        value,
                        status: CacheStatus::Stale,
                        age,
                    });
                }
                Some((EntryState::Expired, _, _)) | None => {}
            }

            Counters::bump(&store.stats.misses);

            match store.in_flight.get(key) {
                Some(in_flight) => {
                    debug!("Cache miss, joining in-flight fetch: {}", key);
                    in_flight.channel.clone()
                }
                None => {
                    debug!("Cache miss: {}", key);
                    self.start_fetch(&mut store, key, fetcher, options)
                }
            }
        };

        match channel.await {
            Ok(Ok((value, stored_at))) => {
                let value = value
                    .downcast::<T>()
                    .map_err(|_| type_mismatch::<T>(key))?;
                Ok(CacheRead {
                    value,
                    status: CacheStatus::Fetched,
                    age: age_between(stored_at, self.clock.now()),
                })
            }
            Ok(Err(source)) => {
                self.fall_back(key, CacheError::fetch_failed(key, source))
                    .await
            }
            Err(_) => {
                self.fall_back(
                    key,
                    CacheError::FetchAborted {
                        key: key.to_string(),
                    },
                )
                .await
            }
        }
    }

    /// Remove every entry tagged with `tag`
    ///
    /// In-flight fetches carrying the tag still answer their waiters but are
    /// not stored.
    pub async fn invalidate(&self, tag: &str) -> InvalidationEvent {
        let mut store = self.store.write().await;

        let keys: Vec<CacheKey> = store
            .entries
            .iter()
            .filter(|(_, entry)| entry.has_tag(tag))
            .map(|(key, _)| key.clone())
            .collect();

        for key in &keys {
            store.entries.remove(key);
        }

        for in_flight in store.in_flight.values_mut() {
            if in_flight.tags.contains(tag) {
                in_flight.superseded = true;
            }
        }

        Counters::add(&store.stats.invalidations, keys.len());
        info!("Invalidated {} entries with tag: {}", keys.len(), tag);

        InvalidationEvent::new(
            InvalidationReason::TagMatch {
                tag: tag.to_string(),
            },
            keys,
            self.clock.now(),
        )
    }

    /// Remove the entry for `key`
    ///
    /// Returns `None` when no entry was cached. A fetch in flight for the key
    /// is superseded either way.
    pub async fn invalidate_key(&self, key: &str) -> Option<InvalidationEvent> {
        let mut store = self.store.write().await;

        let removed = store.entries.remove(key).is_some();
        if let Some(in_flight) = store.in_flight.get_mut(key) {
            in_flight.superseded = true;
        }

        if !removed {
            return None;
        }

        Counters::bump(&store.stats.invalidations);
        info!("Invalidated cache entry: {}", key);
        Some(InvalidationEvent::new(
            InvalidationReason::Manual,
            vec![key.to_string()],
            self.clock.now(),
        ))
    }

    /// Remove all entries
    pub async fn clear(&self) -> InvalidationEvent {
        let mut store = self.store.write().await;

        let keys: Vec<CacheKey> = store.entries.drain().map(|(key, _)| key).collect();
        for in_flight in store.in_flight.values_mut() {
            in_flight.superseded = true;
        }
        Counters::add(&store.stats.invalidations, keys.len());

        info!("Cleared {} entries from cache", keys.len());
        InvalidationEvent::new(InvalidationReason::Cleared, keys, self.clock.now())
    }

    /// Remove entries older than `ttl + stale_bound + grace_period`
    ///
    /// `stale_bound` is the widest stale window any read has applied to the
    /// entry, so entries those reads would still serve are never removed.
    pub async fn sweep_expired(&self) -> Option<InvalidationEvent> {
        let now = self.clock.now();
        let grace = self.config.grace_period;
        let mut store = self.store.write().await;

        let dead: Vec<CacheKey> = store
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_dead(now, grace))
            .map(|(key, _)| key.clone())
            .collect();

        if dead.is_empty() {
            return None;
        }

        for key in &dead {
            store.entries.remove(key);
        }
        Counters::add(&store.stats.swept, dead.len());

        debug!("Swept {} dead entries", dead.len());
        let context = format!("Swept {} entries past grace period {:?}", dead.len(), grace);
        Some(InvalidationEvent::new(InvalidationReason::Expired, dead, now).with_context(context))
    }

    /// Diagnostic snapshot: cached keys plus running counters
    pub async fn get_stats(&self) -> CacheStats {
        let store = self.store.read().await;

        let mut entries: Vec<CacheKey> = store.entries.keys().cloned().collect();
        entries.sort();

        CacheStats {
            size: entries.len(),
            entries,
            in_flight: store.in_flight.len(),
            ..store.stats.snapshot()
        }
    }

    /// Check if a key is cached, whatever its freshness
    pub async fn contains_key(&self, key: &str) -> bool {
        let store = self.store.read().await;
        store.entries.contains_key(key)
    }

    /// Get number of entries in cache
    pub async fn len(&self) -> usize {
        let store = self.store.read().await;
        store.entries.len()
    }

    /// Check if cache is empty
    pub async fn is_empty(&self) -> bool {
        let store = self.store.read().await;
        store.entries.is_empty()
    }

    /// Internal: register and spawn a fetch for `key`
    ///
    /// The caller holds the store lock and has checked that no fetch for the
    /// key is in flight.
    fn start_fetch<T, F, Fut, E>(
        &self,
        store: &mut CacheStore,
        key: &str,
        fetcher: F,
        options: GetOptions,
    ) -> FetchChannel
    where
        T: Send + Sync + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = std::result::Result<T, E>> + Send + 'static,
        E: Into<anyhow::Error> + Send + 'static,
    {
        let (sender, receiver) = oneshot::channel();
        let channel = receiver.shared();

        let evicted = store.in_flight.insert(
            key.to_string(),
            InFlight {
                channel: channel.clone(),
                tags: options.tags.clone(),
                superseded: false,
            },
        );
        debug_assert!(evicted.is_none());
        Counters::bump(&store.stats.fetches);

        let key = key.to_string();
        let ttl = self.config.ttl_with_jitter(options.ttl);
        let clock = Arc::clone(&self.clock);
        let shared_store = Arc::clone(&self.store);

        tokio::spawn(async move {
            let result = AssertUnwindSafe(async move { fetcher().await })
                .catch_unwind()
                .await;

            let result: std::result::Result<Arc<T>, FetchError> = match result {
                Ok(Ok(value)) => Ok(Arc::new(value)),
                Ok(Err(err)) => Err(into_fetch_error(err)),
                Err(_) => Err(into_fetch_error(anyhow::anyhow!("fetcher panicked"))),
            };

            let now = clock.now();
            let outcome = {
                let mut store = shared_store.write().await;
                let superseded = store
                    .in_flight
                    .remove(&key)
                    .map(|in_flight| in_flight.superseded)
                    .unwrap_or(true);

                match result {
                    Ok(value) => {
                        if superseded {
                            debug!("Discarding fetch result for invalidated key: {}", key);
                        } else {
                            let mut entry = CacheEntry::new(Arc::clone(&value), now, ttl, &options);
                            if let Some(previous) = store.entries.get(&key) {
                                entry.version = previous.version + 1;
                                entry.widen_stale_bound(Some(previous.stale_bound));
                            }
                            let version = entry.version;
                            store.entries.insert(key.clone(), entry);
                            debug!("Stored cache entry: {} (version {})", key, version);
                        }
                        Ok((value as ErasedValue, now))
                    }
                    Err(err) => {
                        Counters::bump(&store.stats.fetch_failures);
                        warn!("Fetch failed for {}: {}", key, err);
                        Err(err)
                    }
                }
            };

            // Waiters may all be gone, e.g. for a background revalidation
            sender.send(outcome).ok();
        });

        channel
    }

    /// Internal: serve the cached value after a failed fetch, if any
    async fn fall_back<T>(&self, key: &str, error: CacheError) -> Result<CacheRead<T>>
    where
        T: Send + Sync + 'static,
    {
        let now = self.clock.now();
        let store = self.store.read().await;

        let fallback = store
            .entries
            .get(key)
            .and_then(|entry| entry.value::<T>().map(|value| (value, entry.age(now))));

        match fallback {
            Some((value, age)) => {
                Counters::bump(&store.stats.stale_fallbacks);
                warn!("Serving stale value for {} ({:?} old): {}", key, age, error);
                Ok(CacheRead {
                    value,
                    status: CacheStatus::StaleFallback,
                    age,
                })
            }
            None => Err(error),
        }
    }
}

impl std::fmt::Debug for ReadThroughCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadThroughCache")
            .field("config", &self.config)
            .field("clock", &self.clock)
            .finish_non_exhaustive()
    }
}

fn fresh_hit<T>(
    store: &CacheStore,
    key: &str,
    entry: &CacheEntry,
    now: DateTime<Utc>,
) -> Result<CacheRead<T>>
where
    T: Send + Sync + 'static,
{
    let value = entry.value::<T>().ok_or_else(|| type_mismatch::<T>(key))?;
    Counters::bump(&store.stats.hits);
    debug!("Cache hit: {}", key);
    Ok(CacheRead {
        value,
        status: CacheStatus::Fresh,
        age: entry.age(now),
    })
}

fn type_mismatch<T>(key: &str) -> CacheError {
    CacheError::TypeMismatch {
        key: key.to_string(),
        expected: std::any::type_name::<T>(),
    }
}

fn age_between(from: DateTime<Utc>, to: DateTime<Utc>) -> Duration {
    (to - from).to_std().unwrap_or(Duration::ZERO)
}
