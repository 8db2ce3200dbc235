//! Cache entries and per-call freshness options

use crate::cache::types::Tag;
use chrono::{DateTime, Utc};
use std::any::Any;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Type-erased cached payload
pub(crate) type ErasedValue = Arc<dyn Any + Send + Sync>;

/// Freshness policy and tags for a single `get`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetOptions {
    /// Window after population during which an entry is fresh
    pub ttl: Duration,

    /// Window after `ttl` during which the entry is still served while it
    /// is refreshed in the background
    pub stale_while_revalidate: Option<Duration>,

    /// Labels attached to the stored entry
    pub tags: HashSet<Tag>,
}

impl GetOptions {
    /// Options with the given TTL, no stale window and no tags
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            stale_while_revalidate: None,
            tags: HashSet::new(),
        }
    }

    /// Options with a TTL given in whole seconds
    pub fn ttl_secs(secs: u64) -> Self {
        Self::new(Duration::from_secs(secs))
    }

    /// Serve stale data for this long past the TTL while revalidating
    pub fn stale_while_revalidate(mut self, window: Duration) -> Self {
        self.stale_while_revalidate = Some(window);
        self
    }

    /// Attach a tag
    pub fn tag(mut self, tag: impl Into<Tag>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    /// Attach several tags
    pub fn tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Tag>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }
}

/// Freshness of an entry at a given instant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EntryState {
    Fresh,
    Stale,
    Expired,
}

/// A cached value with the policy it was stored under
#[derive(Clone)]
pub struct CacheEntry {
    pub(crate) data: ErasedValue,

    /// When the entry was populated
    pub timestamp: DateTime<Utc>,

    /// Freshness window
    pub ttl: Duration,

    /// Widest stale window any call has applied to this key; the sweep
    /// keeps the entry at least this long past the TTL
    pub stale_bound: Duration,

    /// Labels used for bulk invalidation
    pub tags: HashSet<Tag>,

    /// Number of successful fetches stored under this key
    pub version: u64,

    type_name: &'static str,
}

impl CacheEntry {
    pub(crate) fn new<T>(
        data: Arc<T>,
        timestamp: DateTime<Utc>,
        ttl: Duration,
        options: &GetOptions,
    ) -> Self
    where
        T: Send + Sync + 'static,
    {
        Self {
            data,
            timestamp,
            ttl,
            stale_bound: options.stale_while_revalidate.unwrap_or(Duration::ZERO),
            tags: options.tags.clone(),
            version: 1,
            type_name: std::any::type_name::<T>(),
        }
    }

    /// Age of the entry at `now`
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        (now - self.timestamp)
            .to_std()
            .unwrap_or(Duration::from_secs(0))
    }

    /// Freshness at `now` for a read that accepts `stale_window` past the TTL
    pub(crate) fn state(&self, now: DateTime<Utc>, stale_window: Option<Duration>) -> EntryState {
        let age = self.age(now);
        if age < self.ttl {
            return EntryState::Fresh;
        }

        match stale_window {
            Some(window) if !window.is_zero() && age < self.ttl + window => EntryState::Stale,
            _ => EntryState::Expired,
        }
    }

    pub(crate) fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        self.age(now) < self.ttl
    }

    /// Grow the sweep bound to cover a read's stale window
    pub(crate) fn widen_stale_bound(&mut self, stale_window: Option<Duration>) {
        if let Some(window) = stale_window {
            self.stale_bound = self.stale_bound.max(window);
        }
    }

    /// Whether the entry is past `ttl + stale_bound + grace`
    pub fn is_dead(&self, now: DateTime<Utc>, grace: Duration) -> bool {
        self.age(now) > self.ttl + self.stale_bound + grace
    }

    /// Check if entry has a specific tag
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }

    /// Recover the typed payload
    pub fn value<T>(&self) -> Option<Arc<T>>
    where
        T: Send + Sync + 'static,
    {
        Arc::clone(&self.data).downcast::<T>().ok()
    }

    /// Name of the stored payload type
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }
}

impl fmt::Debug for CacheEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheEntry")
            .field("type", &self.type_name)
            .field("timestamp", &self.timestamp)
            .field("ttl", &self.ttl)
            .field("stale_bound", &self.stale_bound)
            .field("tags", &self.tags)
            .field("version", &self.version)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry_at(now: DateTime<Utc>, options: &GetOptions) -> CacheEntry {
        CacheEntry::new(Arc::new(42u64), now, options.ttl, options)
    }

    #[test]
    fn test_options_builder() {
        let options = GetOptions::ttl_secs(3600)
            .stale_while_revalidate(Duration::from_secs(60))
            .tag("analytics")
            .tags(["article:42", "analytics"]);

        assert_eq!(options.ttl, Duration::from_secs(3600));
        assert_eq!(options.stale_while_revalidate, Some(Duration::from_secs(60)));
        assert_eq!(options.tags.len(), 2);
        assert!(options.tags.contains("article:42"));
    }

    #[test]
    fn test_entry_state_transitions() {
        let start = Utc::now();
        let options = GetOptions::ttl_secs(1).stale_while_revalidate(Duration::from_secs(5));
        let entry = entry_at(start, &options);
        let window = options.stale_while_revalidate;

        assert_eq!(entry.state(start, window), EntryState::Fresh);
        assert_eq!(
            entry.state(start + chrono::Duration::milliseconds(999), window),
            EntryState::Fresh
        );
        assert_eq!(entry.state(start + chrono::Duration::seconds(1), window), EntryState::Stale);
        assert_eq!(entry.state(start + chrono::Duration::seconds(2), window), EntryState::Stale);
        assert_eq!(entry.state(start + chrono::Duration::seconds(6), window), EntryState::Expired);
    }

    #[test]
    fn test_entry_without_stale_window_expires_at_ttl() {
        let start = Utc::now();
        let entry = entry_at(start, &GetOptions::ttl_secs(1));

        assert_eq!(entry.state(start, None), EntryState::Fresh);
        assert!(entry.is_fresh(start));
        assert_eq!(entry.state(start + chrono::Duration::seconds(1), None), EntryState::Expired);
        assert!(!entry.is_fresh(start + chrono::Duration::seconds(1)));
    }

    #[test]
    fn test_stale_window_comes_from_the_read() {
        let start = Utc::now();
        let populated = GetOptions::ttl_secs(1).stale_while_revalidate(Duration::from_secs(5));
        let entry = entry_at(start, &populated);
        let later = start + chrono::Duration::seconds(2);

        // A read without a stale window does not inherit the populating one
        assert_eq!(entry.state(later, None), EntryState::Expired);
        assert_eq!(entry.state(later, Some(Duration::ZERO)), EntryState::Expired);
        assert_eq!(entry.state(later, Some(Duration::from_secs(5))), EntryState::Stale);
    }

    #[test]
    fn test_widen_stale_bound_only_grows() {
        let start = Utc::now();
        let mut entry = entry_at(start, &GetOptions::ttl_secs(1));
        assert_eq!(entry.stale_bound, Duration::ZERO);

        entry.widen_stale_bound(Some(Duration::from_secs(30)));
        entry.widen_stale_bound(Some(Duration::from_secs(5)));
        entry.widen_stale_bound(None);
        assert_eq!(entry.stale_bound, Duration::from_secs(30));

        let grace = Duration::from_secs(10);
        assert!(!entry.is_dead(start + chrono::Duration::seconds(41), grace));
        assert!(entry.is_dead(start + chrono::Duration::seconds(42), grace));
    }

    #[test]
    fn test_dead_after_grace() {
        let start = Utc::now();
        let options = GetOptions::ttl_secs(1).stale_while_revalidate(Duration::from_secs(5));
        let entry = entry_at(start, &options);
        let grace = Duration::from_secs(10);

        assert!(!entry.is_dead(start + chrono::Duration::seconds(16), grace));
        assert!(entry.is_dead(start + chrono::Duration::seconds(17), grace));
    }

    #[test]
    fn test_age_never_negative() {
        let start = Utc::now();
        let entry = entry_at(start, &GetOptions::ttl_secs(1));
        assert_eq!(entry.age(start - chrono::Duration::seconds(5)), Duration::ZERO);
    }

    #[test]
    fn test_typed_value() {
        let start = Utc::now();
        let entry = entry_at(start, &GetOptions::ttl_secs(1).tag("x"));

        assert_eq!(entry.value::<u64>().as_deref(), Some(&42));
        assert!(entry.value::<String>().is_none());
        assert!(entry.has_tag("x"));
        assert!(!entry.has_tag("y"));
        assert_eq!(entry.type_name(), "u64");
    }
}
