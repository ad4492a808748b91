//! In-memory LRU response cache with TTL expiry.
//!
//! Entries live in a slot arena threaded into a doubly linked recency list
//! (most recently used at the head). Neighbors are referenced by slot index
//! and vacated slots are recycled through a free list, so the structure has
//! no shared ownership and every list operation is O(1).
//!
//! Expired entries are dropped lazily by [`CacheManager::get`] and
//! [`CacheManager::has`], and proactively by a low-frequency sweeper task
//! started with [`CacheManager::start_sweeper`].
//!
//! All operations are synchronous. The internal mutex is never held across
//! an `.await`, so the cache can be shared freely between concurrent
//! requests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use regex::Regex;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

/// Default maximum number of entries.
pub const DEFAULT_CAPACITY: usize = 100;
/// Default time-to-live for entries inserted without an explicit TTL.
pub const DEFAULT_TTL: Duration = Duration::from_secs(30 * 60);
/// Default period of the passive expiry sweep.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Entries expiring within this window are reported by [`CacheManager::stats`].
const EXPIRING_SOON_WINDOW: Duration = Duration::from_secs(5 * 60);
const MOST_ACCESSED_LIMIT: usize = 5;
/// `expire_at` must stay strictly after `inserted_at`.
const MIN_TTL: Duration = Duration::from_millis(1);

/// Cache sizing and expiry settings.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Maximum number of entries held at once.
    pub capacity: usize,
    /// TTL applied when `set` is called without one.
    pub default_ttl: Duration,
    /// Period of the passive expiry sweep.
    pub sweep_interval: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            default_ttl: DEFAULT_TTL,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
        }
    }
}

impl CacheConfig {
    /// Config with the given capacity and default TTL.
    #[must_use]
    pub fn new(capacity: usize, default_ttl: Duration) -> Self {
        Self {
            capacity,
            default_ttl,
            ..Self::default()
        }
    }
}

/// A cached value with its expiry and access bookkeeping.
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    pub key: String,
    pub value: V,
    pub inserted_at: Instant,
    pub expire_at: Instant,
    pub access_count: u64,
    pub last_access_at: Instant,
}

impl<V> CacheEntry<V> {
    fn new(key: String, value: V, ttl: Duration, now: Instant) -> Self {
        Self {
            key,
            value,
            inserted_at: now,
            expire_at: now + ttl.max(MIN_TTL),
            access_count: 0,
            last_access_at: now,
        }
    }

    /// Whether the entry is stale at `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: Instant) -> bool {
        now >= self.expire_at
    }

    /// Time left before the entry goes stale.
    #[must_use]
    pub fn remaining(&self, now: Instant) -> Duration {
        self.expire_at.saturating_duration_since(now)
    }
}

// =============================================================================
// Slot arena + recency list
// =============================================================================

struct Slot<V> {
    entry: Option<CacheEntry<V>>,
    prev: Option<usize>,
    next: Option<usize>,
}

/// Index-linked recency list. `head` is most recently used, `tail` least.
struct LruList<V> {
    slots: Vec<Slot<V>>,
    free: Vec<usize>,
    index: HashMap<String, usize>,
    head: Option<usize>,
    tail: Option<usize>,
}

impl<V> LruList<V> {
    fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            index: HashMap::new(),
            head: None,
            tail: None,
        }
    }

    fn len(&self) -> usize {
        self.index.len()
    }

    fn slot_of(&self, key: &str) -> Option<usize> {
        self.index.get(key).copied()
    }

    fn entry(&self, idx: usize) -> Option<&CacheEntry<V>> {
        self.slots.get(idx).and_then(|slot| slot.entry.as_ref())
    }

    fn entry_mut(&mut self, idx: usize) -> Option<&mut CacheEntry<V>> {
        self.slots.get_mut(idx).and_then(|slot| slot.entry.as_mut())
    }

    fn unlink(&mut self, idx: usize) {
        let (prev, next) = (self.slots[idx].prev, self.slots[idx].next);
        match prev {
            Some(p) => self.slots[p].next = next,
            None => self.head = next,
        }
        match next {
            Some(n) => self.slots[n].prev = prev,
            None => self.tail = prev,
        }
        self.slots[idx].prev = None;
        self.slots[idx].next = None;
    }

    fn push_front(&mut self, idx: usize) {
        self.slots[idx].prev = None;
        self.slots[idx].next = self.head;
        if let Some(h) = self.head {
            self.slots[h].prev = Some(idx);
        }
        self.head = Some(idx);
        if self.tail.is_none() {
            self.tail = Some(idx);
        }
    }

    fn move_to_front(&mut self, idx: usize) {
        if self.head != Some(idx) {
            self.unlink(idx);
            self.push_front(idx);
        }
    }

    fn insert(&mut self, entry: CacheEntry<V>) {
        let key = entry.key.clone();
        let slot = Slot {
            entry: Some(entry),
            prev: None,
            next: None,
        };
        let idx = if let Some(idx) = self.free.pop() {
            self.slots[idx] = slot;
            idx
        } else {
            self.slots.push(slot);
            self.slots.len() - 1
        };
        self.push_front(idx);
        self.index.insert(key, idx);
    }

    fn remove(&mut self, key: &str) -> Option<CacheEntry<V>> {
        let idx = self.index.remove(key)?;
        self.unlink(idx);
        self.free.push(idx);
        self.slots[idx].entry.take()
    }

    fn pop_lru(&mut self) -> Option<CacheEntry<V>> {
        let key = self.entry(self.tail?)?.key.clone();
        self.remove(&key)
    }

    fn clear(&mut self) {
        self.slots.clear();
        self.free.clear();
        self.index.clear();
        self.head = None;
        self.tail = None;
    }

    /// Entries from most to least recently used.
    fn iter(&self) -> impl Iterator<Item = &CacheEntry<V>> + '_ {
        std::iter::successors(self.head, |&idx| self.slots[idx].next)
            .filter_map(|idx| self.entry(idx))
    }

    fn keys_matching(&self, mut pred: impl FnMut(&CacheEntry<V>) -> bool) -> Vec<String> {
        self.iter()
            .filter(|entry| pred(entry))
            .map(|entry| entry.key.clone())
            .collect()
    }
}

// =============================================================================
// Statistics
// =============================================================================

#[derive(Debug, Default)]
struct CacheCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    expirations: AtomicU64,
}

impl CacheCounters {
    fn bump(counter: &AtomicU64, by: u64) {
        counter.fetch_add(by, Ordering::Relaxed);
    }
}

/// Access count summary for one key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessSummary {
    pub key: String,
    pub access_count: u64,
}

/// Remaining lifetime summary for one key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpirySummary {
    pub key: String,
    pub expires_in: Duration,
}

/// Point-in-time cache statistics.
#[derive(Debug, Clone)]
pub struct CacheStats {
    pub size: usize,
    pub capacity: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub expirations: u64,
    /// Up to five keys with the highest access counts.
    pub most_accessed: Vec<AccessSummary>,
    /// Fresh keys that expire within five minutes.
    pub expiring_soon: Vec<ExpirySummary>,
}

impl CacheStats {
    /// Fraction of capacity in use, in percent.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn utilization_percent(&self) -> f64 {
        if self.capacity == 0 {
            return 0.0;
        }
        (self.size as f64 / self.capacity as f64) * 100.0
    }

    /// Hit ratio over all lookups so far.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

// =============================================================================
// Cache manager
// =============================================================================

/// Bounded key/value cache with strict LRU eviction and per-entry TTL.
pub struct CacheManager<V> {
    config: CacheConfig,
    list: Mutex<LruList<V>>,
    counters: CacheCounters,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl<V: Clone> CacheManager<V> {
    /// Create an empty cache. A capacity of zero is raised to one.
    #[must_use]
    pub fn new(config: CacheConfig) -> Self {
        let config = CacheConfig {
            capacity: config.capacity.max(1),
            ..config
        };
        Self {
            config,
            list: Mutex::new(LruList::new()),
            counters: CacheCounters::default(),
            sweeper: Mutex::new(None),
        }
    }

    fn lock(&self) -> MutexGuard<'_, LruList<V>> {
        self.list.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Configured maximum number of entries.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.config.capacity
    }

    /// TTL used when `set` receives none.
    #[must_use]
    pub const fn default_ttl(&self) -> Duration {
        self.config.default_ttl
    }

    /// Insert or replace `key`, expiring `ttl` (or the default TTL) from now.
    ///
    /// When the cache is full the least recently used entry is evicted first.
    pub fn set(&self, key: impl Into<String>, value: V, ttl: Option<Duration>) {
        let key = key.into();
        let ttl = ttl.unwrap_or(self.config.default_ttl);
        let now = Instant::now();

        let mut list = self.lock();
        list.remove(&key);
        if list.len() >= self.config.capacity {
            if let Some(evicted) = list.pop_lru() {
                CacheCounters::bump(&self.counters.evictions, 1);
                tracing::debug!(key = %evicted.key, "Evicted least recently used cache entry");
            }
        }
        list.insert(CacheEntry::new(key, value, ttl, now));
    }

    /// Fetch a fresh value and promote it to most recently used.
    ///
    /// A stale entry is removed and reported as absent.
    pub fn get(&self, key: &str) -> Option<V> {
        let now = Instant::now();
        let mut list = self.lock();

        let Some(idx) = list.slot_of(key) else {
            CacheCounters::bump(&self.counters.misses, 1);
            return None;
        };

        if list.entry(idx).is_none_or(|entry| entry.is_expired_at(now)) {
            list.remove(key);
            CacheCounters::bump(&self.counters.expirations, 1);
            CacheCounters::bump(&self.counters.misses, 1);
            return None;
        }

        list.move_to_front(idx);
        let entry = list.entry_mut(idx)?;
        entry.access_count += 1;
        entry.last_access_at = now;
        CacheCounters::bump(&self.counters.hits, 1);
        Some(entry.value.clone())
    }

    /// Whether a fresh entry exists. Does not change recency order.
    pub fn has(&self, key: &str) -> bool {
        let now = Instant::now();
        let mut list = self.lock();

        let Some(idx) = list.slot_of(key) else {
            return false;
        };
        if list.entry(idx).is_none_or(|entry| entry.is_expired_at(now)) {
            list.remove(key);
            CacheCounters::bump(&self.counters.expirations, 1);
            return false;
        }
        true
    }

    /// Snapshot of an entry's bookkeeping without touching recency or expiry.
    #[must_use]
    pub fn peek_entry(&self, key: &str) -> Option<CacheEntry<V>> {
        let list = self.lock();
        list.slot_of(key)
            .and_then(|idx| list.entry(idx))
            .cloned()
    }

    /// Remove `key`. Returns whether it was present.
    pub fn remove(&self, key: &str) -> bool {
        self.lock().remove(key).is_some()
    }

    /// Drop every entry and reset the arena.
    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Remove every key matching `pattern`. Returns the number removed.
    pub fn clear_by_pattern(&self, pattern: &Regex) -> usize {
        let mut list = self.lock();
        let keys = list.keys_matching(|entry| pattern.is_match(&entry.key));
        for key in &keys {
            list.remove(key);
        }
        keys.len()
    }

    /// Remove every entry that is already stale. Returns the number removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut list = self.lock();
        let keys = list.keys_matching(|entry| entry.is_expired_at(now));
        for key in &keys {
            list.remove(key);
        }
        CacheCounters::bump(&self.counters.expirations, keys.len() as u64);
        keys.len()
    }

    /// Number of entries currently held, including stale ones not yet reaped.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether the cache holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Keys from most to least recently used.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        self.lock().keys_matching(|_| true)
    }

    /// Current statistics.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        let now = Instant::now();
        let list = self.lock();

        let mut most_accessed: Vec<AccessSummary> = list
            .iter()
            .map(|entry| AccessSummary {
                key: entry.key.clone(),
                access_count: entry.access_count,
            })
            .collect();
        most_accessed.sort_by(|a, b| b.access_count.cmp(&a.access_count));
        most_accessed.truncate(MOST_ACCESSED_LIMIT);

        let expiring_soon = list
            .iter()
            .filter(|entry| !entry.is_expired_at(now) && entry.remaining(now) < EXPIRING_SOON_WINDOW)
            .map(|entry| ExpirySummary {
                key: entry.key.clone(),
                expires_in: entry.remaining(now),
            })
            .collect();

        CacheStats {
            size: list.len(),
            capacity: self.config.capacity,
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            evictions: self.counters.evictions.load(Ordering::Relaxed),
            expirations: self.counters.expirations.load(Ordering::Relaxed),
            most_accessed,
            expiring_soon,
        }
    }
}

impl<V: Clone + Send + 'static> CacheManager<V> {
    /// Start the passive expiry sweep on the current tokio runtime.
    ///
    /// The task holds only a weak reference and exits once the cache is
    /// dropped. Calling this twice is a no-op.
    pub fn start_sweeper(self: &Arc<Self>) {
        let mut slot = self.sweeper.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.is_some() {
            return;
        }
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            tracing::warn!("No tokio runtime; cache expiry sweep disabled");
            return;
        };

        let weak = Arc::downgrade(self);
        let period = self.config.sweep_interval.max(Duration::from_millis(10));
        *slot = Some(handle.spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(cache) = weak.upgrade() else {
                    break;
                };
                let purged = cache.purge_expired();
                if purged > 0 {
                    tracing::debug!(purged, "Swept expired cache entries");
                }
            }
        }));
    }

    /// Stop the sweeper and drop every entry.
    pub fn shutdown(&self) {
        self.stop_sweeper();
        self.clear();
    }
}

impl<V> CacheManager<V> {
    fn stop_sweeper(&self) {
        let handle = self
            .sweeper
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            handle.abort();
        }
    }
}

impl<V> Drop for CacheManager<V> {
    fn drop(&mut self) {
        self.stop_sweeper();
    }
}

impl<V> std::fmt::Debug for CacheManager<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheManager")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache(capacity: usize) -> CacheManager<String> {
        CacheManager::new(CacheConfig::new(capacity, Duration::from_secs(60)))
    }

    fn set(cache: &CacheManager<String>, key: &str) {
        cache.set(key, format!("value-{key}"), None);
    }

    #[tokio::test]
    async fn never_exceeds_capacity() {
        let cache = cache(3);
        for i in 0..20 {
            set(&cache, &format!("k{i}"));
            assert!(cache.len() <= 3);
        }
        assert_eq!(cache.keys(), vec!["k19", "k18", "k17"]);
        assert_eq!(cache.stats().evictions, 17);
    }

    #[tokio::test]
    async fn evicts_least_recently_inserted_without_access() {
        let cache = cache(2);
        set(&cache, "a");
        set(&cache, "b");
        set(&cache, "c");

        assert!(!cache.has("a"));
        assert!(cache.has("b"));
        assert!(cache.has("c"));
    }

    #[tokio::test]
    async fn get_promotes_entry_so_other_is_evicted() {
        let cache = cache(2);
        set(&cache, "a");
        set(&cache, "b");
        assert_eq!(cache.get("a").as_deref(), Some("value-a"));
        set(&cache, "c");

        assert!(cache.has("a"));
        assert!(!cache.has("b"));
        assert!(cache.has("c"));
    }

    #[tokio::test]
    async fn has_does_not_promote() {
        let cache = cache(2);
        set(&cache, "a");
        set(&cache, "b");
        assert!(cache.has("a"));
        set(&cache, "c");

        assert!(!cache.has("a"));
        assert!(cache.has("b"));
    }

    #[tokio::test]
    async fn replacing_a_key_does_not_evict_others() {
        let cache = cache(2);
        set(&cache, "a");
        set(&cache, "b");
        cache.set("a", "updated".to_string(), None);

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get("a").as_deref(), Some("updated"));
        assert!(cache.has("b"));
        assert_eq!(cache.keys(), vec!["a", "b"]);
    }

    #[tokio::test(start_paused = true)]
    async fn entry_expires_after_ttl() {
        let cache = cache(4);
        cache.set("k", "v".to_string(), Some(Duration::from_millis(100)));
        assert_eq!(cache.get("k").as_deref(), Some("v"));

        tokio::time::sleep(Duration::from_millis(150)).await;

        assert!(cache.get("k").is_none());
        assert!(!cache.has("k"));
        assert_eq!(cache.len(), 0, "stale entry removed on read");
    }

    #[tokio::test(start_paused = true)]
    async fn expiry_is_inclusive_of_deadline() {
        let cache = cache(4);
        cache.set("k", "v".to_string(), Some(Duration::from_millis(100)));
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(cache.get("k").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn zero_ttl_is_clamped_so_expiry_follows_insertion() {
        let cache = cache(4);
        cache.set("k", "v".to_string(), Some(Duration::ZERO));
        let entry = cache.peek_entry("k").unwrap();
        assert!(entry.expire_at > entry.inserted_at);
    }

    #[tokio::test]
    async fn get_tracks_access_count() {
        let cache = cache(4);
        set(&cache, "a");
        cache.get("a");
        cache.get("a");
        cache.get("missing");

        let entry = cache.peek_entry("a").unwrap();
        assert_eq!(entry.access_count, 2);
        assert!(entry.last_access_at >= entry.inserted_at);

        let stats = cache.stats();
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.most_accessed[0].key, "a");
    }

    #[tokio::test]
    async fn remove_and_clear() {
        let cache = cache(4);
        set(&cache, "a");
        set(&cache, "b");

        assert!(cache.remove("a"));
        assert!(!cache.remove("a"));
        assert_eq!(cache.len(), 1);

        cache.clear();
        assert!(cache.is_empty());
        assert!(cache.keys().is_empty());

        set(&cache, "c");
        assert_eq!(cache.keys(), vec!["c"]);
    }

    #[tokio::test]
    async fn freed_slots_are_reused() {
        let cache = cache(2);
        for i in 0..50 {
            set(&cache, &format!("k{i}"));
        }
        assert!(cache.lock().slots.len() <= 3);
    }

    #[tokio::test]
    async fn clear_by_pattern_removes_matching_keys() {
        let cache = cache(10);
        set(&cache, "GET:/products:{}");
        set(&cache, "GET:/products:{\"page\":2}");
        set(&cache, "GET:/orders:{}");

        let pattern = Regex::new("^GET:/products:").unwrap();
        assert_eq!(cache.clear_by_pattern(&pattern), 2);
        assert_eq!(cache.keys(), vec!["GET:/orders:{}"]);
    }

    #[tokio::test(start_paused = true)]
    async fn purge_expired_reaps_only_stale_entries() {
        let cache = cache(10);
        cache.set("short", "v".to_string(), Some(Duration::from_secs(1)));
        cache.set("long", "v".to_string(), Some(Duration::from_secs(600)));

        tokio::time::sleep(Duration::from_secs(2)).await;

        assert_eq!(cache.purge_expired(), 1);
        assert_eq!(cache.keys(), vec!["long"]);
    }

    #[tokio::test(start_paused = true)]
    async fn sweeper_reaps_entries_nobody_reads() {
        let cache = Arc::new(CacheManager::new(CacheConfig {
            capacity: 10,
            default_ttl: Duration::from_secs(1),
            sweep_interval: Duration::from_secs(60),
        }));
        cache.start_sweeper();
        cache.set("k", "v".to_string(), None);

        tokio::time::sleep(Duration::from_secs(61)).await;
        tokio::task::yield_now().await;

        assert_eq!(cache.len(), 0);
        cache.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn stats_report_expiring_soon() {
        let cache = cache(10);
        cache.set("soon", "v".to_string(), Some(Duration::from_secs(30)));
        cache.set("later", "v".to_string(), Some(Duration::from_secs(3600)));

        let stats = cache.stats();
        assert_eq!(stats.size, 2);
        assert_eq!(stats.expiring_soon.len(), 1);
        assert_eq!(stats.expiring_soon[0].key, "soon");
        assert!((stats.utilization_percent() - 20.0).abs() < f64::EPSILON);
    }
}
