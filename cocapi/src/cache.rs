//! In-process TTL response cache.
//!
//! [`CacheStore`] maps [`CacheKey`]s to JSON payloads. Entries carry their
//! creation time and TTL; an entry is valid while `now < created_at + ttl`.
//! Expired entries are never returned. They are removed lazily when a lookup
//! finds them, or eagerly by [`CacheStore::cleanup_expired`].
//!
//! The store is internally synchronised and meant to be shared by reference
//! between every call issued from one client.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use cocapi_core::CacheKey;
use dashmap::DashMap;
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

#[derive(Debug, Clone)]
struct CacheEntry {
    value: Value,
    created_at: DateTime<Utc>,
    ttl: Duration,
    size: usize,
}

impl CacheEntry {
    fn new(value: Value, ttl: Duration) -> Self {
        let size = value.to_string().len();
        Self {
            value,
            created_at: Utc::now(),
            ttl,
            size,
        }
    }

    /// `None` when the TTL is too large to represent, i.e. never expires.
    fn expires_at(&self) -> Option<DateTime<Utc>> {
        chrono::Duration::from_std(self.ttl)
            .ok()
            .and_then(|ttl| self.created_at.checked_add_signed(ttl))
    }

    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at().is_some_and(|at| now >= at)
    }

    fn age(&self, now: DateTime<Utc>) -> Duration {
        (now - self.created_at).to_std().unwrap_or_default()
    }

    fn expires_in(&self, now: DateTime<Utc>) -> Duration {
        match self.expires_at() {
            Some(at) => (at - now).to_std().unwrap_or_default(),
            None => Duration::MAX,
        }
    }
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    sets: AtomicU64,
    expired: AtomicU64,
    evictions: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> CacheCounters {
        CacheCounters {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            sets: self.sets.load(Ordering::Relaxed),
            expired: self.expired.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }
}

/// Lifetime event counters of a [`CacheStore`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheCounters {
    /// Lookups answered from the cache.
    pub hits: u64,
    /// Lookups that found nothing valid, including expired entries.
    pub misses: u64,
    /// Successful writes.
    pub sets: u64,
    /// Entries removed because their TTL had passed.
    pub expired: u64,
    /// Entries removed by capacity pressure or explicit invalidation.
    pub evictions: u64,
}

/// Point-in-time statistics of a [`CacheStore`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheStats {
    /// Whether lookups and writes are active.
    pub enabled: bool,
    /// Entries currently held, valid or not.
    pub total_entries: usize,
    /// Entries that would be returned by a lookup now.
    pub valid_entries: usize,
    /// Entries held past their TTL, awaiting removal.
    pub expired_entries: usize,
    /// Rough memory used by keys and serialized payloads.
    pub approx_memory_bytes: usize,
    /// `hits / (hits + misses)` in percent, two decimals; 0 without lookups.
    pub hit_rate: f64,
    /// TTL applied by callers that do not pick one.
    #[serde(with = "humantime_serde")]
    pub default_ttl: Duration,
    /// Lifetime counters.
    pub counters: CacheCounters,
}

/// Details of a single cache entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntryInfo {
    /// Canonical key string.
    pub key: String,
    /// Configured lifetime.
    #[serde(with = "humantime_serde")]
    pub ttl: Duration,
    /// Time since the entry was written or touched.
    #[serde(with = "humantime_serde")]
    pub age: Duration,
    /// Remaining lifetime, zero once expired.
    #[serde(with = "humantime_serde")]
    pub expires_in: Duration,
    /// Whether the TTL has passed.
    pub is_expired: bool,
    /// Serialized payload length in bytes.
    pub size_estimate: usize,
    /// Write or last touch time.
    pub cached_at: DateTime<Utc>,
}

/// Thread-safe TTL cache of JSON responses.
#[derive(Debug)]
pub struct CacheStore {
    entries: DashMap<CacheKey, CacheEntry>,
    enabled: AtomicBool,
    default_ttl: RwLock<Duration>,
    max_entries: Option<usize>,
    counters: Counters,
}

enum Lookup {
    Hit(Value),
    Expired,
    Absent,
}

impl CacheStore {
    /// Creates an enabled, unbounded store.
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            enabled: AtomicBool::new(true),
            default_ttl: RwLock::new(default_ttl),
            max_entries: None,
            counters: Counters::default(),
        }
    }

    /// Bounds the number of entries. When full, a write evicts the oldest
    /// entry by creation time.
    pub fn with_max_entries(mut self, max_entries: Option<usize>) -> Self {
        self.max_entries = max_entries;
        self
    }

    /// Turns the store on.
    pub fn enable(&self) {
        self.enabled.store(true, Ordering::Relaxed);
    }

    /// Turns the store off. Existing entries are kept but not served.
    pub fn disable(&self) {
        self.enabled.store(false, Ordering::Relaxed);
    }

    /// Whether lookups and writes are active.
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    /// TTL used by the executor for new entries.
    pub fn default_ttl(&self) -> Duration {
        *self.default_ttl.read()
    }

    /// Changes the TTL for entries written from now on.
    pub fn set_default_ttl(&self, ttl: Duration) {
        *self.default_ttl.write() = ttl;
    }

    /// Number of entries held, valid or not.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no entries are held.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the cached value when a valid entry exists.
    ///
    /// An expired entry is removed and counted both as expired and as a miss.
    /// A disabled store always answers `None` and counts nothing.
    pub fn get(&self, key: &CacheKey) -> Option<Value> {
        if !self.is_enabled() {
            return None;
        }
        let now = Utc::now();
        let lookup = match self.entries.get(key) {
            Some(entry) if !entry.is_expired(now) => Lookup::Hit(entry.value.clone()),
            Some(_) => Lookup::Expired,
            None => Lookup::Absent,
        };
        match lookup {
            Lookup::Hit(value) => {
                self.counters.hits.fetch_add(1, Ordering::Relaxed);
                Some(value)
            }
            Lookup::Expired => {
                if self
                    .entries
                    .remove_if(key, |_, entry| entry.is_expired(now))
                    .is_some()
                {
                    self.counters.expired.fetch_add(1, Ordering::Relaxed);
                }
                debug!(%key, "cache entry expired");
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
            Lookup::Absent => {
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Stores a value, replacing any existing entry for the key.
    pub fn put(&self, key: CacheKey, value: Value, ttl: Duration) {
        if !self.is_enabled() {
            return;
        }
        if let Some(max) = self.max_entries
            && self.entries.len() >= max
            && !self.entries.contains_key(&key)
        {
            self.evict_oldest();
        }
        self.entries.insert(key, CacheEntry::new(value, ttl));
        self.counters.sets.fetch_add(1, Ordering::Relaxed);
    }

    fn evict_oldest(&self) {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|entry| entry.created_at)
            .map(|entry| entry.key().clone());
        if let Some(key) = oldest
            && self.entries.remove(&key).is_some()
        {
            debug!(%key, "cache entry evicted");
            self.counters.evictions.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Removes one entry. Returns whether it existed.
    pub fn invalidate(&self, key: &CacheKey) -> bool {
        let removed = self.entries.remove(key).is_some();
        if removed {
            self.counters.evictions.fetch_add(1, Ordering::Relaxed);
        }
        removed
    }

    /// Removes every entry and returns how many were held.
    pub fn clear(&self) -> usize {
        let count = self.entries.len();
        self.entries.clear();
        count
    }

    /// Removes expired entries and returns how many were dropped.
    pub fn cleanup_expired(&self) -> usize {
        let now = Utc::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        let removed = before.saturating_sub(self.entries.len());
        self.counters
            .expired
            .fetch_add(removed as u64, Ordering::Relaxed);
        removed
    }

    /// Adds `extra` to the TTL of an entry. Returns whether it existed.
    pub fn extend_ttl(&self, key: &CacheKey, extra: Duration) -> bool {
        match self.entries.get_mut(key) {
            Some(mut entry) => {
                entry.ttl = entry.ttl.saturating_add(extra);
                true
            }
            None => false,
        }
    }

    /// Restarts the lifetime of an entry without changing its TTL.
    pub fn touch(&self, key: &CacheKey) -> bool {
        match self.entries.get_mut(key) {
            Some(mut entry) => {
                entry.created_at = Utc::now();
                true
            }
            None => false,
        }
    }

    /// Describes one entry without counting a lookup.
    pub fn entry_info(&self, key: &CacheKey) -> Option<EntryInfo> {
        let now = Utc::now();
        self.entries
            .get(key)
            .map(|entry| Self::describe(entry.key(), entry.value(), now))
    }

    /// Describes every entry, soonest to expire first.
    pub fn entries_info(&self) -> Vec<EntryInfo> {
        let now = Utc::now();
        let mut entries: Vec<_> = self
            .entries
            .iter()
            .map(|entry| Self::describe(entry.key(), entry.value(), now))
            .collect();
        entries.sort_by_key(|info| info.expires_in);
        entries
    }

    fn describe(key: &CacheKey, entry: &CacheEntry, now: DateTime<Utc>) -> EntryInfo {
        EntryInfo {
            key: key.to_string(),
            ttl: entry.ttl,
            age: entry.age(now),
            expires_in: entry.expires_in(now),
            is_expired: entry.is_expired(now),
            size_estimate: entry.size,
            cached_at: entry.created_at,
        }
    }

    /// Current statistics.
    pub fn stats(&self) -> CacheStats {
        let now = Utc::now();
        let mut total_entries = 0;
        let mut expired_entries = 0;
        let mut approx_memory_bytes = 0;
        for entry in self.entries.iter() {
            total_entries += 1;
            if entry.is_expired(now) {
                expired_entries += 1;
            }
            approx_memory_bytes += entry.key().memory_size() + entry.size;
        }
        let counters = self.counters.snapshot();
        CacheStats {
            enabled: self.is_enabled(),
            total_entries,
            valid_entries: total_entries - expired_entries,
            expired_entries,
            approx_memory_bytes,
            hit_rate: hit_rate(counters.hits, counters.misses),
            default_ttl: self.default_ttl(),
            counters,
        }
    }
}

fn hit_rate(hits: u64, misses: u64) -> f64 {
    let lookups = hits + misses;
    if lookups == 0 {
        return 0.0;
    }
    (hits as f64 / lookups as f64 * 10_000.0).round() / 100.0
}
