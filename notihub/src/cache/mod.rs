//! Key/value cache with per-entry TTL.
//!
//! The dispatch pipeline only uses the cache for dedup marks, so the contract
//! is small and synchronous. [`MemoryCache`] is the in-process implementation.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use serde_json::Value;
use tokio::time::Instant;
use tracing::debug;

/// Default TTL for entries written without an explicit TTL.
const DEFAULT_TTL: Duration = Duration::from_secs(60);

/// Default maximum number of live entries.
const DEFAULT_MAX_ENTRIES: usize = 1000;

/// Expiry horizon used when `now + ttl` does not fit in an `Instant`.
const FAR_FUTURE: Duration = Duration::from_secs(30 * 365 * 24 * 60 * 60);

/// Cache contract consumed by the dedup gate.
///
/// Expired entries are invisible to every operation.
pub trait Cache: Send + Sync {
    fn get(&self, key: &str) -> Option<Value>;

    /// Store `value` under `key`. `None` uses the cache's default TTL.
    fn set(&self, key: &str, value: Value, ttl: Option<Duration>);

    fn has(&self, key: &str) -> bool;

    fn delete(&self, key: &str);

    fn clear(&self);

    fn keys(&self) -> Vec<String>;
}

#[derive(Debug, Clone)]
struct CacheEntry {
    value: Value,
    expires_at: Instant,
    /// Access tick for LRU eviction; larger is more recent.
    last_used: u64,
}

impl CacheEntry {
    fn new(value: Value, ttl: Duration, tick: u64) -> Self {
        let now = Instant::now();
        let expires_at = now
            .checked_add(ttl)
            .or_else(|| now.checked_add(FAR_FUTURE))
            .unwrap_or(now);
        Self {
            value,
            expires_at,
            last_used: tick,
        }
    }

    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

/// Bounded in-memory LRU cache backed by `DashMap`.
///
/// When full, expired entries are purged first; if that frees nothing the
/// least recently read or written entry is evicted. `has` does not count as
/// a use.
#[derive(Clone)]
pub struct MemoryCache {
    entries: Arc<DashMap<String, CacheEntry>>,
    default_ttl: Duration,
    max_entries: usize,
    tick: Arc<AtomicU64>,
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ENTRIES, DEFAULT_TTL)
    }
}

impl MemoryCache {
    pub fn new(max_entries: usize, default_ttl: Duration) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            default_ttl,
            max_entries: max_entries.max(1),
            tick: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Number of stored entries, including ones that expired but were not purged yet.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Remove all expired entries, returning how many were dropped.
    pub fn cleanup_expired(&self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired());
        before.saturating_sub(self.entries.len())
    }

    fn next_tick(&self) -> u64 {
        self.tick.fetch_add(1, Ordering::Relaxed)
    }

    /// Drop `key` only if the stored entry is still expired. A concurrent
    /// `set` may have replaced it since the caller looked.
    fn remove_expired(&self, key: &str) {
        self.entries.remove_if(key, |_, entry| entry.is_expired());
    }

    fn make_room(&self) {
        if self.entries.len() < self.max_entries {
            return;
        }

        if self.cleanup_expired() > 0 && self.entries.len() < self.max_entries {
            return;
        }

        let victim = self
            .entries
            .iter()
            .min_by_key(|e| e.last_used)
            .map(|e| e.key().clone());
        if let Some(key) = victim {
            debug!(key = %key, "Cache full, evicting least recently used entry");
            self.entries.remove(&key);
        }
    }
}

impl Cache for MemoryCache {
    fn get(&self, key: &str) -> Option<Value> {
        match self.entries.get_mut(key) {
            None => return None,
            Some(mut entry) if !entry.is_expired() => {
                entry.last_used = self.next_tick();
                return Some(entry.value.clone());
            }
            Some(_) => {}
        }

        self.remove_expired(key);
        None
    }

    fn set(&self, key: &str, value: Value, ttl: Option<Duration>) {
        if !self.entries.contains_key(key) {
            self.make_room();
        }
        let entry = CacheEntry::new(value, ttl.unwrap_or(self.default_ttl), self.next_tick());
        self.entries.insert(key.to_string(), entry);
    }

    fn has(&self, key: &str) -> bool {
        let live = match self.entries.get(key) {
            None => return false,
            Some(entry) => !entry.is_expired(),
        };
        if !live {
            self.remove_expired(key);
        }
        live
    }

    fn delete(&self, key: &str) {
        self.entries.remove(key);
    }

    fn clear(&self) {
        self.entries.clear();
    }

    fn keys(&self) -> Vec<String> {
        self.entries
            .iter()
            .filter(|e| !e.is_expired())
            .map(|e| e.key().clone())
            .collect()
    }
}
