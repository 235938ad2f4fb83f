//! Bounded LRU cache with per-entry expiration.
//!
//! Entries are evicted least-recently-used first once the capacity is
//! reached. Expired entries are removed lazily: a `get` on an expired entry
//! drops it and reports a miss.

use std::num::NonZeroUsize;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use lru::LruCache;

use super::CacheSettings;

#[derive(Debug, Clone)]
struct CachedEntry<V> {
    value: V,
    expires_at: Instant,
}

impl<V> CachedEntry<V> {
    fn new(value: V, ttl: Duration) -> Self {
        Self {
            value,
            expires_at: Instant::now() + ttl,
        }
    }

    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

/// Thread-safe key/value cache. Every operation is a single non-suspending
/// step, so it is safe to call from async code without holding the lock
/// across an await point.
pub struct TtlCache<V> {
    name: &'static str,
    entries: Mutex<LruCache<String, CachedEntry<V>>>,
    capacity: usize,
    ttl: Duration,
}

impl<V: Clone> TtlCache<V> {
    pub fn new(name: &'static str, settings: CacheSettings) -> Self {
        let capacity = NonZeroUsize::new(settings.capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            name,
            entries: Mutex::new(LruCache::new(capacity)),
            capacity: capacity.get(),
            ttl: settings.ttl,
        }
    }

    fn lock(&self) -> MutexGuard<'_, LruCache<String, CachedEntry<V>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Get a live entry, promoting it to most-recently-used.
    pub fn get(&self, key: &str) -> Option<V> {
        let mut entries = self.lock();
        match entries.get(key) {
            Some(entry) if !entry.is_expired() => Some(entry.value.clone()),
            Some(_) => {
                entries.pop(key);
                tracing::debug!(cache = self.name, key, "Cache entry expired");
                None
            }
            None => None,
        }
    }

    /// Store a value with the cache's default TTL.
    pub fn set(&self, key: impl Into<String>, value: V) {
        self.set_with_ttl(key, value, self.ttl);
    }

    /// Store a value with an explicit TTL (e.g. a credential's own expiry).
    pub fn set_with_ttl(&self, key: impl Into<String>, value: V, ttl: Duration) {
        let key = key.into();
        let mut entries = self.lock();
        if let Some((evicted, _)) = entries.push(key.clone(), CachedEntry::new(value, ttl)) {
            if evicted != key {
                tracing::debug!(cache = self.name, key = %evicted, "Evicted least recently used entry");
            }
        }
    }

    pub fn remove(&self, key: &str) -> Option<V> {
        self.lock().pop(key).map(|entry| entry.value)
    }

    /// Remove every entry whose key starts with `prefix`. Returns how many were removed.
    pub fn remove_prefix(&self, prefix: &str) -> usize {
        let mut entries = self.lock();
        let doomed: Vec<String> = entries
            .iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &doomed {
            entries.pop(key);
        }
        doomed.len()
    }

    /// Number of stored entries, including expired ones not yet collected.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&self) {
        self.lock().clear();
    }
}
