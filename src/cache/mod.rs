//! Read-through query cache with lazy expiry and LRU eviction
//!
//! Entries expire lazily: an expired entry is only noticed (and dropped) when
//! it is read or pruned. When an insertion pushes the cache past `max_size`,
//! the least recently accessed entry is evicted.

use crate::config::CacheConfig;
use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

/// A cached value with its bookkeeping
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    pub key: String,
    pub value: V,
    pub inserted_at: Instant,
    pub expires_at: Instant,
    pub last_accessed_at: Instant,
    /// Monotonic access stamp driving LRU order
    access_seq: u64,
}

impl<V> CacheEntry<V> {
    pub fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// Hit/miss/eviction counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub size: usize,
}

#[derive(Debug)]
struct CacheInner<V> {
    entries: HashMap<String, CacheEntry<V>>,
    next_seq: u64,
    /// Access stamp at the last `prune` call
    pruned_at_seq: u64,
    hits: u64,
    misses: u64,
    evictions: u64,
}

/// Read-through cache in front of idempotent queries
#[derive(Debug)]
pub struct CacheManager<V> {
    enabled: bool,
    ttl: Duration,
    max_size: usize,
    inner: Mutex<CacheInner<V>>,
}

impl<V: Clone> CacheManager<V> {
    pub fn new(enabled: bool, ttl: Duration, max_size: usize) -> Self {
        Self {
            enabled,
            ttl,
            max_size: max_size.max(1),
            inner: Mutex::new(CacheInner {
                entries: HashMap::new(),
                next_seq: 0,
                pruned_at_seq: 0,
                hits: 0,
                misses: 0,
                evictions: 0,
            }),
        }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(config.enabled, config.ttl(), config.max_size)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Returns the live value stored under `key`
    pub fn get(&self, key: &str) -> Option<V> {
        if !self.enabled {
            return None;
        }

        let now = Instant::now();
        let mut guard = self.lock();
        let inner = &mut *guard;
        let seq = inner.bump();

        let expired = match inner.entries.get_mut(key) {
            Some(entry) if !entry.is_expired(now) => {
                entry.last_accessed_at = now;
                entry.access_seq = seq;
                let value = entry.value.clone();
                inner.hits += 1;
                return Some(value);
            }
            Some(_) => true,
            None => false,
        };

        if expired {
            inner.entries.remove(key);
        }
        inner.misses += 1;
        None
    }

    /// Inserts or refreshes `key`, evicting the least recently used entry when full
    pub fn set(&self, key: impl Into<String>, value: V, ttl: Option<Duration>) {
        if !self.enabled {
            return;
        }

        let key = key.into();
        let now = Instant::now();
        let ttl = ttl.unwrap_or(self.ttl);
        let mut inner = self.lock();
        let seq = inner.bump();

        inner.entries.insert(
            key.clone(),
            CacheEntry {
                key,
                value,
                inserted_at: now,
                expires_at: now + ttl,
                last_accessed_at: now,
                access_seq: seq,
            },
        );

        while inner.entries.len() > self.max_size {
            let victim = inner
                .entries
                .values()
                .min_by_key(|entry| entry.access_seq)
                .map(|entry| entry.key.clone());

            match victim {
                Some(victim) => {
                    inner.entries.remove(&victim);
                    inner.evictions += 1;
                    tracing::debug!(key = %victim, "Evicted least recently used cache entry");
                }
                None => break,
            }
        }
    }

    /// Returns the cached value for `key`, or produces, stores and returns it
    ///
    /// `producer` is never invoked on a hit.
    pub async fn fetch<F, Fut>(&self, key: &str, ttl: Option<Duration>, producer: F) -> V
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = V>,
    {
        self.fetch_if(key, ttl, producer, |_| true).await
    }

    /// Like `fetch`, but stores the produced value only if `cacheable` accepts it
    pub async fn fetch_if<F, Fut, P>(
        &self,
        key: &str,
        ttl: Option<Duration>,
        producer: F,
        cacheable: P,
    ) -> V
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = V>,
        P: FnOnce(&V) -> bool,
    {
        if let Some(value) = self.get(key) {
            tracing::debug!(key, "Cache hit");
            return value;
        }

        let value = producer().await;
        if cacheable(&value) {
            self.set(key, value.clone(), ttl);
        }
        value
    }

    /// Pre-populates the keys not already cached
    ///
    /// Returns the number of keys produced.
    pub async fn warmup<I, F, Fut>(&self, keys: I, producer: F) -> usize
    where
        I: IntoIterator<Item = String>,
        F: Fn(String) -> Fut,
        Fut: Future<Output = V>,
    {
        let mut produced = 0;
        for key in keys {
            if self.contains(&key) {
                continue;
            }
            let value = producer(key.clone()).await;
            self.set(key, value, None);
            produced += 1;
        }
        produced
    }

    /// Checks for a live entry without counting a hit or touching LRU order
    pub fn contains(&self, key: &str) -> bool {
        let now = Instant::now();
        self.lock()
            .entries
            .get(key)
            .is_some_and(|entry| !entry.is_expired(now))
    }

    /// Removes entries not accessed since the previous prune, and expired ones
    ///
    /// Returns the number of entries removed.
    pub fn prune(&self) -> usize {
        let now = Instant::now();
        let mut inner = self.lock();
        let threshold = inner.pruned_at_seq;
        let before = inner.entries.len();

        inner
            .entries
            .retain(|_, entry| entry.access_seq >= threshold && !entry.is_expired(now));
        inner.pruned_at_seq = inner.next_seq;

        let removed = before - inner.entries.len();
        if removed > 0 {
            tracing::debug!(removed, "Pruned cache");
        }
        removed
    }

    pub fn invalidate(&self, key: &str) -> bool {
        self.lock().entries.remove(key).is_some()
    }

    pub fn clear(&self) {
        self.lock().entries.clear();
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.lock();
        CacheStats {
            hits: inner.hits,
            misses: inner.misses,
            evictions: inner.evictions,
            size: inner.entries.len(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, CacheInner<V>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<V> CacheInner<V> {
    fn bump(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }
}
