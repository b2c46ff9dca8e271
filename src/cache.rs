//! In-memory get-or-load cache with absolute expiry
//!
//! A miss runs the caller's async loader and caches the value for a fixed
//! duration. Loader failures are logged and reported as a miss; nothing is
//! cached for them.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt::Display;
use std::future::Future;
use std::time::{Duration, Instant};
use tracing::{error, info};

/// Lifetime used by [`TtlCache::get_or_load`]
pub const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);

/// Lifetime used by [`TtlCache::get_or_load_long`]
pub const LONG_TTL: Duration = Duration::from_secs(60 * 60);

struct CacheEntry<V> {
    value: V,
    expires_at: Instant,
}

pub struct TtlCache<V> {
    entries: Mutex<HashMap<String, CacheEntry<V>>>,
}

impl<V> Default for TtlCache<V> {
    fn default() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }
}

impl<V: Clone> TtlCache<V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached value for `key`, if present and not expired
    pub fn get(&self, key: &str) -> Option<V> {
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => return Some(entry.value.clone()),
            Some(_) => {}
            None => return None,
        }

        // Expired
        entries.remove(key);
        None
    }

    /// Get `key`, loading and caching it for five minutes on a miss
    pub async fn get_or_load<Fut, E>(&self, key: &str, load: impl FnOnce() -> Fut) -> Option<V>
    where
        Fut: Future<Output = Result<V, E>>,
        E: Display,
    {
        self.get_or_load_for(key, DEFAULT_TTL, load).await
    }

    /// Get `key`, loading and caching it for an hour on a miss
    pub async fn get_or_load_long<Fut, E>(
        &self,
        key: &str,
        load: impl FnOnce() -> Fut,
    ) -> Option<V>
    where
        Fut: Future<Output = Result<V, E>>,
        E: Display,
    {
        self.get_or_load_for(key, LONG_TTL, load).await
    }

    /// Get `key`, loading and caching it for `ttl` on a miss
    ///
    /// Concurrent misses on the same key may each run the loader; the last
    /// value to finish wins.
    pub async fn get_or_load_for<Fut, E>(
        &self,
        key: &str,
        ttl: Duration,
        load: impl FnOnce() -> Fut,
    ) -> Option<V>
    where
        Fut: Future<Output = Result<V, E>>,
        E: Display,
    {
        if let Some(value) = self.get(key) {
            return Some(value);
        }

        match load().await {
            Ok(value) => {
                self.entries.lock().insert(
                    key.to_string(),
                    CacheEntry {
                        value: value.clone(),
                        expires_at: Instant::now() + ttl,
                    },
                );
                Some(value)
            }
            Err(e) => {
                error!(cache_key = key, error = %e, "Error occurred while loading data for cache key");
                None
            }
        }
    }

    /// Remove `key`, returning whether an entry was present
    pub fn remove(&self, key: &str) -> bool {
        let removed = self.entries.lock().remove(key).is_some();
        if removed {
            info!(cache_key = key, "Cache entry has been removed");
        }
        removed
    }

    /// Number of entries, including expired ones not yet evicted
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
