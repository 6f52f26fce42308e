// src/cache.rs
//! In-memory TTL cache for expensive lookups (source metadata, store audits).
//!
//! An entry is visible while `now - stored_at <= ttl`. Expired entries are
//! purged lazily on access and by a periodic sweeper task. When an insert of a
//! new key would exceed capacity, the oldest 10% of entries by `stored_at`
//! (at least one) are evicted first.

use anyhow::Result;
use metrics::counter;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;

use crate::config::CacheConfig;
use crate::metrics::ensure_metrics_described;

#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    pub value: V,
    pub stored_at: Instant,
    pub ttl: Duration,
}

impl<V> CacheEntry<V> {
    fn is_fresh(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.stored_at) <= self.ttl
    }
}

pub struct TtlCache<V> {
    name: &'static str,
    max_entries: usize,
    default_ttl: Duration,
    entries: Mutex<HashMap<String, CacheEntry<V>>>,
}

impl<V> TtlCache<V>
where
    V: Clone + Send + 'static,
{
    pub fn new(name: &'static str, max_entries: usize, default_ttl: Duration) -> Self {
        ensure_metrics_described();
        Self {
            name,
            max_entries: max_entries.max(1),
            default_ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_config(name: &'static str, cfg: &CacheConfig) -> Self {
        Self::new(name, cfg.max_entries, cfg.default_ttl())
    }

    pub fn get(&self, key: &str) -> Option<V> {
        let now = Instant::now();
        let mut map = self.lock();
        let hit = match map.get(key) {
            Some(e) if e.is_fresh(now) => Some(e.value.clone()),
            Some(_) => {
                map.remove(key);
                counter!("cache_evictions_total", "cache" => self.name).increment(1);
                None
            }
            None => None,
        };
        drop(map);
        if hit.is_some() {
            counter!("cache_hits_total", "cache" => self.name).increment(1);
        } else {
            counter!("cache_misses_total", "cache" => self.name).increment(1);
        }
        hit
    }

    /// Store `value` under `key`; `ttl` falls back to the cache default.
    pub fn set(&self, key: impl Into<String>, value: V, ttl: Option<Duration>) {
        let key = key.into();
        let mut map = self.lock();
        if !map.contains_key(&key) && map.len() >= self.max_entries {
            let evicted = self.evict_oldest(&mut map);
            debug!(target: "cache", cache = self.name, evicted, "capacity eviction");
        }
        map.insert(
            key,
            CacheEntry {
                value,
                stored_at: Instant::now(),
                ttl: ttl.unwrap_or(self.default_ttl),
            },
        );
    }

    /// Return the cached value, or compute, store and return it. Failed
    /// computations are not cached. Concurrent misses each compute.
    pub async fn cached<F, Fut>(&self, key: &str, ttl: Option<Duration>, compute: F) -> Result<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V>>,
    {
        if let Some(v) = self.get(key) {
            return Ok(v);
        }
        let value = compute().await?;
        self.set(key, value.clone(), ttl);
        Ok(value)
    }

    pub fn delete(&self, key: &str) -> bool {
        self.lock().remove(key).is_some()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Entries currently stored, expired ones included until purged.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every expired entry; returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut map = self.lock();
        let before = map.len();
        map.retain(|_, e| e.is_fresh(now));
        let removed = before - map.len();
        if removed > 0 {
            counter!("cache_evictions_total", "cache" => self.name).increment(removed as u64);
        }
        removed
    }

    fn evict_oldest(&self, map: &mut HashMap<String, CacheEntry<V>>) -> usize {
        let n = (self.max_entries / 10).max(1);
        let mut by_age: Vec<(Instant, String)> = map
            .iter()
            .map(|(k, e)| (e.stored_at, k.clone()))
            .collect();
        by_age.sort();
        for (_, k) in by_age.iter().take(n) {
            map.remove(k);
        }
        let evicted = n.min(by_age.len());
        counter!("cache_evictions_total", "cache" => self.name).increment(evicted as u64);
        evicted
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, CacheEntry<V>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<V> TtlCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Purge expired entries every `interval` until the cache is dropped.
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let weak = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // first tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(cache) = weak.upgrade() else {
                    break;
                };
                let removed = cache.purge_expired();
                if removed > 0 {
                    debug!(target: "cache", cache = cache.name, removed, "expired entries swept");
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use tokio::time::advance;

    #[tokio::test(start_paused = true)]
    async fn entries_expire_after_ttl() {
        let c: TtlCache<u32> = TtlCache::new("test", 10, Duration::from_secs(60));
        c.set("a", 1, Some(Duration::from_secs(1)));
        c.set("b", 2, None);
        assert_eq!(c.get("a"), Some(1));

        advance(Duration::from_millis(1_001)).await;
        assert_eq!(c.get("a"), None);
        assert_eq!(c.get("b"), Some(2));
        // lazily purged on access
        assert_eq!(c.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn capacity_evicts_oldest_first() {
        let c: TtlCache<usize> = TtlCache::new("test", 10, Duration::from_secs(600));
        for i in 0..10 {
            c.set(format!("k{i}"), i, None);
            advance(Duration::from_millis(10)).await;
        }
        // overwrite of an existing key never evicts
        c.set("k5", 50, None);
        assert_eq!(c.len(), 10);

        c.set("k10", 10, None);
        assert_eq!(c.len(), 10);
        assert_eq!(c.get("k0"), None);
        assert_eq!(c.get("k1"), Some(1));
        assert_eq!(c.get("k10"), Some(10));
    }

    #[tokio::test(start_paused = true)]
    async fn cached_computes_once_and_skips_failures() {
        let c: TtlCache<String> = TtlCache::new("test", 10, Duration::from_secs(60));
        let err = c
            .cached("x", None, || async { Err::<String, _>(anyhow!("store down")) })
            .await;
        assert!(err.is_err());
        assert!(c.is_empty());

        let v = c
            .cached("x", None, || async { Ok::<_, anyhow::Error>("fresh".to_string()) })
            .await
            .unwrap();
        assert_eq!(v, "fresh");
        let again = c
            .cached("x", None, || async { Ok::<_, anyhow::Error>("recomputed".to_string()) })
            .await
            .unwrap();
        assert_eq!(again, "fresh");
    }

    #[tokio::test(start_paused = true)]
    async fn sweeper_purges_in_background() {
        let c: Arc<TtlCache<u8>> = Arc::new(TtlCache::new("test", 10, Duration::from_secs(5)));
        c.set("a", 1, None);
        let handle = c.spawn_sweeper(Duration::from_secs(10));
        // let the sweeper start its interval at t=0
        tokio::task::yield_now().await;

        advance(Duration::from_secs(11)).await;
        tokio::task::yield_now().await;
        assert_eq!(c.len(), 0);

        drop(c);
        advance(Duration::from_secs(10)).await;
        handle.await.unwrap();
    }

    #[test]
    fn delete_and_clear() {
        let c: TtlCache<u8> = TtlCache::new("test", 10, Duration::from_secs(5));
        c.set("a", 1, None);
        c.set("b", 2, None);
        assert!(c.delete("a"));
        assert!(!c.delete("a"));
        c.clear();
        assert!(c.is_empty());
    }
}
