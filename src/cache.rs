//! Query result cache.
//!
//! Uses `moka::sync::Cache` keyed by normalized query, result count and
//! snapshot version. Publishing a new snapshot changes the version, so
//! stale entries are never served; they age out through the idle TTL or
//! the capacity bound. Failed computations are not cached.

use moka::sync::Cache;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use skill_index_core::tokenize::normalize_query;

use crate::config::CacheConfig;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub query: String,
    pub top_k: usize,
    pub version: u64,
}

impl CacheKey {
    pub fn new(query: &str, top_k: usize, version: u64) -> Self {
        Self {
            query: normalize_query(query),
            top_k,
            version,
        }
    }
}

pub struct QueryCache<V> {
    cache: Option<Cache<CacheKey, V>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<V> QueryCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    pub fn new(config: &CacheConfig) -> Self {
        let cache = config.enabled.then(|| {
            Cache::builder()
                .max_capacity(config.max_entries)
                .time_to_idle(Duration::from_secs(config.ttl_secs))
                .build()
        });
        Self {
            cache,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.cache.is_some()
    }

    /// Cached value for `key`, or the result of `compute`. The flag is
    /// `true` on a hit.
    pub async fn get_or_compute<F, Fut, E>(&self, key: CacheKey, compute: F) -> Result<(V, bool), E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        let Some(cache) = &self.cache else {
            return compute().await.map(|v| (v, false));
        };

        if let Some(v) = cache.get(&key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok((v, true));
        }
        self.misses.fetch_add(1, Ordering::Relaxed);

        let value = compute().await?;
        cache.insert(key, value.clone());
        Ok((value, false))
    }

    pub fn invalidate_all(&self) {
        if let Some(cache) = &self.cache {
            cache.invalidate_all();
        }
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }
}
