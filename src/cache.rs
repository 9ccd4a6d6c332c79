//! In-memory cache-aside store for origin lookups.
//!
//! Each entry carries its own expiry, so different resource families can share
//! one cache with different TTLs. "Not found" results are ordinary values
//! (usually `None` or an empty list) and are cached like any other.
//!
//! Concurrent misses on the same key are not deduplicated: both callers run
//! `compute` and the last writer wins.

use std::collections::HashMap;
use std::future::Future;
use std::sync::RwLock;
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

/// TTL for successful origin lookups.
pub const SUCCESS_TTL: Duration = Duration::from_secs(30 * 60);

/// TTL for results produced by a transient failure.
pub const FAILURE_TTL: Duration = Duration::from_secs(30);

/// TTL for general metadata-provider lookups.
pub const PROVIDER_TTL: Duration = Duration::from_secs(60 * 60);

/// Prune expired entries once the map grows past this.
const PRUNE_THRESHOLD: usize = 256;

struct CacheEntry<V> {
    value: V,
    expires_at: Instant,
}

impl<V: Clone> CacheEntry<V> {
    fn new(value: V, ttl: Duration) -> Self {
        Self {
            value,
            expires_at: Instant::now() + ttl,
        }
    }

    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }

    fn get(&self) -> Option<V> {
        if self.is_expired() {
            None
        } else {
            Some(self.value.clone())
        }
    }
}

/// Result of a `compute` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheFill<V> {
    /// Authoritative result, kept for the caller's TTL.
    Value(V),
    /// Fallback produced by a transient failure, kept for the failure TTL.
    Transient(V),
}

impl<V> CacheFill<V> {
    pub fn into_inner(self) -> V {
        match self {
            CacheFill::Value(v) | CacheFill::Transient(v) => v,
        }
    }
}

/// String-keyed TTL cache.
pub struct ResponseCache<V> {
    entries: RwLock<HashMap<String, CacheEntry<V>>>,
    failure_ttl: Duration,
}

impl<V: Clone> ResponseCache<V> {
    pub fn new(failure_ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            failure_ttl,
        }
    }

    /// Cached value for `key`, or None if expired/missing.
    pub fn get(&self, key: &str) -> Option<V> {
        self.entries
            .read()
            .ok()
            .and_then(|guard| guard.get(key).and_then(|e| e.get()))
    }

    /// Store `value` under `key` for `ttl`.
    pub fn insert(&self, key: impl Into<String>, value: V, ttl: Duration) {
        if let Ok(mut guard) = self.entries.write() {
            guard.insert(key.into(), CacheEntry::new(value, ttl));
            if guard.len() > PRUNE_THRESHOLD {
                guard.retain(|_, entry| !entry.is_expired());
            }
        }
    }

    /// Return the live value for `key`, or run `compute` and store its result.
    ///
    /// [`CacheFill::Value`] is kept for `ttl`; [`CacheFill::Transient`] for the
    /// cache's failure TTL. Errors are returned uncached.
    pub async fn get_or_compute<F, Fut, E>(
        &self,
        key: &str,
        ttl: Duration,
        compute: F,
    ) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<CacheFill<V>, E>>,
    {
        if let Some(value) = self.get(key) {
            debug!("Cache hit: {}", key);
            return Ok(value);
        }

        debug!("Cache miss: {}", key);
        let (value, ttl) = match compute().await? {
            CacheFill::Value(v) => (v, ttl),
            CacheFill::Transient(v) => (v, self.failure_ttl),
        };
        self.insert(key, value.clone(), ttl);
        Ok(value)
    }

    /// Drop one key.
    pub fn invalidate(&self, key: &str) {
        if let Ok(mut guard) = self.entries.write() {
            guard.remove(key);
        }
    }

    /// Drop everything.
    pub fn clear(&self) {
        if let Ok(mut guard) = self.entries.write() {
            guard.clear();
        }
    }

    /// Number of stored entries, expired ones included until pruned.
    pub fn len(&self) -> usize {
        self.entries.read().map(|guard| guard.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<V: Clone> Default for ResponseCache<V> {
    fn default() -> Self {
        Self::new(FAILURE_TTL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::convert::Infallible;
    use std::sync::atomic::{AtomicUsize, Ordering};

    async fn lookup(
        cache: &ResponseCache<Option<String>>,
        calls: &AtomicUsize,
        key: &str,
        fill: CacheFill<Option<String>>,
    ) -> Option<String> {
        cache
            .get_or_compute(key, SUCCESS_TTL, move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, Infallible>(fill)
            })
            .await
            .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_compute_once_within_ttl() {
        let cache = ResponseCache::default();
        let calls = AtomicUsize::new(0);
        let fill = || CacheFill::Value(Some("movie".to_string()));

        assert_eq!(
            lookup(&cache, &calls, "subject_1", fill()).await,
            Some("movie".to_string())
        );
        tokio::time::advance(SUCCESS_TTL - Duration::from_secs(1)).await;
        lookup(&cache, &calls, "subject_1", fill()).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        tokio::time::advance(Duration::from_secs(1)).await;
        lookup(&cache, &calls, "subject_1", fill()).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_not_found_is_cached() {
        let cache = ResponseCache::default();
        let calls = AtomicUsize::new(0);

        assert_eq!(
            lookup(&cache, &calls, "subject_404", CacheFill::Value(None)).await,
            None
        );
        assert_eq!(
            lookup(&cache, &calls, "subject_404", CacheFill::Value(None)).await,
            None
        );
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_uses_short_ttl() {
        let cache = ResponseCache::new(Duration::from_secs(30));
        let calls = AtomicUsize::new(0);

        lookup(&cache, &calls, "search_x", CacheFill::Transient(None)).await;
        lookup(&cache, &calls, "search_x", CacheFill::Transient(None)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        tokio::time::advance(Duration::from_secs(30)).await;
        lookup(&cache, &calls, "search_x", CacheFill::Value(None)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_errors_are_not_cached() {
        let cache: ResponseCache<u32> = ResponseCache::default();

        let first: Result<u32, &str> = cache
            .get_or_compute("k", SUCCESS_TTL, || async { Err("boom") })
            .await;
        assert_eq!(first, Err("boom"));
        assert!(cache.is_empty());

        let second: Result<u32, &str> = cache
            .get_or_compute("k", SUCCESS_TTL, || async { Ok(CacheFill::Value(7)) })
            .await;
        assert_eq!(second, Ok(7));
        assert_eq!(cache.get("k"), Some(7));
    }

    #[tokio::test]
    async fn test_keys_are_independent() {
        let cache = ResponseCache::default();
        cache.insert("search_a", 1, SUCCESS_TTL);
        cache.insert("subject_a", 2, PROVIDER_TTL);

        assert_eq!(cache.get("search_a"), Some(1));
        assert_eq!(cache.get("subject_a"), Some(2));

        cache.invalidate("search_a");
        assert_eq!(cache.get("search_a"), None);
        assert_eq!(cache.len(), 1);

        cache.clear();
        assert!(cache.is_empty());
    }
}
