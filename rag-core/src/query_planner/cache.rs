//! The query result cache: LRU + TTL, keyed by a SHA-256 of a normalized
//! JSON key. Independent of, and structurally identical in shape to,
//! [`crate::embedding::cache::EmbeddingCache`]'s cache (that one caches
//! embeddings; this one caches rendered results).

use lru::LruCache;
use parking_lot::Mutex;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

/// The fields that determine whether two queries are cache-equivalent.
/// `date_bucket` carries the reference date string when the `Time`
/// modifier is active, or the literal `"static"` otherwise, so
/// time-sensitive and time-insensitive queries never collide.
#[derive(Debug, Clone, Serialize)]
pub struct QueryCacheKey<'a> {
    pub user: &'a str,
    pub ai: &'a str,
    pub diary: &'a str,
    pub mods: &'a str,
    pub chain: Option<&'a str>,
    pub k_seq: &'a [usize],
    pub group: bool,
    pub auto: bool,
    pub date_bucket: &'a str,
}

/// SHA-256 hex digest of `key`'s canonical JSON form.
#[must_use]
pub fn hash_key(key: &QueryCacheKey<'_>) -> String {
    let json = serde_json::to_vec(key).unwrap_or_default();
    let mut hasher = Sha256::new();
    hasher.update(&json);
    format!("{:x}", hasher.finalize())
}

struct Entry {
    value: String,
    expires_at: Instant,
}

/// Hit/miss counters, mirroring [`crate::embedding::cache::EmbeddingCacheMetrics`].
#[derive(Debug, Default, Clone, Copy)]
pub struct QueryCacheMetrics {
    pub hits: u64,
    pub misses: u64,
}

impl QueryCacheMetrics {
    #[must_use]
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// A bounded, TTL-expiring cache of rendered placeholder substitutions.
pub struct QueryResultCache {
    entries: Mutex<LruCache<String, Entry>>,
    ttl: Duration,
    metrics: Mutex<QueryCacheMetrics>,
    /// A version token; bumping it (via [`QueryResultCache::invalidate_all`])
    /// logically clears the cache without reallocating it, matching
    /// "cleared when `rag_tags` config hash changes".
    generation: Mutex<u64>,
}

impl QueryResultCache {
    /// A cache holding up to `max_size` entries, each valid for `ttl_ms`.
    #[must_use]
    pub fn new(max_size: usize, ttl_ms: u64) -> Self {
        let capacity = NonZeroUsize::new(max_size.max(1)).unwrap();
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            ttl: Duration::from_millis(ttl_ms),
            metrics: Mutex::new(QueryCacheMetrics::default()),
            generation: Mutex::new(0),
        }
    }

    /// Look up `key`'s hashed form; returns `None` on miss or expiry.
    #[must_use]
    pub fn get(&self, key: &QueryCacheKey<'_>) -> Option<String> {
        let hashed = hash_key(key);
        let mut entries = self.entries.lock();
        let mut metrics = self.metrics.lock();
        match entries.get(&hashed) {
            Some(entry) if entry.expires_at > Instant::now() => {
                metrics.hits += 1;
                Some(entry.value.clone())
            }
            Some(_) => {
                entries.pop(&hashed);
                metrics.misses += 1;
                None
            }
            None => {
                metrics.misses += 1;
                None
            }
        }
    }

    /// Insert a rendered result under `key`'s hashed form.
    pub fn put(&self, key: &QueryCacheKey<'_>, value: String) {
        let hashed = hash_key(key);
        self.entries.lock().put(
            hashed,
            Entry {
                value,
                expires_at: Instant::now() + self.ttl,
            },
        );
    }

    /// Drop every cached entry, e.g. when the configured tag list changes.
    pub fn invalidate_all(&self) {
        self.entries.lock().clear();
        *self.generation.lock() += 1;
    }

    /// Current hit/miss counters.
    #[must_use]
    pub fn metrics(&self) -> QueryCacheMetrics {
        *self.metrics.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key<'a>(user: &'a str) -> QueryCacheKey<'a> {
        QueryCacheKey {
            user,
            ai: "ai",
            diary: "工作",
            mods: "",
            chain: None,
            k_seq: &[],
            group: false,
            auto: false,
            date_bucket: "static",
        }
    }

    #[test]
    fn put_then_get_hits() {
        let cache = QueryResultCache::new(10, 60_000);
        cache.put(&key("hello"), "result".to_string());
        assert_eq!(cache.get(&key("hello")), Some("result".to_string()));
        assert_eq!(cache.metrics().hits, 1);
    }

    #[test]
    fn expired_entry_is_a_miss() {
        let cache = QueryResultCache::new(10, 0);
        cache.put(&key("hello"), "result".to_string());
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(cache.get(&key("hello")), None);
    }

    #[test]
    fn invalidate_all_clears_entries() {
        let cache = QueryResultCache::new(10, 60_000);
        cache.put(&key("hello"), "result".to_string());
        cache.invalidate_all();
        assert_eq!(cache.get(&key("hello")), None);
    }

    #[test]
    fn different_date_buckets_are_distinct_keys() {
        let mut a = key("hello");
        a.date_bucket = "2026-07-28";
        let mut b = key("hello");
        b.date_bucket = "2026-07-29";
        assert_ne!(hash_key(&a), hash_key(&b));
    }
}
