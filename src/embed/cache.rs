//! Query Embedding Cache: a bounded LRU from the SHA-256 hex digest of the
//! raw query bytes to its embedding vector, with atomic hit/miss counters.

use lru::LruCache;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};

pub struct QueryEmbeddingCache {
    inner: Mutex<LruCache<String, Vec<f32>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

fn digest(query: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(query.as_bytes());
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

impl QueryEmbeddingCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap();
        Self {
            inner: Mutex::new(LruCache::new(capacity)),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Returns the cached vector for `query` if present, recording a hit or
    /// miss as appropriate. Does not itself call the embedder; callers use
    /// this to decide whether `insert` is needed.
    pub fn get(&self, query: &str) -> Option<Vec<f32>> {
        let key = digest(query);
        let mut guard = self.inner.lock();
        match guard.get(&key) {
            Some(v) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(v.clone())
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    pub fn insert(&self, query: &str, embedding: Vec<f32>) {
        let key = digest(query);
        self.inner.lock().put(key, embedding);
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    pub fn hit_rate(&self) -> f64 {
        let hits = self.hits() as f64;
        let misses = self.misses() as f64;
        if hits + misses == 0.0 {
            0.0
        } else {
            hits / (hits + misses)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn miss_then_hit_updates_counters() {
        let cache = QueryEmbeddingCache::new(4);
        assert!(cache.get("hello").is_none());
        cache.insert("hello", vec![1.0, 2.0]);
        assert_eq!(cache.get("hello"), Some(vec![1.0, 2.0]));
        assert_eq!(cache.hits(), 1);
        assert_eq!(cache.misses(), 1);
    }

    #[test]
    fn hit_rate_is_zero_when_empty() {
        let cache = QueryEmbeddingCache::new(4);
        assert_eq!(cache.hit_rate(), 0.0);
    }

    #[test]
    fn evicts_least_recently_used_beyond_capacity() {
        let cache = QueryEmbeddingCache::new(1);
        cache.insert("a", vec![1.0]);
        cache.insert("b", vec![2.0]);
        assert!(cache.get("a").is_none());
        assert_eq!(cache.get("b"), Some(vec![2.0]));
    }

    #[test]
    fn cache_key_is_not_normalized() {
        let cache = QueryEmbeddingCache::new(4);
        cache.insert("Hello", vec![1.0]);
        assert!(cache.get("hello").is_none());
    }
}
