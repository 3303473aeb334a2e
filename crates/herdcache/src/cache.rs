//! Locked LRU store shared by a group's callers

use std::sync::Arc;

use parking_lot::Mutex;

use crate::byteview::ByteView;
use crate::lru::{LruCache, OnEvicted};
use crate::stats::CacheStats;

/// Thread-safe byte-budgeted store of [`ByteView`]s.
///
/// Every operation, including `get`, takes the single lock because a hit
/// reorders the recency list.
pub struct Cache {
    lru: Mutex<LruCache<ByteView>>,
}

impl Cache {
    /// Create a store with the given byte budget (zero means unbounded)
    pub fn new(max_bytes: i64, stats: Arc<CacheStats>) -> Self {
        let on_evicted: OnEvicted<ByteView> = Box::new(move |key: &str, _: &ByteView| {
            tracing::trace!(key, "evicted");
            stats.record_eviction();
        });

        Self {
            lru: Mutex::new(LruCache::new(max_bytes, Some(on_evicted))),
        }
    }

    /// Look up a value, promoting it on hit
    pub fn get(&self, key: &str) -> Option<ByteView> {
        self.lru.lock().get(key).cloned()
    }

    /// Insert or replace a value
    pub fn put(&self, key: &str, value: ByteView) {
        self.lru.lock().put(key, value);
    }

    /// Number of resident entries
    pub fn len(&self) -> usize {
        self.lru.lock().len()
    }

    /// Check if the store is empty
    pub fn is_empty(&self) -> bool {
        self.lru.lock().is_empty()
    }

    /// Bytes currently resident
    pub fn used_bytes(&self) -> i64 {
        self.lru.lock().used_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_cache_basic() {
        let cache = Cache::new(0, Arc::new(CacheStats::new()));
        cache.put("Tom", ByteView::from(b"630".to_vec()));

        assert_eq!(cache.get("Tom").unwrap(), b"630");
        assert!(cache.get("Jack").is_none());
        assert_eq!(cache.used_bytes(), 6);
    }

    #[test]
    fn test_cache_counts_evictions() {
        let stats = Arc::new(CacheStats::new());
        let cache = Cache::new(8, Arc::clone(&stats));

        cache.put("a", ByteView::from(b"111".to_vec()));
        cache.put("b", ByteView::from(b"222".to_vec()));
        cache.put("c", ByteView::from(b"333".to_vec()));

        assert_eq!(cache.len(), 2);
        assert_eq!(stats.evictions(), 1);
        assert!(cache.get("a").is_none());
    }

    #[test]
    fn test_cache_concurrent_puts_stay_in_budget() {
        let cache = Arc::new(Cache::new(1024, Arc::new(CacheStats::new())));

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let cache = Arc::clone(&cache);
                thread::spawn(move || {
                    for i in 0..500 {
                        cache.put(&format!("t{t}-k{i}"), ByteView::from(vec![b'x'; 16]));
                        assert!(cache.used_bytes() <= 1024);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert!(!cache.is_empty());
        assert!(cache.used_bytes() <= 1024);
    }
}
