// ABOUTME: Interning cache for short map keys so repeated keys share one allocation.
// ABOUTME: Buckets by byte length, bounded per bucket, evicting the oldest entry first.

use crate::error::Result;
use crate::types::limits;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

/// Returns true if a key of `length` bytes is eligible for caching.
#[inline]
#[must_use]
pub const fn can_be_cached(length: usize) -> bool {
    length > 0 && length <= limits::MAX_CACHED_KEY_LENGTH
}

/// Decodes and interns short UTF-8 map keys.
#[derive(Debug, Clone)]
pub struct KeyCache {
    // Index i holds keys of i + 1 bytes, oldest first
    buckets: Vec<VecDeque<Arc<str>>>,
    hits: u64,
    misses: u64,
}

impl Default for KeyCache {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyCache {
    #[must_use]
    pub fn new() -> Self {
        Self {
            buckets: vec![VecDeque::new(); limits::MAX_CACHED_KEY_LENGTH],
            hits: 0,
            misses: 0,
        }
    }

    /// Decode `bytes` as a key, returning a shared string.
    ///
    /// Keys outside the cacheable length band are decoded but not stored.
    pub fn decode(&mut self, bytes: &[u8]) -> Result<Arc<str>> {
        if !can_be_cached(bytes.len()) {
            return Ok(Arc::from(crate::decoder::validate_utf8(bytes)?));
        }

        let bucket = &mut self.buckets[bytes.len() - 1];
        if let Some(hit) = bucket.iter().find(|k| k.as_bytes() == bytes) {
            self.hits += 1;
            return Ok(Arc::clone(hit));
        }

        let key: Arc<str> = Arc::from(crate::decoder::validate_utf8(bytes)?);
        self.misses += 1;
        if bucket.len() == limits::MAX_CACHED_KEYS_PER_LENGTH {
            if let Some(evicted) = bucket.pop_front() {
                tracing::trace!(key = &*evicted, "evicting cached map key");
            }
        }
        bucket.push_back(Arc::clone(&key));
        Ok(key)
    }

    /// Number of lookups answered from the cache.
    #[must_use]
    pub fn hits(&self) -> u64 {
        self.hits
    }

    /// Number of cacheable keys that had to be decoded.
    #[must_use]
    pub fn misses(&self) -> u64 {
        self.misses
    }

    /// Number of keys currently held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.buckets.iter().map(VecDeque::len).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop all cached keys and reset the counters.
    pub fn clear(&mut self) {
        for bucket in &mut self.buckets {
            bucket.clear();
        }
        self.hits = 0;
        self.misses = 0;
    }
}

/// A key cache that several decoders, possibly on different threads, can share.
#[derive(Debug, Clone, Default)]
pub struct SharedKeyCache(Arc<Mutex<KeyCache>>);

impl SharedKeyCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn decode(&self, bytes: &[u8]) -> Result<Arc<str>> {
        self.0.lock().decode(bytes)
    }

    #[must_use]
    pub fn hits(&self) -> u64 {
        self.0.lock().hits()
    }

    #[must_use]
    pub fn misses(&self) -> u64 {
        self.0.lock().misses()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn test_eligibility() {
        assert!(!can_be_cached(0));
        assert!(can_be_cached(1));
        assert!(can_be_cached(16));
        assert!(!can_be_cached(17));
    }

    #[test]
    fn test_hit_returns_same_allocation() {
        let mut cache = KeyCache::new();
        let a = cache.decode(b"name").unwrap();
        let b = cache.decode(b"name").unwrap();
        assert_eq!(&*a, "name");
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!((cache.hits(), cache.misses()), (1, 1));
    }

    #[test]
    fn test_long_keys_bypass_cache() {
        let mut cache = KeyCache::new();
        let key = "a_rather_long_key_name";
        assert_eq!(&*cache.decode(key.as_bytes()).unwrap(), key);
        assert_eq!(&*cache.decode(key.as_bytes()).unwrap(), key);
        assert!(cache.is_empty());
        assert_eq!((cache.hits(), cache.misses()), (0, 0));
    }

    #[test]
    fn test_fifo_eviction() {
        let mut cache = KeyCache::new();
        for i in 0..=limits::MAX_CACHED_KEYS_PER_LENGTH {
            cache.decode(format!("k{i:02}").as_bytes()).unwrap();
        }
        assert_eq!(cache.len(), limits::MAX_CACHED_KEYS_PER_LENGTH);

        // k00 was evicted, k01 is still present
        cache.decode(b"k01").unwrap();
        assert_eq!(cache.hits(), 1);
        cache.decode(b"k00").unwrap();
        assert_eq!(cache.hits(), 1);
    }

    #[test]
    fn test_invalid_utf8() {
        let mut cache = KeyCache::new();
        assert_eq!(cache.decode(&[0xff, 0xfe]), Err(Error::InvalidUtf8));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_shared_across_threads() {
        let cache = SharedKeyCache::new();
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let cache = cache.clone();
                std::thread::spawn(move || {
                    for _ in 0..10 {
                        cache.decode(b"id").unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.hits() + cache.misses(), 40);
        assert_eq!(cache.misses(), 1);
    }
}
