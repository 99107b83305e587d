//! Bounded, thread-safe recency cache.
//!
//! Entries are evicted least-recently-used first once the cache holds more
//! than `max_count` entries, and/or once they are older than `max_age`. Both
//! bounds are optional and compose. Evicted entries can be retained (up to
//! `keep_purged`) and drained with [`RecencyCache::take_purged`].

use crate::error::{HfrError, Result};
use lru::LruCache;
use std::collections::VecDeque;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

struct Entry<V> {
    value: V,
    created: Instant,
}

struct Inner<K: Hash + Eq, V> {
    /// Recency order, most recent first
    order: LruCache<K, Entry<V>>,
    purged: VecDeque<(K, V)>,
}

/// Hit/miss counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
}

/// Cache limits. Zero means unbounded for both `max_count` and `max_age`.
#[derive(Debug, Clone, Copy, Default)]
pub struct CacheLimits {
    pub max_count: usize,
    pub max_age: Duration,
    pub keep_purged: usize,
}

impl CacheLimits {
    pub fn count(max_count: usize) -> Self {
        Self {
            max_count,
            ..Default::default()
        }
    }

    pub fn age(max_age: Duration) -> Self {
        Self {
            max_age,
            ..Default::default()
        }
    }
}

pub struct RecencyCache<K: Hash + Eq, V> {
    inner: Mutex<Inner<K, V>>,
    limits: CacheLimits,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<K, V> RecencyCache<K, V>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    pub fn new(limits: CacheLimits) -> Self {
        Self {
            inner: Mutex::new(Inner {
                order: LruCache::unbounded(),
                purged: VecDeque::new(),
            }),
            limits,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn with_max_count(max_count: usize) -> Self {
        Self::new(CacheLimits::count(max_count))
    }

    pub fn limits(&self) -> CacheLimits {
        self.limits
    }

    fn lock(&self) -> MutexGuard<'_, Inner<K, V>> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn is_expired(&self, created: Instant, now: Instant) -> bool {
        !self.limits.max_age.is_zero() && now.duration_since(created) >= self.limits.max_age
    }

    /// Look up `key` and promote it to most recently used
    pub fn get(&self, key: &K) -> Option<V> {
        let mut inner = self.lock();
        let now = Instant::now();

        let expired = match inner.order.peek(key) {
            Some(entry) => self.is_expired(entry.created, now),
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                return None;
            }
        };

        if expired {
            if let Some(entry) = inner.order.pop(key) {
                self.retain_purged(&mut inner, key.clone(), entry.value);
            }
            self.misses.fetch_add(1, Ordering::Relaxed);
            return None;
        }

        self.hits.fetch_add(1, Ordering::Relaxed);
        inner.order.get(key).map(|entry| entry.value.clone())
    }

    /// Insert or update `key`, promote it, then evict what no longer fits
    pub fn put(&self, key: K, value: V) -> Result<()> {
        let mut inner = self.lock();

        if let Some(entry) = inner.order.get_mut(&key) {
            entry.value = value;
            return Ok(());
        }

        inner.order.push(
            key,
            Entry {
                value,
                created: Instant::now(),
            },
        );
        self.purge_locked(&mut inner)?;
        Ok(())
    }

    /// Run an eviction pass and return the number of evicted entries
    pub fn purge(&self) -> Result<usize> {
        let mut inner = self.lock();
        self.purge_locked(&mut inner)
    }

    fn purge_locked(&self, inner: &mut Inner<K, V>) -> Result<usize> {
        let mut purged = 0;

        if !self.limits.max_age.is_zero() {
            let now = Instant::now();
            let expired: Vec<K> = inner
                .order
                .iter()
                .filter(|(_, entry)| self.is_expired(entry.created, now))
                .map(|(key, _)| key.clone())
                .collect();

            for key in expired {
                let entry = inner.order.pop(&key).ok_or_else(|| {
                    HfrError::Invariant("expired key vanished from recency order".to_string())
                })?;
                self.retain_purged(inner, key, entry.value);
                purged += 1;
            }
        }

        if self.limits.max_count > 0 {
            while inner.order.len() > self.limits.max_count {
                let (key, entry) = inner.order.pop_lru().ok_or_else(|| {
                    HfrError::Invariant("recency order empty while over capacity".to_string())
                })?;
                self.retain_purged(inner, key, entry.value);
                purged += 1;
            }
        }

        Ok(purged)
    }

    fn retain_purged(&self, inner: &mut Inner<K, V>, key: K, value: V) {
        if self.limits.keep_purged == 0 {
            return;
        }
        inner.purged.push_back((key, value));
        while inner.purged.len() > self.limits.keep_purged {
            inner.purged.pop_front();
        }
    }

    /// Drain the retained evictions, oldest first
    pub fn take_purged(&self) -> Vec<(K, V)> {
        self.lock().purged.drain(..).collect()
    }

    pub fn remove(&self, key: &K) -> Option<V> {
        self.lock().order.pop(key).map(|entry| entry.value)
    }

    /// Membership test that does not change recency
    pub fn contains_key(&self, key: &K) -> bool {
        self.lock().order.contains(key)
    }

    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.order.clear();
        inner.purged.clear();
    }

    pub fn len(&self) -> usize {
        self.lock().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().order.is_empty()
    }

    /// Keys, most recently used first
    pub fn keys(&self) -> Vec<K> {
        self.lock().order.iter().map(|(k, _)| k.clone()).collect()
    }

    /// Values, most recently used first
    pub fn values(&self) -> Vec<V> {
        self.lock()
            .order
            .iter()
            .map(|(_, entry)| entry.value.clone())
            .collect()
    }

    /// Most recently used key
    pub fn first(&self) -> Option<K> {
        self.lock().order.peek_mru().map(|(k, _)| k.clone())
    }

    /// Least recently used key
    pub fn last(&self) -> Option<K> {
        self.lock().order.peek_lru().map(|(k, _)| k.clone())
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    #[test]
    fn test_count_eviction_is_lru() {
        let cache = RecencyCache::with_max_count(2);
        cache.put("A", 1).unwrap();
        cache.put("B", 2).unwrap();
        cache.put("C", 3).unwrap();

        assert!(!cache.contains_key(&"A"));
        assert!(cache.contains_key(&"B"));
        assert!(cache.contains_key(&"C"));

        // Reading B makes C the least recently used
        assert_eq!(cache.get(&"B"), Some(2));
        cache.put("D", 4).unwrap();

        assert!(!cache.contains_key(&"C"));
        assert_eq!(cache.keys(), vec!["D", "B"]);
    }

    #[test]
    fn test_update_promotes_without_growth() {
        let cache = RecencyCache::with_max_count(2);
        cache.put(1, "one").unwrap();
        cache.put(2, "two").unwrap();
        cache.put(1, "uno").unwrap();

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.first(), Some(1));
        assert_eq!(cache.last(), Some(2));
        assert_eq!(cache.get(&1), Some("uno"));
    }

    #[test]
    fn test_age_eviction() {
        let cache = RecencyCache::new(CacheLimits::age(Duration::from_millis(30)));
        cache.put(1u64, "old".to_string()).unwrap();
        sleep(Duration::from_millis(40));
        cache.put(2u64, "new".to_string()).unwrap();

        // Inserting 2 triggered a purge that dropped 1
        assert!(!cache.contains_key(&1));
        assert_eq!(cache.get(&2).as_deref(), Some("new"));
    }

    #[test]
    fn test_expired_entry_is_a_miss() {
        let cache = RecencyCache::new(CacheLimits::age(Duration::from_millis(20)));
        cache.put(7u64, 70u64).unwrap();
        sleep(Duration::from_millis(30));
        assert_eq!(cache.get(&7), None);
        assert_eq!(cache.stats().misses, 1);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_purged_entries_are_retained_up_to_limit() {
        let cache = RecencyCache::new(CacheLimits {
            max_count: 1,
            keep_purged: 2,
            ..Default::default()
        });
        for i in 0..4 {
            cache.put(i, i * 10).unwrap();
        }

        assert_eq!(cache.take_purged(), vec![(1, 10), (2, 20)]);
        assert!(cache.take_purged().is_empty());
    }

    #[test]
    fn test_hit_miss_counters() {
        let cache = RecencyCache::with_max_count(4);
        cache.put("k", 1).unwrap();
        assert_eq!(cache.get(&"k"), Some(1));
        assert_eq!(cache.get(&"missing"), None);
        assert_eq!(cache.stats(), CacheStats { hits: 1, misses: 1 });
    }

    #[test]
    fn test_unbounded_cache_never_evicts() {
        let cache = RecencyCache::new(CacheLimits::default());
        for i in 0..1000 {
            cache.put(i, i).unwrap();
        }
        assert_eq!(cache.len(), 1000);
        assert_eq!(cache.purge().unwrap(), 0);
    }

    #[test]
    fn test_remove_and_clear() {
        let cache = RecencyCache::with_max_count(3);
        cache.put(1, 'a').unwrap();
        cache.put(2, 'b').unwrap();
        assert_eq!(cache.remove(&1), Some('a'));
        assert_eq!(cache.remove(&1), None);
        assert_eq!(cache.values(), vec!['b']);
        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.first(), None);
    }

    #[test]
    fn test_concurrent_access() {
        use std::sync::Arc;
        use std::thread;

        let cache = Arc::new(RecencyCache::with_max_count(64));
        let workers: Vec<_> = (0..4)
            .map(|t| {
                let cache = cache.clone();
                thread::spawn(move || {
                    for i in 0..500u64 {
                        cache.put(t * 1000 + i, i).unwrap();
                        let _ = cache.get(&(t * 1000 + i / 2));
                    }
                })
            })
            .collect();
        for w in workers {
            w.join().unwrap();
        }
        assert_eq!(cache.len(), 64);
    }
}
