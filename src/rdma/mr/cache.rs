//! Bookkeeping half of the memory-region cache (component C): the ordered
//! index, LRU sequence, refcounts, and hit/miss counters. This half is a
//! pure data structure generic over the cached payload and is independent
//! of the fabric FFI boundary, so it is exercised directly by unit tests
//! with a lightweight stand-in payload.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

/// Cache key: tie-broken by address, then length, then access flags, per
/// the reference implementation's rb_tree ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CacheKey {
    pub addr: usize,
    pub len: usize,
    pub access: u64,
}

struct Slot<T> {
    payload: T,
    refcount: u32,
    last_used: u64,
    lru_seq: u64,
}

/// A reference-counted LRU cache keyed by [`CacheKey`]. One lock guards the
/// index and LRU sequence together, matching the reference implementation's
/// single spinlock over its rb_tree plus LRU list.
pub struct LruCache<T> {
    max_entries: usize,
    entries: Mutex<BTreeMap<CacheKey, Slot<T>>>,
    lru_clock: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<T> LruCache<T> {
    pub fn new(max_entries: usize) -> Self {
        Self {
            max_entries,
            entries: Mutex::new(BTreeMap::new()),
            lru_clock: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    fn tick(&self) -> u64 {
        self.lru_clock.fetch_add(1, Ordering::Relaxed)
    }

    /// Look up `key`. On hit, bump refcount and LRU recency and invoke `f`
    /// with the cached payload, returning `Some`. On miss, returns `None`
    /// and the caller is responsible for calling [`LruCache::insert`].
    pub fn get_or_miss<R>(&self, key: CacheKey, f: impl FnOnce(&T) -> R) -> Option<R> {
        let mut entries = self.entries.lock().unwrap();
        let seq = self.tick();
        if let Some(slot) = entries.get_mut(&key) {
            slot.refcount += 1;
            slot.last_used = seq;
            slot.lru_seq = seq;
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Some(f(&slot.payload));
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// Insert a freshly constructed payload for `key` with refcount 1,
    /// evicting the LRU tail first if the cache is full and that tail has
    /// refcount 0. If no evictable tail exists, the cache grows past its
    /// nominal size (intentional: correctness over capacity).
    ///
    /// Returns the evicted payload, if any, so the caller can release its
    /// underlying fabric resource.
    pub fn insert(&self, key: CacheKey, payload: T) -> Option<T> {
        let mut entries = self.entries.lock().unwrap();
        let seq = self.tick();

        let evicted = if entries.len() >= self.max_entries {
            self.evict_one_locked(&mut entries)
        } else {
            None
        };

        entries.insert(
            key,
            Slot {
                payload,
                refcount: 1,
                last_used: seq,
                lru_seq: seq,
            },
        );
        evicted
    }

    fn evict_one_locked(&self, entries: &mut BTreeMap<CacheKey, Slot<T>>) -> Option<T> {
        let victim = entries
            .iter()
            .filter(|(_, slot)| slot.refcount == 0)
            .min_by_key(|(_, slot)| slot.lru_seq)
            .map(|(k, _)| *k);

        victim.and_then(|k| entries.remove(&k)).map(|slot| slot.payload)
    }

    /// Decrement the refcount for `key`. Does not evict.
    pub fn put(&self, key: CacheKey) {
        let mut entries = self.entries.lock().unwrap();
        if let Some(slot) = entries.get_mut(&key) {
            slot.refcount = slot.refcount.saturating_sub(1);
        }
    }

    /// Evict every entry with refcount 0. Returns the evicted payloads.
    pub fn flush(&self) -> Vec<T> {
        let mut entries = self.entries.lock().unwrap();
        let victims: Vec<CacheKey> = entries
            .iter()
            .filter(|(_, slot)| slot.refcount == 0)
            .map(|(k, _)| *k)
            .collect();
        victims
            .into_iter()
            .filter_map(|k| entries.remove(&k))
            .map(|slot| slot.payload)
            .collect()
    }

    /// Drain every entry regardless of refcount, for use at cache teardown.
    pub fn drain_all(&self) -> Vec<(CacheKey, u32, T)> {
        let mut entries = self.entries.lock().unwrap();
        std::mem::take(&mut *entries)
            .into_iter()
            .map(|(k, slot)| (k, slot.refcount, slot.payload))
            .collect()
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    pub fn current_entries(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    /// Deregister every entry regardless of refcount, logging a diagnostic
    /// for any nonzero refcount, then free the cache. `on_evict` runs once
    /// per entry so the caller can release the underlying fabric resource;
    /// when dropping `T` alone performs that release, an empty closure
    /// suffices.
    pub fn destroy(&self, mut on_evict: impl FnMut(CacheKey, T)) {
        for (key, refcount, payload) in self.drain_all() {
            if refcount != 0 {
                log::warn!("mr cache: destroying entry with nonzero refcount ({refcount})");
            }
            on_evict(key, payload);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(addr: usize) -> CacheKey {
        CacheKey {
            addr,
            len: 4096,
            access: 0,
        }
    }

    #[test]
    fn hit_counters_on_repeated_get() {
        let cache: LruCache<u32> = LruCache::new(32);
        let k = key(0x1000);

        assert!(cache.get_or_miss(k, |v| *v).is_none());
        cache.insert(k, 42);
        assert_eq!(cache.get_or_miss(k, |v| *v), Some(42));
        assert_eq!(cache.get_or_miss(k, |v| *v), Some(42));

        assert_eq!(cache.hits(), 2);
        assert_eq!(cache.misses(), 1);
        assert_eq!(cache.current_entries(), 1);
    }

    #[test]
    fn lru_eviction_of_released_tail() {
        let cache: LruCache<u32> = LruCache::new(2);
        let (k1, k2, k3) = (key(1), key(2), key(3));

        cache.insert(k1, 1);
        cache.put(k1);
        cache.insert(k2, 2);
        cache.put(k2);

        // k3 evicts k1 (older LRU tail with refcount 0).
        cache.insert(k3, 3);
        cache.put(k3);

        assert!(cache.get_or_miss(k1, |v| *v).is_none(), "k1 should have been evicted");
        assert_eq!(cache.get_or_miss(k2, |v| *v), Some(2));
        assert_eq!(cache.get_or_miss(k3, |v| *v), Some(3));
    }

    #[test]
    fn live_refcount_is_never_evicted() {
        let cache: LruCache<u32> = LruCache::new(1);
        let (k1, k2) = (key(1), key(2));

        cache.insert(k1, 1); // refcount 1, never released.
        cache.insert(k2, 2); // cache full, k1 has refcount 1: not evictable.

        assert_eq!(cache.get_or_miss(k1, |v| *v), Some(1));
        assert_eq!(cache.current_entries(), 2, "cache grew past nominal size under pressure");
    }

    #[test]
    fn flush_removes_only_unreferenced_entries() {
        let cache: LruCache<u32> = LruCache::new(32);
        let (k1, k2) = (key(1), key(2));
        cache.insert(k1, 1);
        cache.insert(k2, 2);
        cache.put(k2);

        let flushed = cache.flush();
        assert_eq!(flushed, vec![2]);
        assert!(cache.get_or_miss(k1, |v| *v).is_some());
        assert!(cache.get_or_miss(k2, |v| *v).is_none());
    }
}
