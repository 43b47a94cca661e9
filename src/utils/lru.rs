//! A bounded least-recently-used map.
//!
//! Recency is tracked with a monotonically increasing tick per entry and a
//! `BTreeMap` from tick to key, so the oldest entry is always the first key of
//! that map. Both `get` and `insert` refresh recency. Not synchronised; callers
//! wrap it in a lock.

use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub len: usize,
    pub capacity: usize,
}

#[derive(Debug)]
pub struct LruCache<K, V> {
    entries: HashMap<K, (V, u64)>,
    order: BTreeMap<u64, K>,
    capacity: usize,
    tick: u64,
    hits: u64,
    misses: u64,
    evictions: u64,
}

impl<K, V> LruCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// A capacity of zero is treated as one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: HashMap::with_capacity(capacity.min(4096)),
            order: BTreeMap::new(),
            capacity,
            tick: 0,
            hits: 0,
            misses: 0,
            evictions: 0,
        }
    }

    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }

    /// Returns a clone of the value and marks the entry most recently used.
    pub fn get(&mut self, key: &K) -> Option<V> {
        let tick = self.next_tick();
        match self.entries.get_mut(key) {
            Some((value, last)) => {
                self.order.remove(last);
                *last = tick;
                self.order.insert(tick, key.clone());
                self.hits += 1;
                Some(value.clone())
            }
            None => {
                self.misses += 1;
                None
            }
        }
    }

    /// Inserts or replaces `key`, evicting the least recently used entry when full.
    pub fn insert(&mut self, key: K, value: V) {
        let tick = self.next_tick();
        if let Some((old_value, last)) = self.entries.get_mut(&key) {
            self.order.remove(last);
            *old_value = value;
            *last = tick;
            self.order.insert(tick, key);
            return;
        }

        while self.entries.len() >= self.capacity {
            let Some((_, oldest)) = self.order.pop_first() else {
                break;
            };
            self.entries.remove(&oldest);
            self.evictions += 1;
        }

        self.order.insert(tick, key.clone());
        self.entries.insert(key, (value, tick));
    }

    pub fn contains(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits,
            misses: self.misses,
            evictions: self.evictions,
            len: self.entries.len(),
            capacity: self.capacity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evicts_least_recently_used() {
        let mut cache = LruCache::new(2);
        cache.insert("a", 1);
        cache.insert("b", 2);
        assert_eq!(cache.get(&"a"), Some(1));
        cache.insert("c", 3);

        assert!(cache.contains(&"a"));
        assert!(!cache.contains(&"b"));
        assert!(cache.contains(&"c"));
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn size_never_exceeds_capacity() {
        let mut cache = LruCache::new(3);
        for i in 0..100 {
            cache.insert(i, i * 2);
            assert!(cache.len() <= 3);
        }
        assert_eq!(cache.len(), 3);
        assert!(cache.contains(&99) && cache.contains(&98) && cache.contains(&97));
        assert_eq!(cache.stats().evictions, 97);
    }

    #[test]
    fn reinsert_replaces_and_refreshes() {
        let mut cache = LruCache::new(2);
        cache.insert("a", 1);
        cache.insert("b", 2);
        cache.insert("a", 10);
        cache.insert("c", 3);
        assert_eq!(cache.get(&"a"), Some(10));
        assert!(!cache.contains(&"b"));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn counts_hits_and_misses() {
        let mut cache = LruCache::new(4);
        cache.insert(1u8, "x");
        cache.get(&1);
        cache.get(&2);
        cache.get(&1);
        let stats = cache.stats();
        assert_eq!((stats.hits, stats.misses), (2, 1));
        assert_eq!(stats.capacity, 4);
    }

    #[test]
    fn zero_capacity_holds_one_entry() {
        let mut cache = LruCache::new(0);
        cache.insert(1, 1);
        cache.insert(2, 2);
        assert_eq!(cache.len(), 1);
        assert!(cache.contains(&2));
    }
}
