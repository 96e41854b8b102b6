//! # LRU Cache
//!
//! Bounded least-recently-used map that also counts hits and misses.
//! Holds shingled reference buckets for [`crate::CorpusIndex`].

use std::collections::HashMap;
use std::hash::Hash;

/// Hit and miss counters of an [`LruCache`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheCounters {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

/// LRU cache with O(n) eviction.
///
/// Capacities are small (a few dozen length buckets), so a linear scan for
/// the oldest entry is enough.
#[derive(Debug)]
pub struct LruCache<K, V> {
    capacity: usize,
    entries: HashMap<K, Slot<V>>,
    clock: u64,
    counters: CacheCounters,
}

#[derive(Debug)]
struct Slot<V> {
    value: V,
    last_used: u64,
}

impl<K: Eq + Hash + Clone, V: Clone> LruCache<K, V> {
    /// Cache holding at most `capacity` entries (at least one).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: HashMap::with_capacity(capacity),
            clock: 0,
            counters: CacheCounters::default(),
        }
    }

    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    /// Clone of the cached value, marking it most recently used.
    pub fn get(&mut self, key: &K) -> Option<V> {
        let now = self.tick();
        match self.entries.get_mut(key) {
            Some(slot) => {
                slot.last_used = now;
                self.counters.hits += 1;
                Some(slot.value.clone())
            }
            None => {
                self.counters.misses += 1;
                None
            }
        }
    }

    /// Insert or replace a value. Returns the key evicted to make room.
    pub fn insert(&mut self, key: K, value: V) -> Option<K> {
        let now = self.tick();
        if let Some(slot) = self.entries.get_mut(&key) {
            slot.value = value;
            slot.last_used = now;
            return None;
        }

        let evicted = if self.entries.len() >= self.capacity {
            self.evict_oldest()
        } else {
            None
        };
        self.entries.insert(
            key,
            Slot {
                value,
                last_used: now,
            },
        );
        evicted
    }

    /// Remove a key, returning its value.
    pub fn remove(&mut self, key: &K) -> Option<V> {
        self.entries.remove(key).map(|slot| slot.value)
    }

    /// Drop all entries. Counters are kept.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Whether `key` is cached. Does not count as a use.
    pub fn contains(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    pub fn counters(&self) -> CacheCounters {
        self.counters
    }

    fn evict_oldest(&mut self) -> Option<K> {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|(_, slot)| slot.last_used)
            .map(|(k, _)| k.clone())?;
        self.entries.remove(&oldest);
        self.counters.evictions += 1;
        Some(oldest)
    }
}
