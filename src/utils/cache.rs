//! Process-wide caches with weakly held subjects.
//!
//! A [`WeakCache`] maps a key to a value derived from some live entity. The entity itself is
//! held through a [`Weak`], so a cache entry never extends its lifetime. Once the entity is gone
//! the slot is dead: lookups treat it as a miss and remove it, and periodic sweeps drop dead
//! slots that are never looked up again.
//!
//! Lookups and inserts are split on purpose. The value for a miss is computed outside any shard
//! lock, which lets the computation recurse into the same cache. The insert then happens inside
//! one `entry` call: if another caller stored a live value for the key in the meantime, that
//! value wins and is returned to both.

use std::{
    hash::Hash,
    sync::{
        atomic::{AtomicU64, AtomicUsize, Ordering},
        Arc, Weak,
    },
};

use dashmap::{mapref::entry::Entry, DashMap};

use crate::config::CACHE_SWEEP_INTERVAL;

/// Hit and miss counters of a [`WeakCache`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheStats {
    /// Lookups answered from a live slot
    pub hits: u64,
    /// Lookups that found no slot or a dead one
    pub misses: u64,
    /// Slots currently stored, dead ones included
    pub entries: usize,
}

/// A concurrent map whose entries die with the entity they were derived from.
pub struct WeakCache<K, T, V> {
    slots: DashMap<K, (Weak<T>, V)>,
    inserts: AtomicUsize,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<K, T, V> WeakCache<K, T, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// An empty cache.
    #[must_use]
    pub fn new() -> Self {
        WeakCache {
            slots: DashMap::new(),
            inserts: AtomicUsize::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Look up `key`. Returns the subject and the value if the subject is still alive.
    pub fn get(&self, key: &K) -> Option<(Arc<T>, V)> {
        let found = self
            .slots
            .get(key)
            .map(|slot| (slot.0.upgrade(), slot.1.clone()));

        match found {
            Some((Some(subject), value)) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some((subject, value))
            }
            Some((None, _)) => {
                self.slots.remove_if(key, |_, slot| slot.0.strong_count() == 0);
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Store `value` for `key` unless a live value is already present, and return the value
    /// that is in the cache afterwards.
    pub fn insert_if_absent(&self, key: K, subject: &Arc<T>, value: V) -> V {
        let stored = match self.slots.entry(key) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().0.strong_count() > 0 {
                    occupied.get().1.clone()
                } else {
                    occupied.insert((Arc::downgrade(subject), value.clone()));
                    value
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert((Arc::downgrade(subject), value.clone()));
                value
            }
        };

        if self.inserts.fetch_add(1, Ordering::Relaxed) % CACHE_SWEEP_INTERVAL
            == CACHE_SWEEP_INTERVAL - 1
        {
            self.sweep();
        }
        stored
    }

    /// Drop every slot whose subject is gone. Returns the number of removed slots.
    pub fn sweep(&self) -> usize {
        let before = self.slots.len();
        self.slots.retain(|_, slot| slot.0.strong_count() > 0);
        before.saturating_sub(self.slots.len())
    }

    /// Drop every slot for which `keep` returns false.
    pub fn retain(&self, mut keep: impl FnMut(&K) -> bool) {
        self.slots.retain(|key, _| keep(key));
    }

    /// Drop every slot.
    pub fn purge(&self) {
        self.slots.clear();
    }

    /// Number of stored slots, dead ones included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether no slot is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Current counters.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.slots.len(),
        }
    }
}

impl<K, T, V> Default for WeakCache<K, T, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    fn default() -> Self {
        WeakCache::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dead_slot_is_a_miss() {
        let cache: WeakCache<u32, String, u32> = WeakCache::new();
        let subject = Arc::new("subject".to_string());

        assert_eq!(cache.insert_if_absent(1, &subject, 10), 10);
        assert_eq!(cache.get(&1).map(|(_, value)| value), Some(10));

        drop(subject);
        assert!(cache.get(&1).is_none());
        assert!(cache.is_empty());

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }

    #[test]
    fn first_live_value_wins() {
        let cache: WeakCache<u32, String, u32> = WeakCache::new();
        let subject = Arc::new("subject".to_string());

        assert_eq!(cache.insert_if_absent(1, &subject, 10), 10);
        assert_eq!(cache.insert_if_absent(1, &subject, 20), 10);

        let replacement = Arc::new("replacement".to_string());
        drop(subject);
        assert_eq!(cache.insert_if_absent(1, &replacement, 30), 30);
    }

    #[test]
    fn sweep_and_purge() {
        let cache: WeakCache<u32, String, u32> = WeakCache::new();
        let alive = Arc::new("alive".to_string());
        let dead = Arc::new("dead".to_string());
        cache.insert_if_absent(1, &alive, 1);
        cache.insert_if_absent(2, &dead, 2);
        drop(dead);

        assert_eq!(cache.sweep(), 1);
        assert_eq!(cache.len(), 1);

        cache.retain(|key| *key != 1);
        assert!(cache.is_empty());

        cache.insert_if_absent(3, &alive, 3);
        cache.purge();
        assert!(cache.is_empty());
    }
}
