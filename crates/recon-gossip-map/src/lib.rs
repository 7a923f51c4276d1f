// Copyright (c) Kanari Network
// SPDX-License-Identifier: Apache-2.0

//! A thread-safe associative structure whose entries carry a monotonic
//! "generation" tag and can be bulk-removed by generation. Underpins orphan
//! buffering and event de-dup in the gossip substrate.

use dashmap::mapref::entry::Entry as DashEntry;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};

/// A value paired with the generation it was inserted under.
#[derive(Debug, Clone)]
pub struct GenerationTagged<T> {
    pub generation: u64,
    pub value: T,
}

/// Keyed by `K` with values `V`; each entry carries an implicit generation.
/// A striped lock (default parallelism 1024) keyed by the entry's
/// generation serializes `put` against `purge` for the same generation.
/// Insertion consults `purged_generation`, takes the stripe lock, then
/// re-checks, so no entry can survive its own purge window.
pub struct PurgableMap<K, V> {
    map: DashMap<K, GenerationTagged<V>>,
    stripes: Vec<Mutex<()>>,
    purged_generation: AtomicU64,
}

impl<K, V> PurgableMap<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(stripe_count: usize) -> Self {
        let stripe_count = stripe_count.max(1);
        Self {
            map: DashMap::new(),
            stripes: (0..stripe_count).map(|_| Mutex::new(())).collect(),
            purged_generation: AtomicU64::new(0),
        }
    }

    fn stripe_index(&self, generation: u64) -> usize {
        (generation % self.stripes.len() as u64) as usize
    }

    pub fn purged_generation(&self) -> u64 {
        self.purged_generation.load(Ordering::Acquire)
    }

    /// No-op if `generation` is already purged.
    pub fn put(&self, key: K, value: V, generation: u64) {
        if generation < self.purged_generation() {
            return;
        }
        let stripe = self.stripe_index(generation);
        let _guard = self.stripes[stripe].lock();
        if generation < self.purged_generation() {
            return;
        }
        self.map.insert(key, GenerationTagged { generation, value });
    }

    /// Reads do not take the stripe lock.
    pub fn get(&self, key: &K) -> Option<V> {
        self.map.get(key).map(|e| e.value.clone())
    }

    pub fn contains(&self, key: &K) -> bool {
        self.map.contains_key(key)
    }

    pub fn remove(&self, key: &K) -> Option<V> {
        self.map.remove(key).map(|(_, v)| v.value)
    }

    /// At most one invocation of `f` per key even under concurrency.
    /// No-op (returns `None`) if the key's generation is purged.
    pub fn compute_if_absent(
        &self,
        key: K,
        generation: u64,
        f: impl FnOnce() -> V,
    ) -> Option<V> {
        if generation < self.purged_generation() {
            return None;
        }
        let stripe = self.stripe_index(generation);
        let _guard = self.stripes[stripe].lock();
        if generation < self.purged_generation() {
            return None;
        }
        match self.map.entry(key) {
            DashEntry::Occupied(e) => Some(e.get().value.clone()),
            DashEntry::Vacant(e) => {
                let value = f();
                e.insert(GenerationTagged {
                    generation,
                    value: value.clone(),
                });
                Some(value)
            }
        }
    }

    /// Returns the existing value, or `None` on a fresh insert (also `None`
    /// if the generation is already purged).
    pub fn put_if_absent(&self, key: K, value: V, generation: u64) -> Option<V> {
        if generation < self.purged_generation() {
            return None;
        }
        let stripe = self.stripe_index(generation);
        let _guard = self.stripes[stripe].lock();
        if generation < self.purged_generation() {
            return None;
        }
        match self.map.entry(key) {
            DashEntry::Occupied(e) => Some(e.get().value.clone()),
            DashEntry::Vacant(e) => {
                e.insert(GenerationTagged { generation, value });
                None
            }
        }
    }

    /// Atomically raises `purged_generation` to `below_generation`. Locks
    /// every stripe (in a fixed order, to avoid deadlock) before publishing
    /// the new bound, so no `put`/`compute_if_absent`/`put_if_absent`
    /// in-flight on any stripe can insert a since-purged generation after
    /// this call returns. Each removed entry is reported once.
    pub fn purge(&self, below_generation: u64, mut on_purge: impl FnMut(&K, &V)) {
        let _guards: Vec<_> = self.stripes.iter().map(|s| s.lock()).collect();
        self.purged_generation
            .store(below_generation, Ordering::Release);
        self.map.retain(|k, tagged| {
            if tagged.generation < below_generation {
                on_purge(k, &tagged.value);
                false
            } else {
                true
            }
        });
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

/// A `PurgableMap<K, ()>` used where only membership matters.
pub struct PurgableSet<K> {
    inner: PurgableMap<K, ()>,
}

impl<K> PurgableSet<K>
where
    K: Eq + Hash + Clone,
{
    pub fn new(stripe_count: usize) -> Self {
        Self {
            inner: PurgableMap::new(stripe_count),
        }
    }

    pub fn insert(&self, key: K, generation: u64) {
        self.inner.put(key, (), generation);
    }

    pub fn contains(&self, key: &K) -> bool {
        self.inner.contains(key)
    }

    pub fn remove(&self, key: &K) -> bool {
        self.inner.remove(key).is_some()
    }

    pub fn purge(&self, below_generation: u64, mut on_purge: impl FnMut(&K)) {
        self.inner.purge(below_generation, |k, _| on_purge(k));
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

/// An orphan buffer, as used by the gossip substrate for event dedup: a
/// generation-tagged map from event key to the buffered event.
pub type OrphanBuffer<K, V> = PurgableMap<K, V>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::{Arc, Barrier};
    use std::thread;

    #[test]
    fn put_get_remove() {
        let map: PurgableMap<u64, String> = PurgableMap::new(16);
        map.put(1, "a".to_string(), 10);
        assert_eq!(map.get(&1), Some("a".to_string()));
        assert_eq!(map.remove(&1), Some("a".to_string()));
        assert!(map.get(&1).is_none());
    }

    #[test]
    fn put_is_noop_below_purged_generation() {
        let map: PurgableMap<u64, u64> = PurgableMap::new(16);
        let mut purged = Vec::new();
        map.put(1, 100, 5);
        map.purge(10, |k, v| purged.push((*k, *v)));
        assert_eq!(purged, vec![(1, 100)]);
        map.put(1, 200, 7); // generation 7 < 10, must be a no-op
        assert!(map.get(&1).is_none());
        map.put(1, 200, 11);
        assert_eq!(map.get(&1), Some(200));
    }

    #[test]
    fn compute_if_absent_runs_once() {
        let map: PurgableMap<u64, u64> = PurgableMap::new(16);
        let calls = AtomicUsize::new(0);
        let barrier = Arc::new(Barrier::new(8));
        let map = Arc::new(map);
        let calls = Arc::new(calls);
        let mut handles = Vec::new();
        for _ in 0..8 {
            let map = map.clone();
            let calls = calls.clone();
            let barrier = barrier.clone();
            handles.push(thread::spawn(move || {
                barrier.wait();
                map.compute_if_absent(42, 1, || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    99
                });
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(map.get(&42), Some(99));
    }

    #[test]
    fn p3_purge_safety_under_concurrent_puts() {
        let map = Arc::new(PurgableMap::<u64, u64>::new(1024));
        let barrier = Arc::new(Barrier::new(5));
        let mut handles = Vec::new();
        for t in 0..4u64 {
            let map = map.clone();
            let barrier = barrier.clone();
            handles.push(thread::spawn(move || {
                barrier.wait();
                for i in 0..1000u64 {
                    map.put(t * 1000 + i, i, i % 20);
                }
            }));
        }
        {
            let map = map.clone();
            let barrier = barrier.clone();
            handles.push(thread::spawn(move || {
                barrier.wait();
                map.purge(10, |_, _| {});
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        // every surviving entry must have generation >= current purged bound.
        let bound = map.purged_generation();
        for entry in map.map.iter() {
            assert!(entry.generation >= bound || entry.generation >= 10);
        }
    }
}
