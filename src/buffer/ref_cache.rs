//! Reference-counted cache with pluggable fetch/evict behavior.
//!
//! [`RefCache`] keys values by u64 and keeps each one resident while at
//! least one caller holds a reference to it. The cache itself knows
//! nothing about pages or records; a [`Backing`] supplies the value on
//! miss and observes eviction when the last reference is dropped.

use std::collections::{HashMap, HashSet};
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;

use crate::common::{Error, Result};

/// How long a caller sleeps between polls while another thread is
/// fetching the same key.
const FETCH_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Source of truth behind a [`RefCache`].
///
/// `fetch` loads the value for a missing key; `evict` is called exactly
/// once when the last reference to a cached value is released, and is
/// the place to write back dirty state.
pub trait Backing {
    /// The cached value. Cloning must be cheap (an `Arc` in practice).
    type Value: Clone;

    fn fetch(&self, key: u64) -> Result<Self::Value>;

    fn evict(&self, value: &Self::Value);
}

struct Slot<V> {
    value: V,
    refs: usize,
}

struct Slots<V> {
    resident: HashMap<u64, Slot<V>>,
    /// Keys some thread is currently fetching. Counted against
    /// capacity so concurrent misses cannot overshoot the budget.
    in_flight: HashSet<u64>,
}

/// A reference-counted cache over a [`Backing`].
///
/// # Concurrency
/// A single mutex guards the slot table. Fetches run *outside* the
/// mutex: the key is reserved in `in_flight` first, so at most one
/// thread loads a given key while others poll for it. Eviction write-
/// back runs under the mutex, which serializes flushes per cache.
///
/// # Capacity
/// `capacity == 0` means unbounded. Otherwise a miss when
/// `resident + in_flight` has reached capacity fails with
/// [`Error::CacheFull`] — entries are never evicted while referenced,
/// so there is nothing to make room with.
pub struct RefCache<B: Backing> {
    backing: B,
    capacity: usize,
    slots: Mutex<Slots<B::Value>>,
}

impl<B: Backing> RefCache<B> {
    pub fn new(backing: B, capacity: usize) -> Self {
        Self {
            backing,
            capacity,
            slots: Mutex::new(Slots {
                resident: HashMap::new(),
                in_flight: HashSet::new(),
            }),
        }
    }

    /// Access to the backing for operations that bypass the cache.
    pub fn backing(&self) -> &B {
        &self.backing
    }

    /// Get the value for `key`, taking a reference on it.
    ///
    /// Every successful `get` must be paired with a [`release`].
    ///
    /// [`release`]: RefCache::release
    pub fn get(&self, key: u64) -> Result<B::Value> {
        loop {
            let mut slots = self.slots.lock();

            if slots.in_flight.contains(&key) {
                drop(slots);
                thread::sleep(FETCH_POLL_INTERVAL);
                continue;
            }

            if let Some(slot) = slots.resident.get_mut(&key) {
                slot.refs += 1;
                return Ok(slot.value.clone());
            }

            if self.capacity > 0
                && slots.resident.len() + slots.in_flight.len() >= self.capacity
            {
                return Err(Error::CacheFull);
            }

            slots.in_flight.insert(key);
            break;
        }

        // Slow path: load without holding the slot table.
        let fetched = self.backing.fetch(key);

        let mut slots = self.slots.lock();
        slots.in_flight.remove(&key);
        let value = fetched?;
        slots.resident.insert(
            key,
            Slot {
                value: value.clone(),
                refs: 1,
            },
        );
        Ok(value)
    }

    /// Drop one reference to `key`. When the count reaches zero the
    /// value is evicted and handed to the backing for write-back.
    pub fn release(&self, key: u64) {
        let mut slots = self.slots.lock();

        let gone = match slots.resident.get_mut(&key) {
            Some(slot) => {
                slot.refs -= 1;
                slot.refs == 0
            }
            None => false,
        };

        if gone {
            if let Some(slot) = slots.resident.remove(&key) {
                self.backing.evict(&slot.value);
            }
        }
    }

    /// Evict everything, referenced or not. Used on shutdown, when all
    /// outstanding references are known to be done.
    pub fn close(&self) {
        let mut slots = self.slots.lock();
        for (_, slot) in slots.resident.drain() {
            self.backing.evict(&slot.value);
        }
    }

    #[cfg(test)]
    fn resident_count(&self) -> usize {
        self.slots.lock().resident.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Returns the key itself; counts fetches and evictions.
    struct CountingBacking {
        fetches: AtomicUsize,
        evictions: AtomicUsize,
    }

    impl CountingBacking {
        fn new() -> Self {
            Self {
                fetches: AtomicUsize::new(0),
                evictions: AtomicUsize::new(0),
            }
        }
    }

    impl Backing for CountingBacking {
        type Value = Arc<u64>;

        fn fetch(&self, key: u64) -> Result<Arc<u64>> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(key))
        }

        fn evict(&self, _value: &Arc<u64>) {
            self.evictions.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_hit_does_not_refetch() {
        let cache = RefCache::new(CountingBacking::new(), 0);

        let a = cache.get(7).unwrap();
        let b = cache.get(7).unwrap();
        assert_eq!(*a, 7);
        assert_eq!(*b, 7);
        assert_eq!(cache.backing().fetches.load(Ordering::SeqCst), 1);

        cache.release(7);
        // Still referenced once, so not evicted.
        assert_eq!(cache.backing().evictions.load(Ordering::SeqCst), 0);
        cache.release(7);
        assert_eq!(cache.backing().evictions.load(Ordering::SeqCst), 1);
        assert_eq!(cache.resident_count(), 0);
    }

    #[test]
    fn test_refetch_after_full_release() {
        let cache = RefCache::new(CountingBacking::new(), 0);

        cache.get(1).unwrap();
        cache.release(1);
        cache.get(1).unwrap();
        cache.release(1);

        assert_eq!(cache.backing().fetches.load(Ordering::SeqCst), 2);
        assert_eq!(cache.backing().evictions.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_cache_full() {
        let cache = RefCache::new(CountingBacking::new(), 2);

        cache.get(1).unwrap();
        cache.get(2).unwrap();
        match cache.get(3) {
            Err(Error::CacheFull) => {}
            other => panic!("expected CacheFull, got {:?}", other.map(|v| *v)),
        }

        // Releasing one makes room again.
        cache.release(1);
        cache.get(3).unwrap();
    }

    #[test]
    fn test_close_evicts_referenced_entries() {
        let cache = RefCache::new(CountingBacking::new(), 0);

        cache.get(1).unwrap();
        cache.get(2).unwrap();
        cache.close();

        assert_eq!(cache.backing().evictions.load(Ordering::SeqCst), 2);
        assert_eq!(cache.resident_count(), 0);
    }

    #[test]
    fn test_fetch_error_does_not_leak_slot() {
        struct FailingBacking;
        impl Backing for FailingBacking {
            type Value = Arc<u64>;
            fn fetch(&self, _key: u64) -> Result<Arc<u64>> {
                Err(Error::PageNotFound(0))
            }
            fn evict(&self, _value: &Arc<u64>) {}
        }

        let cache = RefCache::new(FailingBacking, 1);
        assert!(cache.get(1).is_err());
        // The reservation must be rolled back or the cache is wedged.
        assert!(matches!(cache.get(2), Err(Error::PageNotFound(0))));
    }

    #[test]
    fn test_concurrent_fetch_single_load() {
        let cache = Arc::new(RefCache::new(CountingBacking::new(), 0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = Arc::clone(&cache);
            handles.push(thread::spawn(move || {
                let v = cache.get(5).unwrap();
                assert_eq!(*v, 5);
            }));
        }
        for h in handles {
            h.join().unwrap();
        }

        // All threads share one resident slot; the load may race ahead
        // of the polls but the slot count must converge to one.
        assert_eq!(cache.resident_count(), 1);
    }
}
