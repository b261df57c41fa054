use std::collections::{HashMap, VecDeque};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::models::Order;

// ============================================================================
// Order Cache - bounded, insertion-ordered, concurrency-safe
// ============================================================================
//
// A fixed-capacity map from order id to the full aggregate, shared between
// the ingestion task and every request handler. Eviction is strict FIFO by
// insertion order: a frequently read entry is evicted just as readily as a
// never-read one. Reads take a shared lock, writes an exclusive one, and a
// single lock guards both the map and the arrival queue so the two can
// never disagree.
//
// The cache is an explicitly constructed instance, handed to its consumers
// as `Arc<OrderCache>`. Nothing else in the crate touches the inner state.
// ============================================================================

/// Reference capacity used by the binary. Fixed at construction time.
pub const DEFAULT_CAPACITY: usize = 100;

struct Inner {
    map: HashMap<String, Order>,
    /// Order ids in arrival order. Front is the next eviction candidate.
    arrival: VecDeque<String>,
}

pub struct OrderCache {
    inner: RwLock<Inner>,
    capacity: usize,
}

impl OrderCache {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "cache capacity must be non-zero");
        Self {
            inner: RwLock::new(Inner {
                map: HashMap::with_capacity(capacity),
                arrival: VecDeque::with_capacity(capacity),
            }),
            capacity,
        }
    }

    /// Look up an order by id. Holds the shared lock only for the clone,
    /// and has no side effects: a miss is not recorded and a hit does not
    /// protect the entry from eviction.
    pub fn get(&self, id: &str) -> Option<Order> {
        self.read().map.get(id).cloned()
    }

    /// Insert an order, evicting the oldest entry first when full.
    ///
    /// The first write for an id wins: a second `add` with the same id is
    /// silently discarded, which keeps replayed messages from reordering
    /// the arrival queue. Never fails and never rejects the new entry.
    pub fn add(&self, id: &str, order: Order) {
        let mut inner = self.write();

        if inner.map.contains_key(id) {
            return;
        }

        if inner.map.len() >= self.capacity {
            if let Some(oldest) = inner.arrival.pop_front() {
                inner.map.remove(&oldest);
                tracing::debug!(evicted = %oldest, inserted = %id, "cache full, evicted oldest entry");
            }
        }

        inner.map.insert(id.to_owned(), order);
        inner.arrival.push_back(id.to_owned());
    }

    pub fn len(&self) -> usize {
        self.read().map.len()
    }

    #[allow(dead_code)]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    // A poisoned lock means a writer panicked, but the map and queue are
    // only ever mutated as a pair inside one critical section with no
    // intervening panic point, so the data behind a poisoned guard is
    // still coherent. Recover it rather than propagate the panic.
    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    #[cfg(test)]
    fn assert_consistent(&self) {
        let inner = self.read();
        assert_eq!(
            inner.map.len(),
            inner.arrival.len(),
            "map and arrival queue diverged in size"
        );
        let mut seen = std::collections::HashSet::new();
        for id in &inner.arrival {
            assert!(inner.map.contains_key(id), "queued id {id} missing from map");
            assert!(seen.insert(id.clone()), "id {id} queued twice");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::testing::order_fixture;
    use std::sync::Arc;

    #[test]
    fn get_on_empty_cache_misses() {
        let cache = OrderCache::new(2);
        assert!(cache.get("nope").is_none());
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn add_then_get_round_trips_the_order() {
        let cache = OrderCache::new(2);
        let order = order_fixture("a");
        cache.add("a", order.clone());
        assert_eq!(cache.get("a"), Some(order));
    }

    #[test]
    fn capacity_is_never_exceeded() {
        let cache = OrderCache::new(3);
        for i in 0..50 {
            let id = format!("order-{i}");
            cache.add(&id, order_fixture(&id));
            assert!(cache.len() <= 3);
        }
        cache.assert_consistent();
        assert_eq!(cache.len(), 3);
    }

    #[test]
    fn eviction_is_fifo_by_insertion_order() {
        let cache = OrderCache::new(2);
        cache.add("a", order_fixture("a"));
        cache.add("b", order_fixture("b"));
        cache.add("c", order_fixture("c"));

        assert!(cache.get("a").is_none());
        assert!(cache.get("b").is_some());
        assert!(cache.get("c").is_some());
        cache.assert_consistent();
    }

    #[test]
    fn reads_do_not_protect_entries_from_eviction() {
        let cache = OrderCache::new(2);
        cache.add("a", order_fixture("a"));
        cache.add("b", order_fixture("b"));

        // "a" is the oldest entry and stays the eviction candidate even
        // after being read.
        assert!(cache.get("a").is_some());
        cache.add("c", order_fixture("c"));

        assert!(cache.get("a").is_none());
        assert!(cache.get("b").is_some());
        assert!(cache.get("c").is_some());
    }

    #[test]
    fn first_write_wins_for_duplicate_ids() {
        let cache = OrderCache::new(2);
        let first = order_fixture("dup");
        let mut second = order_fixture("dup");
        second.track_number = "OTHERTRACK".into();

        cache.add("dup", first.clone());
        cache.add("dup", second);

        assert_eq!(cache.get("dup"), Some(first));
        assert_eq!(cache.len(), 1);
        cache.assert_consistent();
    }

    #[test]
    fn duplicate_add_does_not_reorder_eviction() {
        let cache = OrderCache::new(2);
        cache.add("a", order_fixture("a"));
        cache.add("b", order_fixture("b"));
        // Re-adding "a" must not move it to the back of the queue.
        cache.add("a", order_fixture("a"));
        cache.add("c", order_fixture("c"));

        assert!(cache.get("a").is_none());
        assert!(cache.get("b").is_some());
    }

    #[test]
    fn concurrent_adds_and_gets_keep_map_and_queue_consistent() {
        let cache = Arc::new(OrderCache::new(16));
        let mut handles = Vec::new();

        for t in 0..8u64 {
            let cache = Arc::clone(&cache);
            handles.push(std::thread::spawn(move || {
                // Small deterministic LCG per thread; keys overlap across
                // threads so duplicate inserts and racing evictions happen.
                let mut x = t.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
                for _ in 0..500 {
                    x = x.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
                    let key = format!("order-{}", x % 48);
                    if x % 3 == 0 {
                        let _ = cache.get(&key);
                    } else {
                        cache.add(&key, order_fixture(&key));
                    }
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        cache.assert_consistent();
        assert!(cache.len() <= 16);
    }
}
