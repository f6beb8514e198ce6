//! Bounded store of already-processed event keys.
//!
//! Repeated polls may re-fetch overlapping log ranges, so every record is
//! checked here before it can touch the price history. Membership is bounded:
//! once the store grows past its capacity the oldest keys (in insertion
//! order) are evicted in one chunk. A key evicted this way can be processed
//! again if it resurfaces much later.

use crate::models::DedupKey;
use std::collections::{HashSet, VecDeque};

#[derive(Debug, Clone)]
pub struct DedupeStore {
    order: VecDeque<DedupKey>,
    members: HashSet<DedupKey>,
    capacity: usize,
    prune_fraction: f64,
}

impl DedupeStore {
    pub fn new(capacity: usize, prune_fraction: f64) -> Self {
        Self {
            order: VecDeque::new(),
            members: HashSet::new(),
            capacity: capacity.max(1),
            prune_fraction: prune_fraction.clamp(0.0, 1.0),
        }
    }

    /// Rebuild a store from keys listed oldest first, enforcing the bound.
    pub fn from_keys<I>(keys: I, capacity: usize, prune_fraction: f64) -> Self
    where
        I: IntoIterator<Item = DedupKey>,
    {
        let mut store = Self::new(capacity, prune_fraction);
        for key in keys {
            if store.members.insert(key) {
                store.order.push_back(key);
            }
        }
        // Restored sets only need to fit, not shed a full chunk.
        while store.order.len() > store.capacity {
            if let Some(old) = store.order.pop_front() {
                store.members.remove(&old);
            }
        }
        store
    }

    pub fn seen(&self, key: &DedupKey) -> bool {
        self.members.contains(key)
    }

    /// Record a key. Returns the number of keys evicted to stay within capacity.
    pub fn mark_seen(&mut self, key: DedupKey) -> usize {
        if !self.members.insert(key) {
            return 0;
        }
        self.order.push_back(key);
        self.prune()
    }

    /// Trim to the capacity bound, dropping the oldest chunk of keys.
    ///
    /// The chunk is `prune_fraction` of capacity, but never less than the
    /// overflow itself.
    pub fn prune(&mut self) -> usize {
        let len = self.order.len();
        if len <= self.capacity {
            return 0;
        }
        let overflow = len - self.capacity;
        let chunk = (self.capacity as f64 * self.prune_fraction).floor() as usize;
        let evict = overflow.max(chunk).min(len);
        for old in self.order.drain(..evict) {
            self.members.remove(&old);
        }
        tracing::debug!(evicted = evict, remaining = self.order.len(), "[DEDUP] pruned oldest keys");
        evict
    }

    /// Keys in insertion order, oldest first.
    pub fn keys(&self) -> impl Iterator<Item = &DedupKey> {
        self.order.iter()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::B256;

    fn key(n: u8) -> DedupKey {
        DedupKey::new(B256::repeat_byte(n), n as u64)
    }

    #[test]
    fn marked_keys_are_seen() {
        let mut store = DedupeStore::new(10, 0.2);
        assert!(!store.seen(&key(1)));
        store.mark_seen(key(1));
        assert!(store.seen(&key(1)));
        // same tx, different log index is a different event
        assert!(!store.seen(&DedupKey::new(B256::repeat_byte(1), 2)));
    }

    #[test]
    fn remarking_is_a_no_op() {
        let mut store = DedupeStore::new(10, 0.2);
        store.mark_seen(key(1));
        store.mark_seen(key(1));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn capacity_three_evicts_only_the_oldest() {
        let mut store = DedupeStore::new(3, 0.2);
        for n in 1..=3 {
            assert_eq!(store.mark_seen(key(n)), 0);
        }
        assert_eq!(store.mark_seen(key(4)), 1);
        assert!(!store.seen(&key(1)));
        for n in 2..=4 {
            assert!(store.seen(&key(n)), "key {n} should survive");
        }
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn large_store_evicts_a_fifth_at_once() {
        let mut store = DedupeStore::new(100, 0.2);
        for n in 0..100u64 {
            store.mark_seen(DedupKey::new(B256::ZERO, n));
        }
        assert_eq!(store.len(), 100);
        let evicted = store.mark_seen(DedupKey::new(B256::ZERO, 100));
        assert_eq!(evicted, 20);
        assert_eq!(store.len(), 81);
        assert!(!store.seen(&DedupKey::new(B256::ZERO, 19)));
        assert!(store.seen(&DedupKey::new(B256::ZERO, 20)));
        assert!(store.seen(&DedupKey::new(B256::ZERO, 100)));
    }

    #[test]
    fn restore_keeps_newest_keys_within_capacity() {
        let keys = (1..=5).map(key);
        let store = DedupeStore::from_keys(keys, 3, 0.2);
        let kept: Vec<_> = store.keys().copied().collect();
        assert_eq!(kept, vec![key(3), key(4), key(5)]);
    }
}
