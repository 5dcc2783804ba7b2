//! Expiry Index Module
//!
//! A binary min-heap of deadlines that also tracks the slot of every key,
//! so a key can be re-prioritized or removed in O(log n) without a scan.

use std::collections::HashMap;
use std::hash::Hash;

use tokio::time::Instant;

// == Heap Node ==
#[derive(Debug, Clone)]
struct HeapNode<K, T> {
    key: K,
    expires_at: T,
}

// == Expiry Index ==
/// Min-heap keyed by expiry deadline.
///
/// `slots` maps each key to its current position in `heap` and is rewritten
/// on every swap. Equal deadlines pop in no particular order.
#[derive(Debug, Clone)]
pub struct ExpiryIndex<K, T = Instant> {
    heap: Vec<HeapNode<K, T>>,
    slots: HashMap<K, usize>,
}

impl<K, T> Default for ExpiryIndex<K, T> {
    fn default() -> Self {
        Self {
            heap: Vec::new(),
            slots: HashMap::new(),
        }
    }
}

impl<K, T> ExpiryIndex<K, T>
where
    K: Eq + Hash + Clone,
    T: Ord + Copy,
{
    // == Constructor ==
    /// Creates an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    // == Insert ==
    /// Schedules `key` to expire at `expires_at`.
    ///
    /// A key that is already scheduled is re-prioritized instead of duplicated.
    pub fn insert(&mut self, key: K, expires_at: T) {
        if self.update_expiry(&key, expires_at) {
            return;
        }

        let slot = self.heap.len();
        self.slots.insert(key.clone(), slot);
        self.heap.push(HeapNode { key, expires_at });
        self.sift_up(slot);
    }

    // == Update Expiry ==
    /// Moves an existing key to a new deadline.
    ///
    /// Returns false when the key is not scheduled.
    pub fn update_expiry(&mut self, key: &K, expires_at: T) -> bool {
        let Some(&slot) = self.slots.get(key) else {
            return false;
        };
        self.heap[slot].expires_at = expires_at;
        self.fix(slot);
        true
    }

    // == Peek Min ==
    /// Returns the earliest deadline without removing it.
    pub fn peek_min(&self) -> Option<(&K, T)> {
        self.heap.first().map(|node| (&node.key, node.expires_at))
    }

    // == Pop Min ==
    /// Removes and returns the earliest deadline.
    pub fn pop_min(&mut self) -> Option<(K, T)> {
        if self.heap.is_empty() {
            return None;
        }

        let last = self.heap.len() - 1;
        self.swap_nodes(0, last);
        let node = self.heap.pop()?;
        self.slots.remove(&node.key);
        if !self.heap.is_empty() {
            self.sift_down(0);
        }
        Some((node.key, node.expires_at))
    }

    // == Remove ==
    /// Unschedules `key`, returning its deadline if it was present.
    pub fn remove(&mut self, key: &K) -> Option<T> {
        let slot = *self.slots.get(key)?;
        let last = self.heap.len() - 1;
        self.swap_nodes(slot, last);
        let node = self.heap.pop()?;
        self.slots.remove(&node.key);
        if slot < self.heap.len() {
            self.fix(slot);
        }
        Some(node.expires_at)
    }

    /// Returns the deadline scheduled for `key`.
    pub fn expiry_of(&self, key: &K) -> Option<T> {
        self.slots.get(key).map(|&slot| self.heap[slot].expires_at)
    }

    pub fn contains(&self, key: &K) -> bool {
        self.slots.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    // == Heap Maintenance ==
    fn fix(&mut self, slot: usize) {
        if !self.sift_up(slot) {
            self.sift_down(slot);
        }
    }

    fn sift_up(&mut self, mut slot: usize) -> bool {
        let mut moved = false;
        while slot > 0 {
            let parent = (slot - 1) / 2;
            if self.heap[slot].expires_at >= self.heap[parent].expires_at {
                break;
            }
            self.swap_nodes(slot, parent);
            slot = parent;
            moved = true;
        }
        moved
    }

    fn sift_down(&mut self, mut slot: usize) {
        let len = self.heap.len();
        loop {
            let left = 2 * slot + 1;
            let right = left + 1;
            let mut smallest = slot;

            if left < len && self.heap[left].expires_at < self.heap[smallest].expires_at {
                smallest = left;
            }
            if right < len && self.heap[right].expires_at < self.heap[smallest].expires_at {
                smallest = right;
            }
            if smallest == slot {
                break;
            }
            self.swap_nodes(slot, smallest);
            slot = smallest;
        }
    }

    /// Swaps two heap slots and records their new positions.
    fn swap_nodes(&mut self, a: usize, b: usize) {
        if a == b {
            return;
        }
        self.heap.swap(a, b);
        if let Some(pos) = self.slots.get_mut(&self.heap[a].key) {
            *pos = a;
        }
        if let Some(pos) = self.slots.get_mut(&self.heap[b].key) {
            *pos = b;
        }
    }
}
