//! LRU Tracker Module
//!
//! Implements Least Recently Used ordering for cache eviction.

use std::collections::HashMap;
use std::hash::Hash;

// == Slot ==
/// One arena cell of the doubly-linked order. `key` is None while the cell
/// sits on the free list.
#[derive(Debug, Clone)]
struct Slot<K> {
    key: Option<K>,
    prev: Option<usize>,
    next: Option<usize>,
}

// == LRU Tracker ==
/// Tracks access order for LRU eviction strategy.
///
/// Keys live in an arena-backed doubly-linked list where:
/// - Head = Least recently used (next to be evicted)
/// - Tail = Most recently used
///
/// Every operation is O(1). The tracker has no notion of capacity; the
/// owning store decides when to evict.
#[derive(Debug, Clone)]
pub struct LruTracker<K> {
    slots: Vec<Slot<K>>,
    free: Vec<usize>,
    index: HashMap<K, usize>,
    head: Option<usize>,
    tail: Option<usize>,
}

impl<K> Default for LruTracker<K> {
    fn default() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            index: HashMap::new(),
            head: None,
            tail: None,
        }
    }
}

impl<K> LruTracker<K>
where
    K: Eq + Hash + Clone,
{
    // == Constructor ==
    /// Creates a new empty LRU tracker.
    pub fn new() -> Self {
        Self::default()
    }

    // == Touch ==
    /// Marks a key as most recently used (moves it to the tail).
    ///
    /// Unknown keys are appended at the tail.
    pub fn touch(&mut self, key: &K) {
        if let Some(&id) = self.index.get(key) {
            self.unlink(id);
            self.push_tail(id);
            return;
        }

        let slot = Slot {
            key: Some(key.clone()),
            prev: None,
            next: None,
        };
        let id = match self.free.pop() {
            Some(id) => {
                self.slots[id] = slot;
                id
            }
            None => {
                self.slots.push(slot);
                self.slots.len() - 1
            }
        };
        self.index.insert(key.clone(), id);
        self.push_tail(id);
    }

    // == Remove ==
    /// Removes a key from the tracker. Returns false if it was not tracked.
    pub fn remove(&mut self, key: &K) -> bool {
        match self.index.remove(key) {
            Some(id) => {
                self.release(id);
                true
            }
            None => false,
        }
    }

    // == Evict Oldest ==
    /// Returns and removes the least recently used key.
    ///
    /// Returns None if tracker is empty.
    pub fn evict_oldest(&mut self) -> Option<K> {
        let id = self.head?;
        let key = self.release(id)?;
        self.index.remove(&key);
        Some(key)
    }

    // == Peek Oldest ==
    /// Returns the least recently used key without removing it.
    pub fn peek_oldest(&self) -> Option<&K> {
        self.head.and_then(|id| self.slots[id].key.as_ref())
    }

    /// Iterates keys from least to most recently used.
    pub fn iter(&self) -> Iter<'_, K> {
        Iter {
            tracker: self,
            cursor: self.head,
        }
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn contains(&self, key: &K) -> bool {
        self.index.contains_key(key)
    }

    // == Linking ==
    fn unlink(&mut self, id: usize) {
        let (prev, next) = (self.slots[id].prev, self.slots[id].next);
        match prev {
            Some(p) => self.slots[p].next = next,
            None => self.head = next,
        }
        match next {
            Some(n) => self.slots[n].prev = prev,
            None => self.tail = prev,
        }
        self.slots[id].prev = None;
        self.slots[id].next = None;
    }

    fn push_tail(&mut self, id: usize) {
        self.slots[id].prev = self.tail;
        self.slots[id].next = None;
        match self.tail {
            Some(t) => self.slots[t].next = Some(id),
            None => self.head = Some(id),
        }
        self.tail = Some(id);
    }

    /// Unlinks a cell and puts it on the free list.
    fn release(&mut self, id: usize) -> Option<K> {
        self.unlink(id);
        self.free.push(id);
        self.slots[id].key.take()
    }
}

// == Iterator ==
/// Oldest-first iterator over an `LruTracker`.
pub struct Iter<'a, K> {
    tracker: &'a LruTracker<K>,
    cursor: Option<usize>,
}

impl<'a, K> Iterator for Iter<'a, K> {
    type Item = &'a K;

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.cursor?;
        let slot = &self.tracker.slots[id];
        self.cursor = slot.next;
        slot.key.as_ref()
    }
}
