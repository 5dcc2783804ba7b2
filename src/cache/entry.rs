//! Cache Entry Module
//!
//! Defines the per-entry record of the bounded LRU store, whose expiry is
//! measured from the last touch rather than from an absolute deadline.

use std::time::Duration;

use tokio::time::Instant;

// == LRU Entry ==
/// A value together with its idle-time bookkeeping.
#[derive(Debug, Clone)]
pub struct LruEntry<V> {
    /// The stored value
    pub value: V,
    /// Last successful read or write
    pub last_touch: Instant,
    /// Per-entry TTL, overrides the store default when set
    pub ttl: Option<Duration>,
}

impl<V> LruEntry<V> {
    // == Constructor ==
    /// Creates an entry touched now.
    ///
    /// A zero TTL counts as unset.
    pub fn new(value: V, ttl: Option<Duration>) -> Self {
        Self {
            value,
            last_touch: Instant::now(),
            ttl: ttl.filter(|ttl| !ttl.is_zero()),
        }
    }

    /// Resets the idle clock.
    pub fn touch(&mut self, now: Instant) {
        self.last_touch = now;
    }

    /// Per-entry TTL if set, else `default_ttl`.
    pub fn effective_ttl(&self, default_ttl: Option<Duration>) -> Option<Duration> {
        self.ttl.or(default_ttl)
    }

    // == Is Expired ==
    /// Checks whether the entry has been idle longer than its effective TTL.
    ///
    /// Boundary condition: idle time must strictly exceed the TTL. Entries
    /// with no effective TTL never expire.
    pub fn is_expired(&self, now: Instant, default_ttl: Option<Duration>) -> bool {
        match self.effective_ttl(default_ttl) {
            Some(ttl) => now.saturating_duration_since(self.last_touch) > ttl,
            None => false,
        }
    }
}
