//! Cache Module
//!
//! The `Cache` contract shared by every backend, plus the in-process stores:
//! an unbounded map with deadline-ordered sweeping and a capacity-bounded
//! LRU map with idle-time expiry.

mod entry;
mod expiry;
mod lru;
mod lru_store;
mod simple;
mod stats;
mod ttl_store;


use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::Result;
use crate::options::CallOptions;

// Re-export public types
pub use entry::LruEntry;
pub use expiry::ExpiryIndex;
pub use lru::LruTracker;
pub use lru_store::LruStore;
pub use simple::{NoOpStore, SimpleStore};
pub use stats::CacheStats;
pub use ttl_store::TtlStore;

// == Cache Trait ==
/// Uniform key-value contract implemented by every backend.
///
/// Missing and expired keys both surface as `CacheError::NotFound` from
/// `get`, and are silently left out of `mget` results.
#[async_trait]
pub trait Cache<K, V>: Send + Sync
where
    K: Send + Sync,
    V: Send,
{
    /// Retrieves the value stored under `key`.
    async fn get(&self, key: &K, options: &CallOptions) -> Result<V>;

    /// Stores `value` under `key`, honoring `options.ttl` when positive.
    async fn set(&self, key: K, value: V, options: &CallOptions) -> Result<()>;

    /// Retrieves every live key of `keys`; absent keys are omitted.
    async fn mget(&self, keys: &[K], options: &CallOptions) -> Result<HashMap<K, V>>;

    /// Stores every pair of `items` with the same options.
    async fn mset(&self, items: HashMap<K, V>, options: &CallOptions) -> Result<()>;

    /// Checks whether a live entry exists for `key`.
    async fn exists(&self, key: &K, options: &CallOptions) -> Result<bool>;

    /// Removes `key`. Removing an absent key is not an error.
    async fn delete(&self, key: &K, options: &CallOptions) -> Result<()>;

    /// Removes every entry.
    async fn clear(&self, options: &CallOptions) -> Result<()>;

    /// Hit/miss counters, for backends that keep them.
    async fn stats(&self) -> Option<CacheStats> {
        None
    }
}
