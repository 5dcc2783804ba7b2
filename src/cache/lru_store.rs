//! LRU Store Module
//!
//! Capacity-bounded in-process store. Recency lives in an `LruTracker`;
//! expiry is measured as idle time since the last touch, and a re-arming
//! sweeper reclaims idle entries in bounded batches.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

use crate::cache::{Cache, CacheStats, LruEntry, LruTracker};
use crate::config::LruStoreConfig;
use crate::error::{CacheError, Result};
use crate::options::CallOptions;
use crate::tasks::{spawn_sweeper, Schedule, SweepHandle};

// == LRU State ==
#[derive(Debug)]
struct LruState<K, V> {
    entries: HashMap<K, LruEntry<V>>,
    order: LruTracker<K>,
    /// Zero disables bounding
    capacity: usize,
    default_ttl: Option<Duration>,
    stats: CacheStats,
}

impl<K, V> LruState<K, V>
where
    K: Eq + Hash + Clone,
{
    fn new(capacity: usize, default_ttl: Option<Duration>) -> Self {
        Self {
            entries: HashMap::new(),
            order: LruTracker::new(),
            capacity,
            default_ttl: default_ttl.filter(|ttl| !ttl.is_zero()),
            stats: CacheStats::new(),
        }
    }

    /// Looks up a live entry. Idle entries are dropped; `touch` marks a hit
    /// as most recently used and resets its idle clock.
    fn lookup(&mut self, key: &K, now: Instant, touch: bool) -> Option<&V> {
        let expired = self.entries.get(key)?.is_expired(now, self.default_ttl);
        if expired {
            self.remove(key);
            self.stats.record_expirations(1);
            return None;
        }

        if touch {
            self.order.touch(key);
        }
        let entry = self.entries.get_mut(key)?;
        if touch {
            entry.touch(now);
        }
        Some(&entry.value)
    }

    /// Upserts a value, replacing its TTL, then enforces capacity once.
    fn store(&mut self, key: K, value: V, ttl: Option<Duration>, now: Instant) {
        match self.entries.get_mut(&key) {
            Some(entry) => {
                entry.value = value;
                entry.ttl = ttl;
                entry.touch(now);
            }
            None => {
                let mut entry = LruEntry::new(value, ttl);
                entry.touch(now);
                self.entries.insert(key.clone(), entry);
            }
        }
        self.order.touch(&key);
        self.enforce_capacity();
    }

    fn remove(&mut self, key: &K) {
        if self.entries.remove(key).is_some() {
            self.order.remove(key);
        }
    }

    /// Evicts from the head of the access order until within capacity.
    fn enforce_capacity(&mut self) {
        if self.capacity == 0 {
            return;
        }
        while self.entries.len() > self.capacity {
            match self.order.evict_oldest() {
                Some(evicted) => {
                    self.entries.remove(&evicted);
                    self.stats.record_eviction();
                }
                None => break,
            }
        }
    }

    /// Walks from the least recently used end and drops idle entries, at
    /// most `budget` of them (zero means no limit).
    fn sweep(&mut self, now: Instant, budget: usize) -> usize {
        let default_ttl = self.default_ttl;
        // Idle entries can sit anywhere in the access order, so this scans
        // every key under the lock even when `budget` is small.
        let idle: Vec<K> = self
            .order
            .iter()
            .filter(|key| {
                self.entries
                    .get(*key)
                    .is_some_and(|entry| entry.is_expired(now, default_ttl))
            })
            .take(if budget == 0 { usize::MAX } else { budget })
            .cloned()
            .collect();

        for key in &idle {
            self.remove(key);
        }
        self.stats.record_expirations(idle.len());
        idle.len()
    }
}

// == LRU Store ==
/// Capacity-bounded store with idle-time expiry.
///
/// A successful `get` refreshes both recency and the idle clock; `exists`
/// refreshes neither. Writing a key replaces its value and its TTL.
pub struct LruStore<K, V> {
    state: Arc<Mutex<LruState<K, V>>>,
    sweep_batch: usize,
    sweeper: SweepHandle,
}

impl<K, V> LruStore<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    // == Constructor ==
    /// Creates a store of the given capacity with default TTL and sweep settings.
    pub fn new(capacity: usize) -> Self {
        Self::with_config(LruStoreConfig::with_capacity(capacity))
    }

    /// Creates a store and starts its sweeper.
    pub fn with_config(config: LruStoreConfig) -> Self {
        let state = Arc::new(Mutex::new(LruState::new(
            config.capacity,
            config.default_ttl,
        )));
        let weak = Arc::downgrade(&state);
        let batch = config.sweep_batch;

        let sweeper = spawn_sweeper("lru", config.sweep_interval, Schedule::Rearm, move || {
            let weak = weak.clone();
            async move {
                let state = weak.upgrade()?;
                let mut guard = state.lock().await;
                Some(guard.sweep(Instant::now(), batch))
            }
        });

        Self {
            state,
            sweep_batch: config.sweep_batch,
            sweeper,
        }
    }

    // == Adjust Capacity ==
    /// Changes the capacity, evicting least recently used entries until the
    /// store fits. Zero removes the bound.
    pub async fn adjust_capacity(&self, capacity: usize) {
        let mut state = self.state.lock().await;
        let before = state.entries.len();
        state.capacity = capacity;
        state.enforce_capacity();

        let evicted = before - state.entries.len();
        if evicted > 0 {
            debug!(capacity, evicted, "Capacity reduced, evicted entries");
        }
    }

    pub async fn capacity(&self) -> usize {
        self.state.lock().await.capacity
    }

    /// Runs one sweep pass now, returning the number of entries removed.
    pub async fn sweep_expired(&self) -> usize {
        let mut state = self.state.lock().await;
        state.sweep(Instant::now(), self.sweep_batch)
    }

    /// Number of stored entries, including idle ones not yet reclaimed.
    pub async fn len(&self) -> usize {
        self.state.lock().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Stops the background sweeper. Lazy expiry keeps working.
    pub fn shutdown(&self) {
        self.sweeper.shutdown();
    }

    pub fn sweeper_active(&self) -> bool {
        self.sweeper.is_active()
    }
}

#[async_trait]
impl<K, V> Cache<K, V> for LruStore<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    async fn get(&self, key: &K, _options: &CallOptions) -> Result<V> {
        let mut state = self.state.lock().await;
        match state.lookup(key, Instant::now(), true).cloned() {
            Some(value) => {
                state.stats.record_hit();
                Ok(value)
            }
            None => {
                state.stats.record_miss();
                Err(CacheError::NotFound)
            }
        }
    }

    async fn set(&self, key: K, value: V, options: &CallOptions) -> Result<()> {
        let mut state = self.state.lock().await;
        state.store(key, value, options.effective_ttl(), Instant::now());
        Ok(())
    }

    async fn mget(&self, keys: &[K], _options: &CallOptions) -> Result<HashMap<K, V>> {
        let mut state = self.state.lock().await;
        let now = Instant::now();
        let mut found = HashMap::with_capacity(keys.len());

        for key in keys {
            match state.lookup(key, now, true).cloned() {
                Some(value) => {
                    state.stats.record_hit();
                    found.insert(key.clone(), value);
                }
                None => state.stats.record_miss(),
            }
        }
        Ok(found)
    }

    async fn mset(&self, items: HashMap<K, V>, options: &CallOptions) -> Result<()> {
        let mut state = self.state.lock().await;
        let now = Instant::now();
        let ttl = options.effective_ttl();

        for (key, value) in items {
            state.store(key, value, ttl, now);
        }
        Ok(())
    }

    async fn exists(&self, key: &K, _options: &CallOptions) -> Result<bool> {
        let mut state = self.state.lock().await;
        Ok(state.lookup(key, Instant::now(), false).is_some())
    }

    async fn delete(&self, key: &K, _options: &CallOptions) -> Result<()> {
        self.state.lock().await.remove(key);
        Ok(())
    }

    async fn clear(&self, _options: &CallOptions) -> Result<()> {
        let mut state = self.state.lock().await;
        state.entries = HashMap::new();
        state.order = LruTracker::new();
        Ok(())
    }

    async fn stats(&self) -> Option<CacheStats> {
        let state = self.state.lock().await;
        let mut stats = state.stats.clone();
        stats.set_total_entries(state.entries.len());
        Some(stats)
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::sleep;

    fn opts() -> CallOptions {
        CallOptions::default()
    }

    fn lazy_store(capacity: usize, default_ttl: Option<Duration>) -> LruStore<String, usize> {
        LruStore::with_config(LruStoreConfig {
            capacity,
            default_ttl,
            sweep_interval: Duration::ZERO,
            sweep_batch: 20,
        })
    }

    async fn fill(store: &LruStore<String, usize>, range: std::ops::Range<usize>) {
        for i in range {
            store.set(i.to_string(), i, &opts()).await.unwrap();
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_overflow_evicts_earliest_inserted() {
        let store = lazy_store(3, None);
        fill(&store, 0..5).await;

        assert_eq!(store.len().await, 3);
        for i in 0..2 {
            assert!(!store.exists(&i.to_string(), &opts()).await.unwrap());
        }
        for i in 2..5 {
            assert_eq!(store.get(&i.to_string(), &opts()).await.unwrap(), i);
        }
        assert_eq!(store.stats().await.unwrap().evictions, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_get_refreshes_recency() {
        let store = lazy_store(3, None);
        fill(&store, 0..3).await;

        // Access "0" to make it most recently used
        store.get(&"0".to_string(), &opts()).await.unwrap();
        fill(&store, 3..4).await;

        assert!(store.exists(&"0".to_string(), &opts()).await.unwrap());
        assert!(!store.exists(&"1".to_string(), &opts()).await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_exists_does_not_refresh_recency() {
        let store = lazy_store(2, None);
        fill(&store, 0..2).await;

        store.exists(&"0".to_string(), &opts()).await.unwrap();
        fill(&store, 2..3).await;

        assert!(!store.exists(&"0".to_string(), &opts()).await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_overwrite_does_not_grow() {
        let store = lazy_store(2, None);
        store.set("a".to_string(), 1, &opts()).await.unwrap();
        store.set("a".to_string(), 2, &opts()).await.unwrap();

        assert_eq!(store.len().await, 1);
        assert_eq!(store.get(&"a".to_string(), &opts()).await.unwrap(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_expiry_uses_default_ttl() {
        let store = lazy_store(10, Some(Duration::from_secs(2)));
        store.set("a".to_string(), 1, &opts()).await.unwrap();

        sleep(Duration::from_secs(3)).await;
        assert_eq!(
            store.get(&"a".to_string(), &opts()).await,
            Err(CacheError::NotFound)
        );
        assert!(store.is_empty().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reads_keep_entry_alive() {
        let store = lazy_store(10, None);
        let ttl = CallOptions::new().with_ttl(Duration::from_secs(2));
        store.set("a".to_string(), 1, &ttl).await.unwrap();

        for _ in 0..5 {
            sleep(Duration::from_millis(1500)).await;
            assert_eq!(store.get(&"a".to_string(), &opts()).await.unwrap(), 1);
        }

        sleep(Duration::from_secs(3)).await;
        assert!(store.get(&"a".to_string(), &opts()).await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_without_ttl_falls_back_to_default() {
        let store = lazy_store(10, Some(Duration::from_secs(60)));
        let short = CallOptions::new().with_ttl(Duration::from_secs(1));

        store.set("a".to_string(), 1, &short).await.unwrap();
        store.set("a".to_string(), 2, &opts()).await.unwrap();

        sleep(Duration::from_secs(5)).await;
        assert_eq!(store.get(&"a".to_string(), &opts()).await.unwrap(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_adjust_capacity_shrinks() {
        let store = lazy_store(10, None);
        fill(&store, 0..10).await;

        store.adjust_capacity(4).await;
        assert_eq!(store.capacity().await, 4);
        assert_eq!(store.len().await, 4);
        for i in 6..10 {
            assert!(store.exists(&i.to_string(), &opts()).await.unwrap());
        }

        // Growth leaves existing entries alone
        store.adjust_capacity(100).await;
        assert_eq!(store.len().await, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_capacity_is_unbounded() {
        let store = lazy_store(0, None);
        fill(&store, 0..500).await;
        assert_eq!(store.len().await, 500);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_removes_only_idle_entries() {
        let store = LruStore::with_config(LruStoreConfig {
            capacity: 0,
            default_ttl: Some(Duration::from_secs(60)),
            sweep_interval: Duration::ZERO,
            sweep_batch: 2,
        });
        let short = CallOptions::new().with_ttl(Duration::from_secs(1));
        for i in 0..3 {
            store.set(format!("short{}", i), i, &short).await.unwrap();
        }
        store.set("long".to_string(), 9, &opts()).await.unwrap();

        sleep(Duration::from_secs(2)).await;
        assert_eq!(store.sweep_expired().await, 2);
        assert_eq!(store.sweep_expired().await, 1);
        assert_eq!(store.sweep_expired().await, 0);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_background_sweep_rearms() {
        let store = LruStore::with_config(LruStoreConfig {
            capacity: 10,
            default_ttl: Some(Duration::from_secs(1)),
            sweep_interval: Duration::from_secs(1),
            sweep_batch: 20,
        });
        assert!(store.sweeper_active());

        store.set("a".to_string(), 1, &opts()).await.unwrap();
        sleep(Duration::from_millis(2500)).await;
        assert!(store.is_empty().await);

        store.set("b".to_string(), 2, &opts()).await.unwrap();
        sleep(Duration::from_secs(3)).await;
        assert!(store.is_empty().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delete_and_clear() {
        let store = lazy_store(10, None);
        fill(&store, 0..3).await;

        store.delete(&"1".to_string(), &opts()).await.unwrap();
        store.delete(&"1".to_string(), &opts()).await.unwrap();
        assert_eq!(store.len().await, 2);

        store.clear(&opts()).await.unwrap();
        assert!(store.is_empty().await);
        fill(&store, 0..2).await;
        assert_eq!(store.len().await, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_mget_touches_found_keys() {
        let store = lazy_store(3, None);
        fill(&store, 0..3).await;

        let found = store
            .mget(&["0".to_string(), "9".to_string()], &opts())
            .await
            .unwrap();
        assert_eq!(found.len(), 1);

        fill(&store, 3..4).await;
        assert!(store.exists(&"0".to_string(), &opts()).await.unwrap());
        assert!(!store.exists(&"1".to_string(), &opts()).await.unwrap());
    }
}
