//! TTL Store Module
//!
//! Unbounded in-process store. Deadlines live in an `ExpiryIndex`; reads
//! check them lazily and a fixed-rate sweeper pops due entries in bounded
//! batches.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::cache::{Cache, CacheStats, ExpiryIndex};
use crate::config::TtlStoreConfig;
use crate::error::{CacheError, Result};
use crate::options::CallOptions;
use crate::tasks::{spawn_sweeper, Schedule, SweepHandle};

// == TTL State ==
/// Everything guarded by the store lock.
#[derive(Debug)]
struct TtlState<K, V> {
    entries: HashMap<K, V>,
    expiry: ExpiryIndex<K>,
    stats: CacheStats,
}

impl<K, V> TtlState<K, V>
where
    K: Eq + Hash + Clone,
{
    fn new() -> Self {
        Self {
            entries: HashMap::new(),
            expiry: ExpiryIndex::new(),
            stats: CacheStats::new(),
        }
    }

    /// Looks up a live entry, dropping it first if its deadline has passed.
    fn lookup(&mut self, key: &K, now: Instant) -> Option<&V> {
        if !self.entries.contains_key(key) {
            return None;
        }
        if self.expiry.expiry_of(key).is_some_and(|at| at <= now) {
            self.remove(key);
            self.stats.record_expirations(1);
            return None;
        }
        self.entries.get(key)
    }

    /// Upserts a value. A TTL reschedules the key; no TTL keeps any
    /// deadline registered earlier.
    fn store(&mut self, key: K, value: V, ttl: Option<Duration>, now: Instant) {
        if let Some(ttl) = ttl {
            match now.checked_add(ttl) {
                Some(at) => self.expiry.insert(key.clone(), at),
                // Past the clock's range: the entry simply never expires
                None => {
                    self.expiry.remove(&key);
                }
            }
        }
        self.entries.insert(key, value);
    }

    fn remove(&mut self, key: &K) {
        self.entries.remove(key);
        self.expiry.remove(key);
    }

    /// Pops due deadlines until one is in the future or `budget` is spent.
    fn sweep(&mut self, now: Instant, budget: usize) -> usize {
        let mut removed = 0;
        while budget == 0 || removed < budget {
            match self.expiry.peek_min() {
                Some((_, at)) if at <= now => {}
                _ => break,
            }
            if let Some((key, _)) = self.expiry.pop_min() {
                self.entries.remove(&key);
                removed += 1;
            }
        }
        self.stats.record_expirations(removed);
        removed
    }
}

// == TTL Store ==
/// Unbounded store with absolute per-key deadlines.
///
/// All operations and the sweeper serialize on one lock. Writing a key
/// without a TTL keeps whatever deadline it already had.
pub struct TtlStore<K, V> {
    state: Arc<Mutex<TtlState<K, V>>>,
    sweep_batch: usize,
    sweeper: SweepHandle,
}

impl<K, V> TtlStore<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    // == Constructor ==
    /// Creates a store with the default sweep settings.
    pub fn new() -> Self {
        Self::with_config(TtlStoreConfig::default())
    }

    /// Creates a store and starts its sweeper.
    pub fn with_config(config: TtlStoreConfig) -> Self {
        let state = Arc::new(Mutex::new(TtlState::new()));
        let weak = Arc::downgrade(&state);
        let batch = config.sweep_batch;

        let sweeper = spawn_sweeper("ttl", config.sweep_interval, Schedule::FixedRate, move || {
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

    /// Runs one sweep pass now, returning the number of entries removed.
    pub async fn sweep_expired(&self) -> usize {
        let mut state = self.state.lock().await;
        state.sweep(Instant::now(), self.sweep_batch)
    }

    /// Number of stored entries, including expired ones not yet reclaimed.
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

impl<K, V> Default for TtlStore<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<K, V> Cache<K, V> for TtlStore<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    async fn get(&self, key: &K, _options: &CallOptions) -> Result<V> {
        let mut state = self.state.lock().await;
        match state.lookup(key, Instant::now()).cloned() {
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
            match state.lookup(key, now).cloned() {
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
        Ok(state.lookup(key, Instant::now()).is_some())
    }

    async fn delete(&self, key: &K, _options: &CallOptions) -> Result<()> {
        self.state.lock().await.remove(key);
        Ok(())
    }

    async fn clear(&self, _options: &CallOptions) -> Result<()> {
        let mut state = self.state.lock().await;
        state.entries = HashMap::new();
        state.expiry = ExpiryIndex::new();
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

    fn ttl(secs: u64) -> CallOptions {
        CallOptions::default().with_ttl(Duration::from_secs(secs))
    }

    fn lazy_store() -> TtlStore<String, i32> {
        TtlStore::with_config(TtlStoreConfig {
            sweep_interval: Duration::ZERO,
            sweep_batch: 20,
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_and_get() {
        let store = lazy_store();

        store.set("key1".to_string(), 1, &opts()).await.unwrap();
        assert_eq!(store.get(&"key1".to_string(), &opts()).await.unwrap(), 1);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_get_nonexistent() {
        let store = lazy_store();

        let result = store.get(&"nonexistent".to_string(), &opts()).await;
        assert_eq!(result, Err(CacheError::NotFound));
    }

    #[tokio::test(start_paused = true)]
    async fn test_ttl_expires_lazily() {
        let store = lazy_store();
        let key = "short".to_string();

        store.set(key.clone(), 7, &ttl(1)).await.unwrap();
        sleep(Duration::from_millis(900)).await;
        assert_eq!(store.get(&key, &opts()).await.unwrap(), 7);

        sleep(Duration::from_millis(200)).await;
        assert_eq!(store.get(&key, &opts()).await, Err(CacheError::NotFound));
        assert!(store.is_empty().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_is_exclusive() {
        let store = lazy_store();
        let key = "edge".to_string();

        store.set(key.clone(), 1, &ttl(1)).await.unwrap();
        tokio::time::advance(Duration::from_millis(999)).await;
        assert_eq!(store.get(&key, &opts()).await.unwrap(), 1);

        tokio::time::advance(Duration::from_millis(1)).await;
        assert_eq!(store.get(&key, &opts()).await, Err(CacheError::NotFound));
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_without_ttl_keeps_previous_deadline() {
        let store = lazy_store();
        let key = "sticky".to_string();

        store.set(key.clone(), 1, &ttl(1)).await.unwrap();
        store.set(key.clone(), 2, &opts()).await.unwrap();
        assert_eq!(store.get(&key, &opts()).await.unwrap(), 2);

        sleep(Duration::from_secs(2)).await;
        assert!(!store.exists(&key, &opts()).await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_with_new_ttl_reschedules() {
        let store = lazy_store();
        let key = "moved".to_string();

        store.set(key.clone(), 1, &ttl(1)).await.unwrap();
        store.set(key.clone(), 2, &ttl(10)).await.unwrap();

        sleep(Duration::from_secs(5)).await;
        assert_eq!(store.get(&key, &opts()).await.unwrap(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_get_does_not_refresh_deadline() {
        let store = lazy_store();
        let key = "k".to_string();

        store.set(key.clone(), 1, &ttl(2)).await.unwrap();
        sleep(Duration::from_secs(1)).await;
        store.get(&key, &opts()).await.unwrap();
        sleep(Duration::from_secs(1)).await;

        assert!(store.get(&key, &opts()).await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_mget_skips_missing_and_expired() {
        let store = lazy_store();
        store.set("a".to_string(), 1, &opts()).await.unwrap();
        store.set("b".to_string(), 2, &ttl(1)).await.unwrap();

        sleep(Duration::from_secs(2)).await;
        let keys = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let found = store.mget(&keys, &opts()).await.unwrap();

        assert_eq!(found.len(), 1);
        assert_eq!(found.get("a"), Some(&1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_mset_applies_ttl_to_every_key() {
        let store = lazy_store();
        let items: HashMap<_, _> = (0..5).map(|i| (format!("k{}", i), i)).collect();

        store.mset(items, &ttl(1)).await.unwrap();
        assert_eq!(store.len().await, 5);

        sleep(Duration::from_secs(2)).await;
        assert_eq!(store.sweep_expired().await, 5);
        assert!(store.is_empty().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delete_is_idempotent() {
        let store = lazy_store();
        store.set("key1".to_string(), 1, &ttl(5)).await.unwrap();

        store.delete(&"key1".to_string(), &opts()).await.unwrap();
        store.delete(&"key1".to_string(), &opts()).await.unwrap();
        store.delete(&"never".to_string(), &opts()).await.unwrap();

        assert!(store.is_empty().await);
        assert_eq!(store.sweep_expired().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_empties_store() {
        let store = lazy_store();
        store.set("a".to_string(), 1, &ttl(5)).await.unwrap();
        store.set("b".to_string(), 2, &opts()).await.unwrap();

        store.clear(&opts()).await.unwrap();

        assert!(!store.exists(&"a".to_string(), &opts()).await.unwrap());
        assert!(!store.exists(&"b".to_string(), &opts()).await.unwrap());
        assert!(store.is_empty().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_respects_budget_and_order() {
        let store = TtlStore::with_config(TtlStoreConfig {
            sweep_interval: Duration::ZERO,
            sweep_batch: 3,
        });
        for i in 0..10u64 {
            store
                .set(i, i, &CallOptions::new().with_ttl(Duration::from_secs(i + 1)))
                .await
                .unwrap();
        }
        store.set(100, 100, &opts()).await.unwrap();

        sleep(Duration::from_millis(4500)).await;
        // keys 0..=3 are due, budget is 3
        assert_eq!(store.sweep_expired().await, 3);
        assert_eq!(store.sweep_expired().await, 1);
        assert_eq!(store.sweep_expired().await, 0);
        assert_eq!(store.len().await, 7);
    }

    #[tokio::test(start_paused = true)]
    async fn test_background_sweep_reclaims_entries() {
        let store = TtlStore::with_config(TtlStoreConfig {
            sweep_interval: Duration::from_secs(1),
            sweep_batch: 20,
        });
        assert!(store.sweeper_active());

        store.set("gone".to_string(), 1, &ttl(1)).await.unwrap();
        store.set("kept".to_string(), 2, &opts()).await.unwrap();

        sleep(Duration::from_millis(2500)).await;
        assert_eq!(store.len().await, 1);

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.expirations, 1);
        assert_eq!(stats.total_entries, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_stops_sweeper() {
        let store: TtlStore<String, i32> = TtlStore::with_config(TtlStoreConfig {
            sweep_interval: Duration::from_secs(1),
            sweep_batch: 20,
        });

        store.shutdown();
        sleep(Duration::from_secs(2)).await;
        assert!(!store.sweeper_active());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stats_count_hits_and_misses() {
        let store = lazy_store();
        store.set("a".to_string(), 1, &opts()).await.unwrap();

        store.get(&"a".to_string(), &opts()).await.unwrap();
        let _ = store.get(&"b".to_string(), &opts()).await;
        store
            .mget(&["a".to_string(), "c".to_string()], &opts())
            .await
            .unwrap();

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.misses, 2);
    }
}
