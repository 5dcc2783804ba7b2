//! Simple Stores
//!
//! `SimpleStore` is a plain unbounded map that ignores TTLs entirely.
//! `NoOpStore` accepts every write and never returns anything.

use std::collections::HashMap;
use std::hash::Hash;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::cache::Cache;
use crate::error::{CacheError, Result};
use crate::options::CallOptions;

// == Simple Store ==
/// Unbounded map without expiry. TTL options are ignored.
#[derive(Debug, Default)]
pub struct SimpleStore<K, V> {
    entries: RwLock<HashMap<K, V>>,
}

impl<K, V> SimpleStore<K, V> {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

#[async_trait]
impl<K, V> Cache<K, V> for SimpleStore<K, V>
where
    K: Eq + Hash + Clone + Send + Sync,
    V: Clone + Send + Sync,
{
    async fn get(&self, key: &K, _options: &CallOptions) -> Result<V> {
        self.entries
            .read()
            .await
            .get(key)
            .cloned()
            .ok_or(CacheError::NotFound)
    }

    async fn set(&self, key: K, value: V, _options: &CallOptions) -> Result<()> {
        self.entries.write().await.insert(key, value);
        Ok(())
    }

    async fn mget(&self, keys: &[K], _options: &CallOptions) -> Result<HashMap<K, V>> {
        let entries = self.entries.read().await;
        Ok(keys
            .iter()
            .filter_map(|key| entries.get(key).map(|v| (key.clone(), v.clone())))
            .collect())
    }

    async fn mset(&self, items: HashMap<K, V>, _options: &CallOptions) -> Result<()> {
        self.entries.write().await.extend(items);
        Ok(())
    }

    async fn exists(&self, key: &K, _options: &CallOptions) -> Result<bool> {
        Ok(self.entries.read().await.contains_key(key))
    }

    async fn delete(&self, key: &K, _options: &CallOptions) -> Result<()> {
        self.entries.write().await.remove(key);
        Ok(())
    }

    async fn clear(&self, _options: &CallOptions) -> Result<()> {
        *self.entries.write().await = HashMap::new();
        Ok(())
    }
}

// == No-Op Store ==
/// Store that never caches. Writes succeed, reads always miss.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpStore;

#[async_trait]
impl<K, V> Cache<K, V> for NoOpStore
where
    K: Send + Sync + 'static,
    V: Send + 'static,
{
    async fn get(&self, _key: &K, _options: &CallOptions) -> Result<V> {
        Err(CacheError::NotFound)
    }

    async fn set(&self, _key: K, _value: V, _options: &CallOptions) -> Result<()> {
        Ok(())
    }

    async fn mget(&self, _keys: &[K], _options: &CallOptions) -> Result<HashMap<K, V>> {
        Ok(HashMap::new())
    }

    async fn mset(&self, _items: HashMap<K, V>, _options: &CallOptions) -> Result<()> {
        Ok(())
    }

    async fn exists(&self, _key: &K, _options: &CallOptions) -> Result<bool> {
        Ok(false)
    }

    async fn delete(&self, _key: &K, _options: &CallOptions) -> Result<()> {
        Ok(())
    }

    async fn clear(&self, _options: &CallOptions) -> Result<()> {
        Ok(())
    }
}
