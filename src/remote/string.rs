//! Remote String Store
//!
//! One remote string key per cache key, using the server's native expiry.
//! There is no pattern delete, so `clear` is unsupported.

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{de::DeserializeOwned, Serialize};

use crate::cache::Cache;
use crate::codec::Codec;
use crate::error::{CacheError, Result};
use crate::options::CallOptions;
use crate::remote::{execute, pipeline, Command, Expire, ToField, Transport};

type KeyFn = Arc<dyn Fn(&str) -> String + Send + Sync>;

// == String Store ==
/// Cache storing each entry as its own remote key.
pub struct StringStore<K, V, C, T: ?Sized> {
    transport: Arc<T>,
    codec: C,
    key_fn: Option<KeyFn>,
    _marker: PhantomData<fn(K) -> V>,
}

impl<K, V, C, T: ?Sized> fmt::Debug for StringStore<K, V, C, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StringStore")
            .field("key_fn", &self.key_fn.is_some())
            .finish_non_exhaustive()
    }
}

impl<K, V, C, T> StringStore<K, V, C, T>
where
    K: ToField,
    C: Codec,
    T: Transport + ?Sized,
{
    pub fn new(transport: Arc<T>, codec: C) -> Self {
        Self {
            transport,
            codec,
            key_fn: None,
            _marker: PhantomData,
        }
    }

    /// Maps every field name through `key_fn` before it reaches the server,
    /// typically to add a namespace prefix.
    pub fn with_key_fn<F>(mut self, key_fn: F) -> Self
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        self.key_fn = Some(Arc::new(key_fn));
        self
    }

    /// Prefixes every key with `prefix`.
    pub fn with_prefix(self, prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        self.with_key_fn(move |key| format!("{}{}", prefix, key))
    }

    pub fn codec(&self) -> &C {
        &self.codec
    }

    /// Remote key for `key`.
    pub fn remote_key(&self, key: &K) -> Result<String> {
        let field = key.to_field(&self.codec)?;
        Ok(match &self.key_fn {
            Some(key_fn) => key_fn(&field),
            None => field,
        })
    }
}

#[async_trait]
impl<K, V, C, T> Cache<K, V> for StringStore<K, V, C, T>
where
    K: ToField + Eq + Hash + Clone + Send + Sync,
    V: Serialize + DeserializeOwned + Send + Sync,
    C: Codec,
    T: Transport + ?Sized,
{
    async fn get(&self, key: &K, options: &CallOptions) -> Result<V> {
        let command = Command::Get {
            key: self.remote_key(key)?,
        };
        let bytes = execute(&*self.transport, command, options)
            .await?
            .into_bytes()?
            .ok_or(CacheError::NotFound)?;
        Ok(self.codec.decode(&bytes)?)
    }

    async fn set(&self, key: K, value: V, options: &CallOptions) -> Result<()> {
        let command = Command::Set {
            key: self.remote_key(&key)?,
            value: Bytes::from(self.codec.encode(&value)?),
            expire: options.effective_ttl().map(Expire::from_ttl),
        };
        execute(&*self.transport, command, options).await?.ack()
    }

    async fn mget(&self, keys: &[K], options: &CallOptions) -> Result<HashMap<K, V>> {
        if keys.is_empty() {
            return Ok(HashMap::new());
        }

        let remote_keys = keys
            .iter()
            .map(|key| self.remote_key(key))
            .collect::<Result<Vec<_>>>()?;
        let values = execute(&*self.transport, Command::MGet { keys: remote_keys }, options)
            .await?
            .into_array()?;
        if values.len() != keys.len() {
            return Err(CacheError::Structural(format!(
                "asked for {} keys, got {} values",
                keys.len(),
                values.len()
            )));
        }

        let mut found = HashMap::with_capacity(keys.len());
        for (key, value) in keys.iter().zip(values) {
            // Missing and undecodable entries are skipped
            let Ok(Some(bytes)) = value.into_bytes() else {
                continue;
            };
            if let Ok(decoded) = self.codec.decode::<V>(&bytes) {
                found.insert(key.clone(), decoded);
            }
        }
        Ok(found)
    }

    async fn mset(&self, items: HashMap<K, V>, options: &CallOptions) -> Result<()> {
        if items.is_empty() {
            return Ok(());
        }

        let expire = options.effective_ttl().map(Expire::from_ttl);
        let mut commands = Vec::with_capacity(items.len());
        for (key, value) in &items {
            commands.push(Command::Set {
                key: self.remote_key(key)?,
                value: Bytes::from(self.codec.encode(value)?),
                expire,
            });
        }

        for reply in pipeline(&*self.transport, commands, options).await? {
            reply.ack()?;
        }
        Ok(())
    }

    async fn exists(&self, key: &K, options: &CallOptions) -> Result<bool> {
        let command = Command::Exists {
            keys: vec![self.remote_key(key)?],
        };
        let count = execute(&*self.transport, command, options).await?.into_integer()?;
        Ok(count > 0)
    }

    async fn delete(&self, key: &K, options: &CallOptions) -> Result<()> {
        let command = Command::Del {
            keys: vec![self.remote_key(key)?],
        };
        execute(&*self.transport, command, options).await?.ack()
    }

    async fn clear(&self, _options: &CallOptions) -> Result<()> {
        Err(CacheError::Unsupported("clear"))
    }
}
