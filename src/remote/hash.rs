//! Remote Hash Store
//!
//! Values live in one remote hash named `name`. The server has no per-field
//! expiry, so deadlines go into a companion sorted set `{name}.timeout`
//! whose scores are unix-nanosecond timestamps. Reads compare the score
//! against the clock; a periodic GC removes fields whose score has passed.
//!
//! GC queries and deletes in two separate round trips. A field rewritten
//! with a fresh TTL between the two is deleted anyway.

use std::collections::HashMap;
use std::hash::Hash;
use std::marker::PhantomData;
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use bytes::Bytes;
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, warn};

use crate::cache::Cache;
use crate::codec::Codec;
use crate::config::HashStoreConfig;
use crate::error::{CacheError, Result};
use crate::options::CallOptions;
use crate::remote::{deadline_nanos, execute, now_nanos, pipeline, Command, Reply, ToField, Transport};
use crate::tasks::{spawn_sweeper, Schedule, SweepHandle};

// == Keys ==
/// Remote key names of one hash store.
#[derive(Debug, Clone)]
struct Keys {
    values: String,
    timeouts: String,
}

impl Keys {
    fn new(name: &str) -> Self {
        Self {
            values: name.to_string(),
            timeouts: format!("{}.timeout", name),
        }
    }

    /// Pipeline removing `fields` from both the value hash and the expiry index.
    fn delete_fields(&self, fields: Vec<String>) -> Vec<Command> {
        vec![
            Command::HDel {
                key: self.values.clone(),
                fields: fields.clone(),
            },
            Command::ZRem {
                key: self.timeouts.clone(),
                members: fields,
            },
        ]
    }
}

fn is_expired(score: Option<i64>, now: i64) -> bool {
    score.is_some_and(|deadline| deadline <= now)
}

// == Hash Store ==
/// Cache over a remote hash with emulated per-field TTL.
pub struct HashStore<K, V, C, T: ?Sized> {
    transport: Arc<T>,
    codec: C,
    keys: Keys,
    gc: SweepHandle,
    _marker: PhantomData<fn(K) -> V>,
}

impl<K, V, C, T> HashStore<K, V, C, T>
where
    C: Codec,
    T: Transport + ?Sized,
{
    /// Creates a store with the default GC settings.
    pub fn new(transport: Arc<T>, codec: C, name: &str) -> Self {
        Self::with_config(transport, codec, name, HashStoreConfig::default())
    }

    /// Creates a store and starts its GC.
    pub fn with_config(transport: Arc<T>, codec: C, name: &str, config: HashStoreConfig) -> Self {
        let keys = Keys::new(name);
        let weak = Arc::downgrade(&transport);
        let gc_keys = keys.clone();
        let batch = config.gc_batch;

        let gc = spawn_sweeper("hash-gc", config.gc_interval, Schedule::FixedRate, move || {
            let weak: Weak<T> = weak.clone();
            let keys = gc_keys.clone();
            async move {
                let transport = weak.upgrade()?;
                match collect_garbage(&*transport, &keys, batch).await {
                    Ok(removed) => Some(removed),
                    Err(err) => {
                        warn!(hash = %keys.values, error = %err, "Expiry GC failed");
                        Some(0)
                    }
                }
            }
        });

        Self {
            transport,
            codec,
            keys,
            gc,
            _marker: PhantomData,
        }
    }

    pub fn codec(&self) -> &C {
        &self.codec
    }

    /// Name of the value hash.
    pub fn name(&self) -> &str {
        &self.keys.values
    }

    /// Runs one GC pass now, returning the number of fields collected.
    pub async fn collect_garbage(&self, batch: usize) -> Result<usize> {
        collect_garbage(&*self.transport, &self.keys, batch).await
    }

    /// Stops the background GC.
    pub fn shutdown(&self) {
        self.gc.shutdown();
    }

    pub fn gc_active(&self) -> bool {
        self.gc.is_active()
    }

    /// Removes `fields` in the background; failures are only logged.
    fn spawn_cleanup(&self, fields: Vec<String>) {
        let transport = Arc::clone(&self.transport);
        let commands = self.keys.delete_fields(fields);
        tokio::spawn(async move {
            match transport.pipeline(commands).await {
                Ok(_) => debug!("Removed expired fields"),
                Err(err) => debug!(error = %err, "Expired field cleanup failed"),
            }
        });
    }
}

/// Range-queries due fields, then deletes them from both structures.
async fn collect_garbage<T>(transport: &T, keys: &Keys, batch: usize) -> Result<usize>
where
    T: Transport + ?Sized,
{
    let options = CallOptions::default();
    let query = Command::ZRangeByScore {
        key: keys.timeouts.clone(),
        max: now_nanos(),
        limit: (batch > 0).then_some(batch),
    };

    let fields = execute(transport, query, &options)
        .await?
        .into_array()?
        .into_iter()
        .map(|reply| {
            let bytes = reply.into_bytes()?.unwrap_or_default();
            Ok(String::from_utf8_lossy(&bytes).into_owned())
        })
        .collect::<Result<Vec<String>>>()?;

    if fields.is_empty() {
        return Ok(0);
    }

    let removed = fields.len();
    for reply in pipeline(transport, keys.delete_fields(fields), &options).await? {
        reply.ack()?;
    }
    Ok(removed)
}

#[async_trait]
impl<K, V, C, T> Cache<K, V> for HashStore<K, V, C, T>
where
    K: ToField + Eq + Hash + Clone + Send + Sync,
    V: Serialize + DeserializeOwned + Send + Sync,
    C: Codec,
    T: Transport + ?Sized,
{
    async fn get(&self, key: &K, options: &CallOptions) -> Result<V> {
        let field = key.to_field(&self.codec)?;
        let commands = vec![
            Command::HGet {
                key: self.keys.values.clone(),
                field: field.clone(),
            },
            Command::ZScore {
                key: self.keys.timeouts.clone(),
                member: field.clone(),
            },
        ];

        let mut replies = pipeline(&*self.transport, commands, options).await?.into_iter();
        let value = next(&mut replies)?.into_bytes()?.ok_or(CacheError::NotFound)?;
        let score = next(&mut replies)?.into_score()?;

        if is_expired(score, now_nanos()) {
            self.spawn_cleanup(vec![field]);
            return Err(CacheError::NotFound);
        }

        Ok(self.codec.decode(&value)?)
    }

    async fn set(&self, key: K, value: V, options: &CallOptions) -> Result<()> {
        let field = key.to_field(&self.codec)?;
        let bytes = Bytes::from(self.codec.encode(&value)?);

        let mut commands = vec![Command::HSet {
            key: self.keys.values.clone(),
            fields: vec![(field.clone(), bytes)],
        }];
        if let Some(ttl) = options.effective_ttl() {
            commands.push(Command::ZAdd {
                key: self.keys.timeouts.clone(),
                members: vec![(deadline_nanos(ttl), field)],
            });
        }

        for reply in pipeline(&*self.transport, commands, options).await? {
            reply.ack()?;
        }
        Ok(())
    }

    async fn mget(&self, keys: &[K], options: &CallOptions) -> Result<HashMap<K, V>> {
        if keys.is_empty() {
            return Ok(HashMap::new());
        }

        let fields = keys
            .iter()
            .map(|key| key.to_field(&self.codec))
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut commands = Vec::with_capacity(fields.len() + 1);
        commands.push(Command::HMGet {
            key: self.keys.values.clone(),
            fields: fields.clone(),
        });
        commands.extend(fields.iter().map(|field| Command::ZScore {
            key: self.keys.timeouts.clone(),
            member: field.clone(),
        }));

        let mut replies = pipeline(&*self.transport, commands, options).await?.into_iter();
        let values = next(&mut replies)?.into_array()?;
        if values.len() != fields.len() {
            return Err(CacheError::Structural(format!(
                "asked for {} fields, got {} values",
                fields.len(),
                values.len()
            )));
        }

        let now = now_nanos();
        let mut found = HashMap::with_capacity(keys.len());
        for ((key, value), score) in keys.iter().zip(values).zip(replies) {
            let Some(bytes) = value.into_bytes()? else {
                continue;
            };
            if is_expired(score.into_score()?, now) {
                continue;
            }
            // Undecodable entries are skipped like missing ones
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

        let mut fields = Vec::with_capacity(items.len());
        for (key, value) in &items {
            let field = key.to_field(&self.codec)?;
            let bytes = Bytes::from(self.codec.encode(value)?);
            fields.push((field, bytes));
        }

        let expiry = options.effective_ttl().map(|ttl| {
            let deadline = deadline_nanos(ttl);
            Command::ZAdd {
                key: self.keys.timeouts.clone(),
                members: fields.iter().map(|(field, _)| (deadline, field.clone())).collect(),
            }
        });
        let mut commands = vec![Command::HSet {
            key: self.keys.values.clone(),
            fields,
        }];
        commands.extend(expiry);

        for reply in pipeline(&*self.transport, commands, options).await? {
            reply.ack()?;
        }
        Ok(())
    }

    async fn exists(&self, key: &K, options: &CallOptions) -> Result<bool> {
        let field = key.to_field(&self.codec)?;
        let commands = vec![
            Command::HExists {
                key: self.keys.values.clone(),
                field: field.clone(),
            },
            Command::ZScore {
                key: self.keys.timeouts.clone(),
                member: field.clone(),
            },
        ];

        let mut replies = pipeline(&*self.transport, commands, options).await?.into_iter();
        if next(&mut replies)?.into_integer()? == 0 {
            return Ok(false);
        }
        if is_expired(next(&mut replies)?.into_score()?, now_nanos()) {
            self.spawn_cleanup(vec![field]);
            return Ok(false);
        }
        Ok(true)
    }

    async fn delete(&self, key: &K, options: &CallOptions) -> Result<()> {
        let field = key.to_field(&self.codec)?;
        for reply in pipeline(&*self.transport, self.keys.delete_fields(vec![field]), options).await? {
            reply.ack()?;
        }
        Ok(())
    }

    async fn clear(&self, options: &CallOptions) -> Result<()> {
        let command = Command::Del {
            keys: vec![self.keys.values.clone(), self.keys.timeouts.clone()],
        };
        execute(&*self.transport, command, options).await?.ack()
    }
}

fn next(replies: &mut impl Iterator<Item = Reply>) -> Result<Reply> {
    replies
        .next()
        .ok_or_else(|| CacheError::Structural("missing pipeline reply".to_string()))
}
