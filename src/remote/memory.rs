//! In-Memory Transport
//!
//! A `Transport` that executes commands against an in-process keyspace of
//! strings, hashes and sorted sets. Useful for running the remote stores
//! without a server, and for injecting latency or connection loss in tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

use crate::error::TransportError;
use crate::remote::{Command, Reply, Transport};

const WRONGTYPE: &str = "WRONGTYPE Operation against a key holding the wrong kind of value";

// == Keyspace ==
#[derive(Debug)]
enum Value {
    Str(Bytes),
    Hash(HashMap<String, Bytes>),
    ZSet(HashMap<String, i64>),
}

#[derive(Debug)]
struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }

    fn is_empty(&self) -> bool {
        match &self.value {
            Value::Str(_) => false,
            Value::Hash(fields) => fields.is_empty(),
            Value::ZSet(members) => members.is_empty(),
        }
    }
}

#[derive(Debug, Default)]
struct Keyspace {
    data: HashMap<String, Entry>,
}

impl Keyspace {
    fn purge_expired(&mut self, key: &str, now: Instant) {
        if self.data.get(key).is_some_and(|entry| entry.is_expired(now)) {
            self.data.remove(key);
        }
    }

    /// Returns the live entry for `key`, dropping it first if expired.
    fn live(&mut self, key: &str, now: Instant) -> Option<&mut Entry> {
        self.purge_expired(key, now);
        self.data.get_mut(key)
    }

    fn hash(&mut self, key: &str, now: Instant) -> Result<Option<&mut HashMap<String, Bytes>>, Reply> {
        match self.live(key, now) {
            None => Ok(None),
            Some(Entry { value: Value::Hash(fields), .. }) => Ok(Some(fields)),
            Some(_) => Err(Reply::Error(WRONGTYPE.to_string())),
        }
    }

    fn zset(&mut self, key: &str, now: Instant) -> Result<Option<&mut HashMap<String, i64>>, Reply> {
        match self.live(key, now) {
            None => Ok(None),
            Some(Entry { value: Value::ZSet(members), .. }) => Ok(Some(members)),
            Some(_) => Err(Reply::Error(WRONGTYPE.to_string())),
        }
    }

    /// Creates the key with `empty` when absent.
    fn entry_or(&mut self, key: &str, now: Instant, empty: fn() -> Value) -> &mut Entry {
        self.purge_expired(key, now);
        self.data.entry(key.to_string()).or_insert_with(|| Entry {
            value: empty(),
            expires_at: None,
        })
    }

    /// Removes containers left empty by a delete.
    fn prune(&mut self, key: &str) {
        if self.data.get(key).is_some_and(Entry::is_empty) {
            self.data.remove(key);
        }
    }

    fn apply(&mut self, command: Command, now: Instant) -> Reply {
        match command {
            Command::Get { key } => match self.live(&key, now) {
                None => Reply::Nil,
                Some(Entry { value: Value::Str(bytes), .. }) => Reply::Bulk(bytes.clone()),
                Some(_) => Reply::Error(WRONGTYPE.to_string()),
            },

            Command::Set { key, value, expire } => {
                let expires_at = expire.and_then(|e| now.checked_add(e.as_duration()));
                self.data.insert(
                    key,
                    Entry {
                        value: Value::Str(value),
                        expires_at,
                    },
                );
                Reply::Status("OK".to_string())
            }

            Command::MGet { keys } => Reply::Array(
                keys.iter()
                    .map(|key| match self.live(key, now) {
                        Some(Entry { value: Value::Str(bytes), .. }) => Reply::Bulk(bytes.clone()),
                        _ => Reply::Nil,
                    })
                    .collect(),
            ),

            Command::Exists { keys } => {
                let count = keys.iter().filter(|key| self.live(key, now).is_some()).count();
                Reply::Integer(count as i64)
            }

            Command::Del { keys } => {
                let mut count = 0;
                for key in &keys {
                    self.purge_expired(key, now);
                    if self.data.remove(key).is_some() {
                        count += 1;
                    }
                }
                Reply::Integer(count)
            }

            Command::HGet { key, field } => match self.hash(&key, now) {
                Ok(fields) => fields
                    .and_then(|fields| fields.get(&field).cloned())
                    .map_or(Reply::Nil, Reply::Bulk),
                Err(reply) => reply,
            },

            Command::HMGet { key, fields } => match self.hash(&key, now) {
                Ok(stored) => Reply::Array(
                    fields
                        .iter()
                        .map(|field| {
                            stored
                                .as_ref()
                                .and_then(|stored| stored.get(field).cloned())
                                .map_or(Reply::Nil, Reply::Bulk)
                        })
                        .collect(),
                ),
                Err(reply) => reply,
            },

            Command::HSet { key, fields } => {
                if let Err(reply) = self.hash(&key, now) {
                    return reply;
                }
                let entry = self.entry_or(&key, now, || Value::Hash(HashMap::new()));
                let Value::Hash(stored) = &mut entry.value else {
                    return Reply::Error(WRONGTYPE.to_string());
                };
                let mut added = 0;
                for (field, value) in fields {
                    if stored.insert(field, value).is_none() {
                        added += 1;
                    }
                }
                Reply::Integer(added)
            }

            Command::HExists { key, field } => match self.hash(&key, now) {
                Ok(stored) => {
                    Reply::Integer(stored.is_some_and(|stored| stored.contains_key(&field)) as i64)
                }
                Err(reply) => reply,
            },

            Command::HDel { key, fields } => {
                let removed = match self.hash(&key, now) {
                    Ok(Some(stored)) => fields.iter().filter(|f| stored.remove(*f).is_some()).count(),
                    Ok(None) => 0,
                    Err(reply) => return reply,
                };
                self.prune(&key);
                Reply::Integer(removed as i64)
            }

            Command::ZScore { key, member } => match self.zset(&key, now) {
                Ok(members) => members
                    .and_then(|members| members.get(&member).copied())
                    .map_or(Reply::Nil, |score| Reply::Bulk(Bytes::from(score.to_string()))),
                Err(reply) => reply,
            },

            Command::ZAdd { key, members } => {
                if let Err(reply) = self.zset(&key, now) {
                    return reply;
                }
                let entry = self.entry_or(&key, now, || Value::ZSet(HashMap::new()));
                let Value::ZSet(stored) = &mut entry.value else {
                    return Reply::Error(WRONGTYPE.to_string());
                };
                let mut added = 0;
                for (score, member) in members {
                    if stored.insert(member, score).is_none() {
                        added += 1;
                    }
                }
                Reply::Integer(added)
            }

            Command::ZRem { key, members } => {
                let removed = match self.zset(&key, now) {
                    Ok(Some(stored)) => members.iter().filter(|m| stored.remove(*m).is_some()).count(),
                    Ok(None) => 0,
                    Err(reply) => return reply,
                };
                self.prune(&key);
                Reply::Integer(removed as i64)
            }

            Command::ZRangeByScore { key, max, limit } => match self.zset(&key, now) {
                Ok(stored) => {
                    let mut due: Vec<(i64, String)> = stored
                        .map(|stored| {
                            stored
                                .iter()
                                .filter(|(_, score)| **score <= max)
                                .map(|(member, score)| (*score, member.clone()))
                                .collect()
                        })
                        .unwrap_or_default();
                    due.sort();
                    if let Some(limit) = limit {
                        due.truncate(limit);
                    }
                    Reply::Array(
                        due.into_iter()
                            .map(|(_, member)| Reply::Bulk(Bytes::from(member)))
                            .collect(),
                    )
                }
                Err(reply) => reply,
            },
        }
    }
}

// == Memory Transport ==
/// In-process remote server.
///
/// A pipeline is applied under one lock, so commands of one round trip
/// never interleave with another's.
#[derive(Debug, Default)]
pub struct MemoryTransport {
    keyspace: Mutex<Keyspace>,
    offline: AtomicBool,
    latency_ms: AtomicU64,
    round_trips: AtomicUsize,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// While offline every round trip fails with `ConnectionReset`.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Delays every round trip by `latency` before it is applied.
    pub fn set_latency(&self, latency: Duration) {
        let ms = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX);
        self.latency_ms.store(ms, Ordering::SeqCst);
    }

    /// Number of round trips served so far, failed ones included.
    pub fn round_trips(&self) -> usize {
        self.round_trips.load(Ordering::SeqCst)
    }

    /// Number of live top-level keys.
    pub async fn key_count(&self) -> usize {
        let now = Instant::now();
        let keyspace = self.keyspace.lock().await;
        keyspace.data.values().filter(|entry| !entry.is_expired(now)).count()
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn pipeline(&self, commands: Vec<Command>) -> Result<Vec<Reply>, TransportError> {
        self.round_trips.fetch_add(1, Ordering::SeqCst);

        let latency = self.latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }
        if self.offline.load(Ordering::SeqCst) {
            return Err(TransportError::ConnectionReset);
        }

        let now = Instant::now();
        let mut keyspace = self.keyspace.lock().await;
        debug!(commands = commands.len(), "Applying pipeline");
        Ok(commands
            .into_iter()
            .map(|command| keyspace.apply(command, now))
            .collect())
    }
}
