//! kvcache - pluggable key-value caching
//!
//! One async `Cache` contract over several backends: an unbounded TTL store,
//! a capacity-bounded LRU store with idle expiry, and remote stores that
//! emulate per-field TTL on a key-value server.

pub mod api;
pub mod cache;
pub mod codec;
pub mod config;
pub mod error;
pub mod models;
pub mod options;
pub mod remote;
pub mod tasks;

pub use api::AppState;
pub use cache::{Cache, CacheStats, LruStore, NoOpStore, SimpleStore, TtlStore};
pub use codec::{Codec, JsonCodec};
pub use config::{Backend, Config, HashStoreConfig, LruStoreConfig, TtlStoreConfig};
pub use error::{CacheError, CodecError, Result, TransportError};
pub use options::CallOptions;
pub use remote::{HashStore, MemoryTransport, StringStore, Transport};
