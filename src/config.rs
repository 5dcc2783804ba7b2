//! Configuration Module
//!
//! Per-store configuration structs with documented defaults, and the server
//! configuration loaded from environment variables.

use std::env;
use std::time::Duration;

// == Store Configs ==
/// Settings of the unbounded TTL store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TtlStoreConfig {
    /// Fixed rate of the background sweep, zero disables it
    pub sweep_interval: Duration,
    /// Maximum entries reclaimed per sweep, zero means no limit
    pub sweep_batch: usize,
}

impl Default for TtlStoreConfig {
    fn default() -> Self {
        Self {
            sweep_interval: Duration::from_secs(20 * 60),
            sweep_batch: 20,
        }
    }
}

/// Settings of the bounded LRU store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LruStoreConfig {
    /// Maximum number of entries, zero means unbounded
    pub capacity: usize,
    /// Idle TTL for entries written without one; `None` means no idle expiry
    pub default_ttl: Option<Duration>,
    /// Delay between the end of one sweep and the start of the next
    pub sweep_interval: Duration,
    /// Maximum entries reclaimed per sweep, zero means no limit
    pub sweep_batch: usize,
}

impl LruStoreConfig {
    /// Default settings with the given capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            ..Self::default()
        }
    }
}

impl Default for LruStoreConfig {
    fn default() -> Self {
        Self {
            capacity: 1000,
            default_ttl: Some(Duration::from_secs(60 * 60)),
            sweep_interval: Duration::from_secs(10 * 60),
            sweep_batch: 20,
        }
    }
}

/// Settings of the remote hash store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashStoreConfig {
    /// Fixed rate of the expiry-index GC, zero disables it
    pub gc_interval: Duration,
    /// Maximum fields collected per GC run, zero means no limit
    pub gc_batch: usize,
}

impl Default for HashStoreConfig {
    fn default() -> Self {
        Self {
            gc_interval: Duration::from_secs(20 * 60),
            gc_batch: 0,
        }
    }
}

// == Server Config ==
/// Which backend the HTTP server fronts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Ttl,
    Lru,
    Hash,
    String,
    Simple,
    NoOp,
}

impl Backend {
    /// Parses a backend name, case-insensitively.
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "ttl" => Some(Backend::Ttl),
            "lru" => Some(Backend::Lru),
            "hash" => Some(Backend::Hash),
            "string" => Some(Backend::String),
            "simple" => Some(Backend::Simple),
            "noop" => Some(Backend::NoOp),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Backend::Ttl => "ttl",
            Backend::Lru => "lru",
            Backend::Hash => "hash",
            Backend::String => "string",
            Backend::Simple => "simple",
            Backend::NoOp => "noop",
        }
    }
}

/// Server configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// Backend served over HTTP
    pub backend: Backend,
    /// Capacity of the LRU backend, 0 = unbounded
    pub max_entries: usize,
    /// Default idle TTL in seconds for the LRU backend, 0 = none
    pub default_ttl: u64,
    /// HTTP server port
    pub server_port: u16,
    /// Background sweep interval in seconds, 0 = lazy expiry only
    pub sweep_interval: u64,
    /// Entries reclaimed per sweep
    pub sweep_batch: usize,
    /// Name of the remote hash (or key prefix for the string backend)
    pub hash_key: String,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `CACHE_BACKEND` - ttl | lru | hash | string | simple | noop (default: lru)
    /// - `MAX_ENTRIES` - LRU capacity (default: 1000)
    /// - `DEFAULT_TTL` - Default idle TTL in seconds (default: 3600)
    /// - `SERVER_PORT` - HTTP server port (default: 3000)
    /// - `SWEEP_INTERVAL` - Sweep frequency in seconds (default: 60)
    /// - `SWEEP_BATCH` - Entries reclaimed per sweep (default: 20)
    /// - `HASH_KEY` - Remote hash name (default: kvcache)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            backend: env::var("CACHE_BACKEND")
                .ok()
                .and_then(|v| Backend::parse(&v))
                .unwrap_or(defaults.backend),
            max_entries: parse_var("MAX_ENTRIES").unwrap_or(defaults.max_entries),
            default_ttl: parse_var("DEFAULT_TTL").unwrap_or(defaults.default_ttl),
            server_port: parse_var("SERVER_PORT").unwrap_or(defaults.server_port),
            sweep_interval: parse_var("SWEEP_INTERVAL").unwrap_or(defaults.sweep_interval),
            sweep_batch: parse_var("SWEEP_BATCH").unwrap_or(defaults.sweep_batch),
            hash_key: env::var("HASH_KEY").unwrap_or(defaults.hash_key),
        }
    }

    pub fn ttl_store_config(&self) -> TtlStoreConfig {
        TtlStoreConfig {
            sweep_interval: Duration::from_secs(self.sweep_interval),
            sweep_batch: self.sweep_batch,
        }
    }

    pub fn lru_store_config(&self) -> LruStoreConfig {
        LruStoreConfig {
            capacity: self.max_entries,
            default_ttl: (self.default_ttl > 0).then(|| Duration::from_secs(self.default_ttl)),
            sweep_interval: Duration::from_secs(self.sweep_interval),
            sweep_batch: self.sweep_batch,
        }
    }

    pub fn hash_store_config(&self) -> HashStoreConfig {
        HashStoreConfig {
            gc_interval: Duration::from_secs(self.sweep_interval),
            gc_batch: self.sweep_batch,
        }
    }
}

fn parse_var<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.parse().ok())
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend: Backend::Lru,
            max_entries: 1000,
            default_ttl: 3600,
            server_port: 3000,
            sweep_interval: 60,
            sweep_batch: 20,
            hash_key: "kvcache".to_string(),
        }
    }
}
