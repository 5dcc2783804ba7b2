//! Response DTOs for the cache server API
//!
//! Defines the structure of outgoing HTTP response bodies.

use std::collections::HashMap;

use serde::Serialize;
use serde_json::Value;

use crate::cache::CacheStats;

/// Response body for the GET operation (GET /get/:key)
#[derive(Debug, Clone, Serialize)]
pub struct GetResponse {
    pub key: String,
    pub value: Value,
}

impl GetResponse {
    pub fn new(key: impl Into<String>, value: Value) -> Self {
        Self {
            key: key.into(),
            value,
        }
    }
}

/// Acknowledgement naming the key a write touched (PUT /set, DELETE /del/:key)
#[derive(Debug, Clone, Serialize)]
pub struct KeyResponse {
    pub message: String,
    pub key: String,
}

impl KeyResponse {
    fn with_action(key: impl Into<String>, action: &str) -> Self {
        let key = key.into();
        Self {
            message: format!("Key '{}' {}", key, action),
            key,
        }
    }

    pub fn stored(key: impl Into<String>) -> Self {
        Self::with_action(key, "stored")
    }

    pub fn deleted(key: impl Into<String>) -> Self {
        Self::with_action(key, "deleted")
    }
}

/// Response body for the MGET operation (POST /mget)
#[derive(Debug, Clone, Serialize)]
pub struct MGetResponse {
    /// Live entries found
    pub values: HashMap<String, Value>,
    /// Requested keys that were missing or expired, in request order
    pub missing: Vec<String>,
}

impl MGetResponse {
    pub fn new(requested: &[String], values: HashMap<String, Value>) -> Self {
        let missing = requested
            .iter()
            .filter(|key| !values.contains_key(*key))
            .cloned()
            .collect();
        Self { values, missing }
    }
}

/// Response body for the MSET operation (PUT /mset)
#[derive(Debug, Clone, Serialize)]
pub struct MSetResponse {
    pub message: String,
    pub count: usize,
}

impl MSetResponse {
    pub fn new(count: usize) -> Self {
        Self {
            message: format!("{} keys stored", count),
            count,
        }
    }
}

/// Response body for the EXISTS operation (GET /exists/:key)
#[derive(Debug, Clone, Serialize)]
pub struct ExistsResponse {
    pub key: String,
    pub exists: bool,
}

/// Response body for the CLEAR operation (DELETE /clear)
#[derive(Debug, Clone, Serialize)]
pub struct ClearResponse {
    pub message: String,
}

impl ClearResponse {
    pub fn new() -> Self {
        Self {
            message: "Cache cleared".to_string(),
        }
    }
}

impl Default for ClearResponse {
    fn default() -> Self {
        Self::new()
    }
}

/// Response body for the stats endpoint (GET /stats)
#[derive(Debug, Clone, Serialize)]
pub struct StatsResponse {
    /// Backend serving the requests
    pub backend: String,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub expirations: u64,
    /// Current number of entries in cache
    pub total_entries: usize,
    /// Hit rate (hits / (hits + misses))
    pub hit_rate: f64,
}

impl StatsResponse {
    pub fn new(backend: impl Into<String>, stats: &CacheStats) -> Self {
        Self {
            backend: backend.into(),
            hits: stats.hits,
            misses: stats.misses,
            evictions: stats.evictions,
            expirations: stats.expirations,
            total_entries: stats.total_entries,
            hit_rate: stats.hit_rate(),
        }
    }
}

/// Response body for the health endpoint (GET /health)
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Health status (e.g., "healthy")
    pub status: String,
    pub backend: String,
    /// Current timestamp in ISO 8601 format
    pub timestamp: String,
}

impl HealthResponse {
    /// Creates a new HealthResponse with current timestamp
    pub fn healthy(backend: impl Into<String>) -> Self {
        Self {
            status: "healthy".to_string(),
            backend: backend.into(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}
