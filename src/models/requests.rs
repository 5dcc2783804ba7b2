//! Request DTOs for the cache server API
//!
//! Defines the structure of incoming HTTP request bodies.

use std::collections::HashMap;
use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;

use crate::options::CallOptions;

/// Longest key accepted over HTTP
pub const MAX_KEY_LENGTH: usize = 256;

fn validate_key(key: &str) -> Option<String> {
    if key.is_empty() {
        return Some("Key cannot be empty".to_string());
    }
    if key.len() > MAX_KEY_LENGTH {
        return Some(format!(
            "Key exceeds maximum length of {} characters",
            MAX_KEY_LENGTH
        ));
    }
    None
}

fn ttl_options(ttl_ms: Option<u64>) -> CallOptions {
    match ttl_ms {
        Some(ms) => CallOptions::new().with_ttl(Duration::from_millis(ms)),
        None => CallOptions::new(),
    }
}

/// Request body for the SET operation (PUT /set)
///
/// # Fields
/// - `key`: The cache key to store the value under
/// - `value`: Any JSON value
/// - `ttl_ms`: Optional TTL in milliseconds; absent or zero leaves expiry
///   to the backend's own rules
#[derive(Debug, Clone, Deserialize)]
pub struct SetRequest {
    pub key: String,
    pub value: Value,
    #[serde(default)]
    pub ttl_ms: Option<u64>,
}

impl SetRequest {
    /// Validates the request data
    ///
    /// Returns an error message if validation fails, None if valid.
    pub fn validate(&self) -> Option<String> {
        validate_key(&self.key)
    }

    pub fn options(&self) -> CallOptions {
        ttl_options(self.ttl_ms)
    }
}

/// Request body for the MGET operation (POST /mget)
#[derive(Debug, Clone, Deserialize)]
pub struct MGetRequest {
    pub keys: Vec<String>,
}

impl MGetRequest {
    pub fn validate(&self) -> Option<String> {
        self.keys.iter().find_map(|key| validate_key(key))
    }
}

/// Request body for the MSET operation (PUT /mset)
#[derive(Debug, Clone, Deserialize)]
pub struct MSetRequest {
    pub items: HashMap<String, Value>,
    /// Optional TTL in milliseconds applied to every item
    #[serde(default)]
    pub ttl_ms: Option<u64>,
}

impl MSetRequest {
    pub fn validate(&self) -> Option<String> {
        self.items.keys().find_map(|key| validate_key(key))
    }

    pub fn options(&self) -> CallOptions {
        ttl_options(self.ttl_ms)
    }
}
