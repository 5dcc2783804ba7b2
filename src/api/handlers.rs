//! API Handlers
//!
//! HTTP request handlers for each cache server endpoint. Every handler goes
//! through the `Cache` trait, so the same routes serve any backend.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    Json,
};
use serde_json::Value;
use tracing::warn;

use crate::cache::{Cache, LruStore, NoOpStore, SimpleStore, TtlStore};
use crate::codec::JsonCodec;
use crate::config::{Backend, Config};
use crate::error::{CacheError, Result};
use crate::models::{
    ClearResponse, ExistsResponse, GetResponse, HealthResponse, KeyResponse, MGetRequest,
    MGetResponse, MSetRequest, MSetResponse, SetRequest, StatsResponse,
};
use crate::options::CallOptions;
use crate::remote::{HashStore, MemoryTransport, StringStore};

/// Cache type served over HTTP.
pub type SharedCache = Arc<dyn Cache<String, Value>>;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub cache: SharedCache,
    pub backend: Backend,
}

impl AppState {
    pub fn new(cache: SharedCache, backend: Backend) -> Self {
        Self { cache, backend }
    }

    /// Builds the backend selected by the configuration.
    ///
    /// Must run inside a tokio runtime for background sweeping to start.
    pub fn from_config(config: &Config) -> Self {
        let cache: SharedCache = match config.backend {
            Backend::Ttl => Arc::new(TtlStore::<String, Value>::with_config(config.ttl_store_config())),
            Backend::Lru => Arc::new(LruStore::<String, Value>::with_config(config.lru_store_config())),
            Backend::Simple => Arc::new(SimpleStore::<String, Value>::new()),
            Backend::NoOp => Arc::new(NoOpStore),
            Backend::Hash => {
                warn!("No remote server configured, hash backend runs on an in-process transport");
                Arc::new(HashStore::<String, Value, _, _>::with_config(
                    Arc::new(MemoryTransport::new()),
                    JsonCodec,
                    &config.hash_key,
                    config.hash_store_config(),
                ))
            }
            Backend::String => {
                warn!("No remote server configured, string backend runs on an in-process transport");
                let prefix = format!("{}:", config.hash_key);
                Arc::new(
                    StringStore::<String, Value, _, _>::new(Arc::new(MemoryTransport::new()), JsonCodec)
                        .with_prefix(prefix),
                )
            }
        };
        Self::new(cache, config.backend)
    }
}

/// Handler for PUT /set
pub async fn set_handler(
    State(state): State<AppState>,
    Json(req): Json<SetRequest>,
) -> Result<Json<KeyResponse>> {
    if let Some(error_msg) = req.validate() {
        return Err(CacheError::InvalidRequest(error_msg));
    }

    let options = req.options();
    state.cache.set(req.key.clone(), req.value, &options).await?;

    Ok(Json(KeyResponse::stored(req.key)))
}

/// Handler for GET /get/:key
pub async fn get_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<GetResponse>> {
    let value = state.cache.get(&key, &CallOptions::default()).await?;

    Ok(Json(GetResponse::new(key, value)))
}

/// Handler for POST /mget
pub async fn mget_handler(
    State(state): State<AppState>,
    Json(req): Json<MGetRequest>,
) -> Result<Json<MGetResponse>> {
    if let Some(error_msg) = req.validate() {
        return Err(CacheError::InvalidRequest(error_msg));
    }

    let values = state.cache.mget(&req.keys, &CallOptions::default()).await?;

    Ok(Json(MGetResponse::new(&req.keys, values)))
}

/// Handler for PUT /mset
pub async fn mset_handler(
    State(state): State<AppState>,
    Json(req): Json<MSetRequest>,
) -> Result<Json<MSetResponse>> {
    if let Some(error_msg) = req.validate() {
        return Err(CacheError::InvalidRequest(error_msg));
    }

    let options = req.options();
    let count = req.items.len();
    state.cache.mset(req.items, &options).await?;

    Ok(Json(MSetResponse::new(count)))
}

/// Handler for GET /exists/:key
pub async fn exists_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<ExistsResponse>> {
    let exists = state.cache.exists(&key, &CallOptions::default()).await?;

    Ok(Json(ExistsResponse { key, exists }))
}

/// Handler for DELETE /del/:key
pub async fn delete_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<KeyResponse>> {
    state.cache.delete(&key, &CallOptions::default()).await?;

    Ok(Json(KeyResponse::deleted(key)))
}

/// Handler for DELETE /clear
pub async fn clear_handler(State(state): State<AppState>) -> Result<Json<ClearResponse>> {
    state.cache.clear(&CallOptions::default()).await?;

    Ok(Json(ClearResponse::new()))
}

/// Handler for GET /stats
///
/// Backends that keep no counters answer 501.
pub async fn stats_handler(State(state): State<AppState>) -> Result<Json<StatsResponse>> {
    let stats = state
        .cache
        .stats()
        .await
        .ok_or(CacheError::Unsupported("stats"))?;

    Ok(Json(StatsResponse::new(state.backend.name(), &stats)))
}

/// Handler for GET /health
pub async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse::healthy(state.backend.name()))
}
