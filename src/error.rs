//! Error types for the cache
//!
//! Provides unified error handling using thiserror. Transport failures and
//! codec failures keep their own enums so callers can tell a dead connection
//! apart from a malformed value.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

// == Transport Error Enum ==
/// Failures of a round trip to the remote server.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The caller's cancellation token fired before the reply arrived
    #[error("round trip cancelled")]
    Cancelled,

    /// The per-call timeout elapsed before the reply arrived
    #[error("round trip timed out")]
    TimedOut,

    /// The connection went away mid round trip
    #[error("connection reset by peer")]
    ConnectionReset,

    /// Any other I/O level failure
    #[error("transport I/O: {0}")]
    Io(String),
}

// == Codec Error Enum ==
/// Failures turning values into bytes and back.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// The value cannot be represented by the codec
    #[error("encode: {0}")]
    Encode(String),

    /// The bytes do not describe a value of the requested type
    #[error("decode: {0}")]
    Decode(String),
}

// == Cache Error Enum ==
/// Unified error type for every cache backend.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// Key absent, or discovered expired on access
    #[error("not found")]
    NotFound,

    /// The backend cannot perform this operation at all
    #[error("unsupported: {0}")]
    Unsupported(&'static str),

    /// Network, cancellation or timeout failure from the remote server
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Value could not be encoded or decoded
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// Internal invariant violation, e.g. a pipelined reply count mismatch
    #[error("structural: {0}")]
    Structural(String),

    /// Malformed HTTP request
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl CacheError {
    /// Returns true for failures raised by the transport rather than the data.
    pub fn is_transport(&self) -> bool {
        matches!(self, CacheError::Transport(_))
    }

    /// Returns true when the key was absent or expired.
    pub fn is_not_found(&self) -> bool {
        matches!(self, CacheError::NotFound)
    }
}

// == IntoResponse Implementation ==
impl IntoResponse for CacheError {
    fn into_response(self) -> Response {
        let status = match &self {
            CacheError::NotFound => StatusCode::NOT_FOUND,
            CacheError::Unsupported(_) => StatusCode::NOT_IMPLEMENTED,
            CacheError::Transport(TransportError::TimedOut) => StatusCode::GATEWAY_TIMEOUT,
            CacheError::Transport(_) => StatusCode::SERVICE_UNAVAILABLE,
            CacheError::Codec(_) => StatusCode::UNPROCESSABLE_ENTITY,
            CacheError::Structural(_) => StatusCode::INTERNAL_SERVER_ERROR,
            CacheError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        };

        let body = Json(json!({
            "error": self.to_string()
        }));

        (status, body).into_response()
    }
}

// == Result Type Alias ==
/// Convenience Result type for cache operations.
pub type Result<T> = std::result::Result<T, CacheError>;
