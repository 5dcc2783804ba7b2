//! API Module
//!
//! HTTP handlers and routing exposing any configured cache backend.
//!
//! # Endpoints
//! - `PUT /set` - Store a key-value pair
//! - `GET /get/:key` - Retrieve a value by key
//! - `POST /mget` - Retrieve several keys
//! - `PUT /mset` - Store several pairs
//! - `GET /exists/:key` - Check a key
//! - `DELETE /del/:key` - Delete a key
//! - `DELETE /clear` - Remove every entry
//! - `GET /stats` - Get cache statistics
//! - `GET /health` - Health check endpoint

pub mod handlers;
pub mod routes;

pub use handlers::*;
pub use routes::create_router;
