//! Background Tasks Module
//!
//! Contains background tasks that run alongside the cache stores.
//!
//! # Tasks
//! - Expiry sweeper: reclaims expired entries in bounded batches, on either
//!   a fixed-rate or a re-arming schedule

mod sweep;

pub use sweep::{spawn_sweeper, Schedule, SweepHandle};
