//! Per-call Options
//!
//! Every cache operation takes a `CallOptions`. In-process stores only read
//! the TTL; remote stores also honor the cancellation token and timeout.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

// == Call Options ==
/// Options applied to a single cache call.
///
/// Defaults: no TTL change, no cancellation, no deadline.
#[derive(Debug, Clone, Default)]
pub struct CallOptions {
    /// Time to live for written entries; `None` or zero leaves expiry untouched
    pub ttl: Option<Duration>,
    /// Aborts the pending remote round trip when cancelled
    pub cancellation: Option<CancellationToken>,
    /// Upper bound on a single remote round trip
    pub timeout: Option<Duration>,
}

impl CallOptions {
    /// Creates options with every field unset.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the TTL for written entries.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Attaches a cancellation token.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    /// Bounds each remote round trip by `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Returns the TTL only when it is positive.
    pub fn effective_ttl(&self) -> Option<Duration> {
        self.ttl.filter(|ttl| !ttl.is_zero())
    }
}
