//! Remote Module
//!
//! Stores backed by a remote key-value server, and the narrow transport
//! contract they speak.
//!
//! # Contents
//! - `Command` / `Reply`: the primitive commands the stores issue
//! - `Transport`: single and pipelined round trips
//! - `MemoryTransport`: in-process server implementing the contract
//! - `HashStore`: per-field TTL emulated with a companion sorted set
//! - `StringStore`: one remote key per cache key, native expiry

mod field;
mod hash;
mod memory;
mod string;

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;

use crate::error::{CacheError, Result, TransportError};
use crate::options::CallOptions;

pub use field::{ByDisplay, Encoded, ToField};
pub use hash::HashStore;
pub use memory::MemoryTransport;
pub use string::StringStore;

// == Commands ==
/// Native expiry attached to a `SET`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expire {
    /// `EX`, whole seconds
    Seconds(u64),
    /// `PX`, milliseconds
    Millis(u64),
}

impl Expire {
    /// Picks `PX` when the TTL is under a second or not a whole number of
    /// seconds, `EX` otherwise.
    pub fn from_ttl(ttl: Duration) -> Self {
        if use_precise(ttl) {
            Expire::Millis(ttl.as_millis().min(u64::MAX as u128) as u64)
        } else {
            Expire::Seconds(ttl.as_secs())
        }
    }

    pub fn as_duration(&self) -> Duration {
        match *self {
            Expire::Seconds(secs) => Duration::from_secs(secs),
            Expire::Millis(ms) => Duration::from_millis(ms),
        }
    }
}

fn use_precise(ttl: Duration) -> bool {
    ttl < Duration::from_secs(1) || ttl.subsec_nanos() != 0
}

/// Primitive commands understood by the remote server.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Get { key: String },
    Set { key: String, value: Bytes, expire: Option<Expire> },
    MGet { keys: Vec<String> },
    Exists { keys: Vec<String> },
    Del { keys: Vec<String> },
    HGet { key: String, field: String },
    HMGet { key: String, fields: Vec<String> },
    HSet { key: String, fields: Vec<(String, Bytes)> },
    HExists { key: String, field: String },
    HDel { key: String, fields: Vec<String> },
    ZScore { key: String, member: String },
    ZAdd { key: String, members: Vec<(i64, String)> },
    ZRem { key: String, members: Vec<String> },
    /// Members with score in `(-inf, max]`, lowest score first
    ZRangeByScore { key: String, max: i64, limit: Option<usize> },
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::Get { .. } => "GET",
            Command::Set { .. } => "SET",
            Command::MGet { .. } => "MGET",
            Command::Exists { .. } => "EXISTS",
            Command::Del { .. } => "DEL",
            Command::HGet { .. } => "HGET",
            Command::HMGet { .. } => "HMGET",
            Command::HSet { .. } => "HSET",
            Command::HExists { .. } => "HEXISTS",
            Command::HDel { .. } => "HDEL",
            Command::ZScore { .. } => "ZSCORE",
            Command::ZAdd { .. } => "ZADD",
            Command::ZRem { .. } => "ZREM",
            Command::ZRangeByScore { .. } => "ZRANGEBYSCORE",
        }
    }
}

// == Replies ==
/// Reply to one command. Server-side errors arrive as `Reply::Error`
/// inside an otherwise successful round trip.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Nil,
    Status(String),
    Integer(i64),
    Bulk(Bytes),
    Array(Vec<Reply>),
    Error(String),
}

impl Reply {
    /// Bulk payload, `None` for a nil reply.
    pub fn into_bytes(self) -> Result<Option<Bytes>> {
        match self {
            Reply::Nil => Ok(None),
            Reply::Bulk(bytes) => Ok(Some(bytes)),
            other => Err(unexpected("bulk", other)),
        }
    }

    pub fn into_integer(self) -> Result<i64> {
        match self {
            Reply::Integer(n) => Ok(n),
            other => Err(unexpected("integer", other)),
        }
    }

    pub fn into_array(self) -> Result<Vec<Reply>> {
        match self {
            Reply::Array(items) => Ok(items),
            other => Err(unexpected("array", other)),
        }
    }

    /// Sorted-set score, `None` when the member has none.
    pub fn into_score(self) -> Result<Option<i64>> {
        match self {
            Reply::Nil => Ok(None),
            Reply::Integer(n) => Ok(Some(n)),
            Reply::Bulk(bytes) => std::str::from_utf8(&bytes)
                .ok()
                .and_then(parse_score)
                .map(Some)
                .ok_or_else(|| CacheError::Structural("score is not a number".to_string())),
            other => Err(unexpected("score", other)),
        }
    }

    /// Fails on anything but a status or integer acknowledgement.
    pub fn ack(self) -> Result<()> {
        match self {
            Reply::Status(_) | Reply::Integer(_) => Ok(()),
            other => Err(unexpected("acknowledgement", other)),
        }
    }
}

/// Scores travel as doubles, e.g. `1.729e+18`; integer text parses exactly.
fn parse_score(text: &str) -> Option<i64> {
    text.parse::<i64>().ok().or_else(|| {
        text.parse::<f64>()
            .ok()
            .filter(|score| !score.is_nan())
            .map(|score| score as i64)
    })
}

fn unexpected(wanted: &str, reply: Reply) -> CacheError {
    match reply {
        Reply::Error(message) => CacheError::Structural(message),
        other => CacheError::Structural(format!("expected {} reply, got {:?}", wanted, other)),
    }
}

// == Transport Trait ==
/// Connection to the remote server.
///
/// A pipeline travels in one round trip and either fails as a whole with a
/// `TransportError` or yields one reply per command. The server applies the
/// commands in order but without atomicity.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    async fn pipeline(&self, commands: Vec<Command>) -> std::result::Result<Vec<Reply>, TransportError>;

    async fn execute(&self, command: Command) -> std::result::Result<Reply, TransportError> {
        self.pipeline(vec![command])
            .await?
            .pop()
            .ok_or_else(|| TransportError::Io("empty pipeline reply".to_string()))
    }
}

// == Round Trips ==
/// Runs a transport future under the caller's timeout and cancellation token.
async fn round_trip<F, T>(options: &CallOptions, request: F) -> std::result::Result<T, TransportError>
where
    F: Future<Output = std::result::Result<T, TransportError>>,
{
    let bounded = async {
        match options.timeout {
            Some(limit) => match tokio::time::timeout(limit, request).await {
                Ok(result) => result,
                Err(_) => Err(TransportError::TimedOut),
            },
            None => request.await,
        }
    };

    match &options.cancellation {
        Some(token) => tokio::select! {
            biased;

            _ = token.cancelled() => Err(TransportError::Cancelled),
            result = bounded => result,
        },
        None => bounded.await,
    }
}

/// Sends one command.
pub(crate) async fn execute<T>(transport: &T, command: Command, options: &CallOptions) -> Result<Reply>
where
    T: Transport + ?Sized,
{
    Ok(round_trip(options, transport.execute(command)).await?)
}

/// Sends a pipeline and checks that every command got a reply.
pub(crate) async fn pipeline<T>(
    transport: &T,
    commands: Vec<Command>,
    options: &CallOptions,
) -> Result<Vec<Reply>>
where
    T: Transport + ?Sized,
{
    let expected = commands.len();
    let replies = round_trip(options, transport.pipeline(commands)).await?;
    if replies.len() != expected {
        return Err(CacheError::Structural(format!(
            "pipeline sent {} commands, got {} replies",
            expected,
            replies.len()
        )));
    }
    Ok(replies)
}

// == Timestamps ==
/// Current wall-clock time in unix nanoseconds.
pub(crate) fn now_nanos() -> i64 {
    Utc::now().timestamp_nanos_opt().unwrap_or(i64::MAX)
}

/// Unix-nanosecond deadline `ttl` from now, saturating at `i64::MAX`.
pub(crate) fn deadline_nanos(ttl: Duration) -> i64 {
    let ttl = i64::try_from(ttl.as_nanos()).unwrap_or(i64::MAX);
    now_nanos().saturating_add(ttl)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_util::sync::CancellationToken;

    struct Stalled;

    #[async_trait]
    impl Transport for Stalled {
        async fn pipeline(
            &self,
            _commands: Vec<Command>,
        ) -> std::result::Result<Vec<Reply>, TransportError> {
            std::future::pending().await
        }
    }

    struct Short;

    #[async_trait]
    impl Transport for Short {
        async fn pipeline(
            &self,
            _commands: Vec<Command>,
        ) -> std::result::Result<Vec<Reply>, TransportError> {
            Ok(vec![Reply::Nil])
        }
    }

    #[test]
    fn test_expire_precision() {
        assert_eq!(Expire::from_ttl(Duration::from_secs(5)), Expire::Seconds(5));
        assert_eq!(Expire::from_ttl(Duration::from_millis(500)), Expire::Millis(500));
        assert_eq!(Expire::from_ttl(Duration::from_millis(1500)), Expire::Millis(1500));
        assert_eq!(Expire::Seconds(2).as_duration(), Duration::from_secs(2));
    }

    #[test]
    fn test_reply_conversions() {
        assert_eq!(Reply::Nil.into_bytes().unwrap(), None);
        assert_eq!(
            Reply::Bulk(Bytes::from_static(b"v")).into_bytes().unwrap(),
            Some(Bytes::from_static(b"v"))
        );
        assert_eq!(
            Reply::Bulk(Bytes::from_static(b"42")).into_score().unwrap(),
            Some(42)
        );
        assert_eq!(Reply::Nil.into_score().unwrap(), None);
        assert!(Reply::Bulk(Bytes::from_static(b"soon")).into_score().is_err());
        assert!(Reply::Integer(1).ack().is_ok());

        let err = Reply::Error("WRONGTYPE".to_string()).into_bytes().unwrap_err();
        assert_eq!(err, CacheError::Structural("WRONGTYPE".to_string()));
        assert!(!err.is_transport());
    }

    #[test]
    fn test_double_formatted_scores() {
        let score =
            |text: &'static str| Reply::Bulk(Bytes::from_static(text.as_bytes())).into_score();

        assert_eq!(score("1.729e+18").unwrap(), Some(1_729_000_000_000_000_000));
        assert_eq!(score("1.729e18").unwrap(), Some(1_729_000_000_000_000_000));
        assert_eq!(score("1500.0").unwrap(), Some(1500));
        assert_eq!(score("-3").unwrap(), Some(-3));
        assert_eq!(score("inf").unwrap(), Some(i64::MAX));
        assert!(score("nan").is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_is_transport_error() {
        let options = CallOptions::new().with_timeout(Duration::from_millis(50));
        let err = execute(&Stalled, Command::Get { key: "k".into() }, &options)
            .await
            .unwrap_err();
        assert_eq!(err, CacheError::Transport(TransportError::TimedOut));
    }

    #[tokio::test]
    async fn test_cancellation_aborts_round_trip() {
        let token = CancellationToken::new();
        token.cancel();
        let options = CallOptions::new().with_cancellation(token);

        let err = execute(&Stalled, Command::Get { key: "k".into() }, &options)
            .await
            .unwrap_err();
        assert_eq!(err, CacheError::Transport(TransportError::Cancelled));
    }

    #[tokio::test]
    async fn test_pipeline_reply_count_mismatch() {
        let commands = vec![
            Command::Get { key: "a".into() },
            Command::Get { key: "b".into() },
        ];
        let err = pipeline(&Short, commands, &CallOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, CacheError::Structural(_)));
    }

    #[test]
    fn test_deadline_saturates() {
        assert!(deadline_nanos(Duration::from_secs(1)) > now_nanos());
        assert_eq!(deadline_nanos(Duration::MAX), i64::MAX);
    }
}
