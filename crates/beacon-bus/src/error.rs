//! Broker error types.

use std::time::Duration;

use thiserror::Error;

/// Errors surfaced by a [`Broker`](crate::Broker).
#[derive(Debug, Error)]
pub enum BusError {
    /// The Redis client reported a failure (refused, protocol, I/O).
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
    /// The operation did not complete in time.
    #[error("broker operation timed out after {0:?}")]
    Timeout(Duration),
    /// The broker connection was released by `close()`.
    #[error("broker connection closed")]
    Closed,
    /// The broker is unreachable.
    #[error("broker unavailable: {0}")]
    Unavailable(String),
    /// The URL scheme names no known backend.
    #[error("unsupported broker URL: {0}")]
    UnsupportedUrl(String),
}

/// Result type for broker operations.
pub type Result<T> = std::result::Result<T, BusError>;
