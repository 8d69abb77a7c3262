//! The `Broker` trait and backend selection.

use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::Stream;

use crate::error::{BusError, Result};
use crate::memory::MemoryBroker;
use crate::redis_broker::RedisBroker;

/// Inbound payloads of one subscription. Ends when the transport goes away.
pub type MessageStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// A publish/subscribe broker shared by every worker of a deployment.
#[async_trait]
pub trait Broker: Send + Sync {
    /// Short backend name for log fields.
    fn name(&self) -> &'static str;

    /// Publish `payload` on `channel`.
    async fn publish(&self, channel: &str, payload: &str) -> Result<()>;

    /// Subscribe to `channel`.
    async fn subscribe(&self, channel: &str) -> Result<MessageStream>;

    /// Atomically set `key` to `value` with expiry `ttl` unless it is already
    /// set. Returns `true` if this call set it.
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool>;

    /// Release the broker connection. Later operations fail with
    /// [`BusError::Closed`].
    async fn close(&self);
}

/// Pick a backend from a URL: `redis://` or `memory://`.
///
/// TLS (`rediss://`) is not built in and is rejected as unsupported.
///
/// No network I/O happens here; Redis connects on first use.
pub fn from_url(url: &str, op_timeout: Duration) -> Result<Arc<dyn Broker>> {
    if url.starts_with("memory://") {
        Ok(Arc::new(MemoryBroker::new()))
    } else if url.starts_with("redis://") {
        Ok(Arc::new(RedisBroker::open(url, op_timeout)?))
    } else {
        Err(BusError::UnsupportedUrl(url.to_owned()))
    }
}
