//! Redis backend.
//!
//! Commands share one lazily-established [`ConnectionManager`], cloned per
//! call (it multiplexes). Each subscription owns a dedicated pub/sub
//! connection, as Redis requires. Every round trip is bounded by the
//! configured operation timeout so a dead broker cannot stall callers.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, RedisResult};
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::broker::{Broker, MessageStream};
use crate::error::{BusError, Result};

/// Redis-backed [`Broker`].
pub struct RedisBroker {
    client: Client,
    conn: Mutex<Option<ConnectionManager>>,
    op_timeout: Duration,
    closed: AtomicBool,
}

impl RedisBroker {
    /// Parse `url` and prepare a client. Does not connect.
    pub fn open(url: &str, op_timeout: Duration) -> Result<Self> {
        let client = Client::open(url)?;
        Ok(Self {
            client,
            conn: Mutex::new(None),
            op_timeout,
            closed: AtomicBool::new(false),
        })
    }

    /// Run a Redis future under the operation timeout.
    async fn bounded<T>(&self, fut: impl Future<Output = RedisResult<T>>) -> Result<T> {
        match tokio::time::timeout(self.op_timeout, fut).await {
            Ok(result) => result.map_err(BusError::from),
            Err(_) => Err(BusError::Timeout(self.op_timeout)),
        }
    }

    /// The shared command connection, established on first use.
    ///
    /// The connect runs outside the lock, so callers during an outage each
    /// wait one `op_timeout` rather than queueing behind one another. When two
    /// connects race, the first stored manager wins.
    async fn connection(&self) -> Result<ConnectionManager> {
        if self.closed.load(Ordering::Acquire) {
            return Err(BusError::Closed);
        }
        if let Some(conn) = self.conn.lock().as_ref() {
            return Ok(conn.clone());
        }
        let fresh = self
            .bounded(ConnectionManager::new(self.client.clone()))
            .await?;

        let mut guard = self.conn.lock();
        if self.closed.load(Ordering::Acquire) {
            return Err(BusError::Closed);
        }
        let conn = guard.get_or_insert_with(|| {
            debug!("redis command connection established");
            fresh
        });
        Ok(conn.clone())
    }
}

#[async_trait]
impl Broker for RedisBroker {
    fn name(&self) -> &'static str {
        "redis"
    }

    async fn publish(&self, channel: &str, payload: &str) -> Result<()> {
        let mut conn = self.connection().await?;
        let receivers: i64 = self.bounded(conn.publish(channel, payload)).await?;
        debug!(channel, receivers, "published");
        Ok(())
    }

    async fn subscribe(&self, channel: &str) -> Result<MessageStream> {
        if self.closed.load(Ordering::Acquire) {
            return Err(BusError::Closed);
        }
        let mut pubsub = self.bounded(self.client.get_async_pubsub()).await?;
        self.bounded(pubsub.subscribe(channel)).await?;
        info!(channel, "subscribed to redis channel");

        let stream = pubsub
            .into_on_message()
            .map(|msg| msg.get_payload::<String>().map_err(BusError::from));
        Ok(Box::pin(stream))
    }

    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool> {
        let mut conn = self.connection().await?;
        let ttl_ms = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1);
        // SET … NX PX replies OK when set and nil when the key already exists
        let reply: Option<String> = self
            .bounded(
                redis::cmd("SET")
                    .arg(key)
                    .arg(value)
                    .arg("NX")
                    .arg("PX")
                    .arg(ttl_ms)
                    .query_async(&mut conn),
            )
            .await?;
        Ok(reply.is_some())
    }

    async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        // dropping the last manager clone closes the socket
        let released = self.conn.lock().take().is_some();
        info!(released, "redis broker closed");
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
