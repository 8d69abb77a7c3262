//! In-process broker.
//!
//! Channels are `tokio::sync::broadcast` senders and keys carry an expiry on
//! the tokio clock, so paused-time tests see TTLs lapse. Several
//! [`MemoryBroker`] handles created with [`MemoryBroker::peer`] share one
//! hub, which is how tests stand up several "workers" on one bus; each handle
//! has its own closed state, like a separate Redis connection.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tracing::warn;

use crate::broker::{Broker, MessageStream};
use crate::error::{BusError, Result};

/// Per-channel buffer; slow subscribers beyond this lag and skip messages.
const CHANNEL_CAPACITY: usize = 1024;

#[derive(Default)]
struct Hub {
    channels: Mutex<HashMap<String, broadcast::Sender<String>>>,
    keys: Mutex<HashMap<String, (String, Instant)>>,
    fail_publish: AtomicBool,
    fail_subscribe: AtomicBool,
    fail_locks: AtomicBool,
}

/// In-memory [`Broker`] with failure injection.
pub struct MemoryBroker {
    hub: Arc<Hub>,
    closed: AtomicBool,
    close_calls: AtomicUsize,
}

impl MemoryBroker {
    /// A broker on a fresh, private hub.
    pub fn new() -> Self {
        Self::on_hub(Arc::new(Hub::default()))
    }

    fn on_hub(hub: Arc<Hub>) -> Self {
        Self {
            hub,
            closed: AtomicBool::new(false),
            close_calls: AtomicUsize::new(0),
        }
    }

    /// Another handle on the same hub (a second worker's connection).
    #[must_use]
    pub fn peer(&self) -> Self {
        Self::on_hub(Arc::clone(&self.hub))
    }

    /// Make every publish on the hub fail.
    pub fn fail_publish(&self, fail: bool) {
        self.hub.fail_publish.store(fail, Ordering::Relaxed);
    }

    /// Make every subscribe on the hub fail.
    pub fn fail_subscribe(&self, fail: bool) {
        self.hub.fail_subscribe.store(fail, Ordering::Relaxed);
    }

    /// Make every set-if-absent on the hub fail.
    pub fn fail_locks(&self, fail: bool) {
        self.hub.fail_locks.store(fail, Ordering::Relaxed);
    }

    /// Drop every channel, ending all live subscription streams.
    pub fn sever_subscribers(&self) {
        self.hub.channels.lock().clear();
    }

    /// Live subscriptions on `channel`.
    pub fn subscriber_count(&self, channel: &str) -> usize {
        self.hub
            .channels
            .lock()
            .get(channel)
            .map_or(0, broadcast::Sender::receiver_count)
    }

    /// How many times `close()` was called on this handle.
    pub fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::Relaxed)
    }

    /// Whether this handle has been closed.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            Err(BusError::Closed)
        } else {
            Ok(())
        }
    }
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Broker for MemoryBroker {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn publish(&self, channel: &str, payload: &str) -> Result<()> {
        self.ensure_open()?;
        if self.hub.fail_publish.load(Ordering::Relaxed) {
            return Err(BusError::Unavailable("publish refused".into()));
        }
        let sender = self.hub.channels.lock().get(channel).cloned();
        if let Some(sender) = sender {
            // no receivers is not an error, same as PUBLISH returning 0
            let _ = sender.send(payload.to_owned());
        }
        Ok(())
    }

    async fn subscribe(&self, channel: &str) -> Result<MessageStream> {
        self.ensure_open()?;
        if self.hub.fail_subscribe.load(Ordering::Relaxed) {
            return Err(BusError::Unavailable("subscribe refused".into()));
        }
        let rx = self
            .hub
            .channels
            .lock()
            .entry(channel.to_owned())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe();

        let stream = BroadcastStream::new(rx).filter_map(|item| {
            std::future::ready(match item {
                Ok(payload) => Some(Ok::<_, BusError>(payload)),
                Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                    warn!(skipped, "memory subscriber lagged, messages dropped");
                    None
                }
            })
        });
        Ok(Box::pin(stream))
    }

    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool> {
        self.ensure_open()?;
        if self.hub.fail_locks.load(Ordering::Relaxed) {
            return Err(BusError::Unavailable("set-if-absent refused".into()));
        }
        let now = Instant::now();
        let mut keys = self.hub.keys.lock();
        if let Some((_, expires_at)) = keys.get(key) {
            if *expires_at > now {
                return Ok(false);
            }
        }
        let _ = keys.insert(key.to_owned(), (value.to_owned(), now + ttl));
        Ok(true)
    }

    async fn close(&self) {
        let _ = self.close_calls.fetch_add(1, Ordering::Relaxed);
        self.closed.store(true, Ordering::Release);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
