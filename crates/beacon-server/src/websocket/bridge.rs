//! Bus bridge: routes broadcasts through the shared broker and fans inbound
//! bus traffic out to this worker's sockets.
//!
//! Every worker publishes to the same channel and every worker's
//! subscription loop redistributes what it hears, so a message reaches the
//! sender's own clients by way of the broker. When the broker refuses a
//! publish, or this worker has no live subscription, the bridge delivers to
//! local sockets directly so they are never starved.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use beacon_bus::{Broker, MessageStream};
use beacon_core::BroadcastMessage;
use futures::StreamExt;
use metrics::counter;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::connection::SendOutcome;
use super::registry::ConnectionRegistry;
use crate::metrics::{BROADCAST_DROPS_TOTAL, BUS_PUBLISH_FAILURES_TOTAL};

/// Whether inbound bus traffic is reaching this worker.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum BusMode {
    /// The subscription loop is running.
    Subscribed,
    /// No subscription; broadcasts reach local sockets only.
    LocalOnly,
}

impl BusMode {
    /// Label used on `/health`.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Subscribed => "subscribed",
            Self::LocalOnly => "local-only",
        }
    }
}

/// Per-call summary of a local fan-out.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FanoutReport {
    /// Frames queued.
    pub delivered: usize,
    /// Frames dropped on a full send queue.
    pub dropped: usize,
    /// Dead sockets unregistered during the fan-out.
    pub removed: usize,
}

/// Where a published message went.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Delivery {
    /// Published to the bus; local sockets get it through the subscription.
    Bus,
    /// Published to the bus and, with no subscription, delivered locally too.
    BusAndLocal(FanoutReport),
    /// The broker refused; delivered to local sockets only.
    LocalFallback(FanoutReport),
}

/// Bridges one worker's registry to the shared broker.
pub struct BusBridge {
    broker: Arc<dyn Broker>,
    channel: String,
    registry: Arc<ConnectionRegistry>,
    started: AtomicBool,
    subscribed: AtomicBool,
    closed: AtomicBool,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl BusBridge {
    /// Create a bridge publishing on `channel`.
    pub fn new(
        broker: Arc<dyn Broker>,
        channel: impl Into<String>,
        registry: Arc<ConnectionRegistry>,
    ) -> Self {
        Self {
            broker,
            channel: channel.into(),
            registry,
            started: AtomicBool::new(false),
            subscribed: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            task: Mutex::new(None),
        }
    }

    /// Channel this bridge publishes and listens on.
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Current subscription state.
    pub fn mode(&self) -> BusMode {
        if self.subscribed.load(Ordering::Acquire) {
            BusMode::Subscribed
        } else {
            BusMode::LocalOnly
        }
    }

    /// Broadcast `message` to every worker. Never fails; broker errors fall
    /// back to local delivery.
    pub async fn publish(&self, message: &BroadcastMessage) -> Delivery {
        let text = message.render();
        match self.broker.publish(&self.channel, &text).await {
            Ok(()) if self.mode() == BusMode::Subscribed => Delivery::Bus,
            Ok(()) => Delivery::BusAndLocal(self.local_fanout(&text)),
            Err(e) => {
                counter!(BUS_PUBLISH_FAILURES_TOTAL).increment(1);
                error!(
                    broker = self.broker.name(),
                    channel = %self.channel,
                    error = %e,
                    "bus publish failed, delivering locally"
                );
                Delivery::LocalFallback(self.local_fanout(&text))
            }
        }
    }

    /// Queue `text` on every local socket.
    ///
    /// Failures are isolated per socket. A socket whose writer is gone is
    /// unregistered; a full queue only loses this frame.
    pub fn local_fanout(&self, text: &str) -> FanoutReport {
        let frame: Arc<str> = Arc::from(text);
        let mut report = FanoutReport::default();
        for conn in self.registry.snapshot() {
            match conn.send(Arc::clone(&frame)) {
                SendOutcome::Sent => report.delivered += 1,
                SendOutcome::Full => {
                    report.dropped += 1;
                    counter!(BROADCAST_DROPS_TOTAL).increment(1);
                    warn!(conn_id = %conn.id(), "send queue full, frame dropped");
                }
                SendOutcome::Closed => {
                    if self.registry.unregister(conn.id()) {
                        report.removed += 1;
                        debug!(conn_id = %conn.id(), "writer gone, connection unregistered");
                    }
                }
            }
        }
        debug!(
            delivered = report.delivered,
            dropped = report.dropped,
            removed = report.removed,
            "local fan-out"
        );
        report
    }

    /// Subscribe to the channel and spawn the redistribution loop.
    ///
    /// Only the first call does anything; later calls return `false`. A
    /// failed subscribe is logged and leaves the bridge in
    /// [`BusMode::LocalOnly`] for the life of the process.
    pub async fn start_subscription(self: &Arc<Self>, token: CancellationToken) -> bool {
        if self.started.swap(true, Ordering::AcqRel) {
            return false;
        }
        let stream = match self.broker.subscribe(&self.channel).await {
            Ok(stream) => stream,
            Err(e) => {
                error!(
                    broker = self.broker.name(),
                    channel = %self.channel,
                    error = %e,
                    "bus subscribe failed, running in local-only mode"
                );
                return true;
            }
        };
        self.subscribed.store(true, Ordering::Release);
        info!(broker = self.broker.name(), channel = %self.channel, "bus subscription started");

        let bridge = Arc::clone(self);
        let handle = tokio::spawn(async move { bridge.pump(stream, token).await });
        *self.task.lock() = Some(handle);
        true
    }

    #[tracing::instrument(skip_all, name = "bus_subscription")]
    async fn pump(&self, mut stream: MessageStream, token: CancellationToken) {
        loop {
            tokio::select! {
                biased;
                () = token.cancelled() => {
                    debug!("subscription loop stopping for shutdown");
                    break;
                }
                next = stream.next() => match next {
                    Some(Ok(payload)) => {
                        let _ = self.local_fanout(&payload);
                    }
                    Some(Err(e)) => {
                        error!(error = %e, "bus subscription failed, running in local-only mode");
                        break;
                    }
                    None => {
                        error!("bus subscription ended, running in local-only mode");
                        break;
                    }
                },
            }
        }
        self.subscribed.store(false, Ordering::Release);
    }

    /// Stop the subscription loop and release the broker. Runs once.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let task = self.task.lock().take();
        if let Some(task) = task {
            task.abort();
        }
        self.subscribed.store(false, Ordering::Release);
        self.broker.close().await;
        info!(broker = self.broker.name(), "bus bridge closed");
    }

    /// Whether [`Self::close`] has run.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
