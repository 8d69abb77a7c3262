//! WebSocket client connection state.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use beacon_core::ConnectionId;
use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

/// Result of queueing one frame for a socket.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SendOutcome {
    /// Queued for the writer task.
    Sent,
    /// Queue full; the frame was dropped, the connection stays.
    Full,
    /// The writer task is gone; the socket is dead.
    Closed,
}

/// One connected WebSocket client, as seen by broadcasters.
///
/// Frames are queued on a bounded channel drained by the session's writer
/// task, so a slow socket never blocks a fan-out.
pub struct ClientConnection {
    id: ConnectionId,
    tx: mpsc::Sender<Arc<str>>,
    connected_at: DateTime<Utc>,
    started: Instant,
    dropped_messages: AtomicU64,
}

impl ClientConnection {
    /// Create a new connection feeding `tx`.
    pub fn new(id: ConnectionId, tx: mpsc::Sender<Arc<str>>) -> Self {
        Self {
            id,
            tx,
            connected_at: Utc::now(),
            started: Instant::now(),
            dropped_messages: AtomicU64::new(0),
        }
    }

    /// Connection identity.
    pub fn id(&self) -> &ConnectionId {
        &self.id
    }

    /// Wall-clock time the socket was accepted.
    pub fn connected_at(&self) -> DateTime<Utc> {
        self.connected_at
    }

    /// Queue a text frame without waiting.
    pub fn send(&self, frame: Arc<str>) -> SendOutcome {
        match self.tx.try_send(frame) {
            Ok(()) => SendOutcome::Sent,
            Err(TrySendError::Full(_)) => {
                let _ = self.dropped_messages.fetch_add(1, Ordering::Relaxed);
                SendOutcome::Full
            }
            Err(TrySendError::Closed(_)) => SendOutcome::Closed,
        }
    }

    /// Total frames dropped on a full queue.
    pub fn drop_count(&self) -> u64 {
        self.dropped_messages.load(Ordering::Relaxed)
    }

    /// Whether the writer side has gone away.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Connection age.
    pub fn age(&self) -> Duration {
        self.started.elapsed()
    }
}
