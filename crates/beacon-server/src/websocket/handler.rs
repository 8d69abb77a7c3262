//! Inbound frame classification.
//!
//! A [`FrameHandler`] turns one client text frame into a [`Reply`]; the
//! session carries the reply out. [`BroadcastHandler`] is the production
//! behaviour, [`EchoHandler`] answers the sender only.

use async_trait::async_trait;
use beacon_core::{BroadcastMessage, ConnectionId, ProcessId};
use tracing::debug;

/// Control tokens that request a status broadcast instead of a relay.
const STATUS_TOKENS: [&str; 2] = ["test", "ping"];

/// What the session should do with a frame.
#[derive(Clone, Debug)]
pub enum Reply {
    /// Publish to every worker through the bus bridge.
    Broadcast(BroadcastMessage),
    /// Send a text frame to the originating socket only.
    Direct(String),
}

/// Facts about the sending socket and its worker.
#[derive(Clone, Copy, Debug)]
pub struct FrameContext<'a> {
    /// Worker that accepted the socket.
    pub origin: ProcessId,
    /// The sending socket.
    pub conn_id: &'a ConnectionId,
    /// Sockets currently attached to this worker.
    pub local_connections: usize,
}

/// Classifies client frames.
#[async_trait]
pub trait FrameHandler: Send + Sync {
    /// Short name for log fields.
    fn name(&self) -> &'static str;

    /// Decide what to do with `text`.
    async fn handle(&self, text: &str, ctx: &FrameContext<'_>) -> Reply;
}

/// Relays every frame to all workers; `ping` / `test` yield a status report.
#[derive(Clone, Copy, Debug, Default)]
pub struct BroadcastHandler;

/// Whether `text` is a status control token (case-insensitive, trimmed).
pub fn is_status_token(text: &str) -> bool {
    let trimmed = text.trim();
    STATUS_TOKENS.iter().any(|t| trimmed.eq_ignore_ascii_case(t))
}

#[async_trait]
impl FrameHandler for BroadcastHandler {
    fn name(&self) -> &'static str {
        "broadcast"
    }

    async fn handle(&self, text: &str, ctx: &FrameContext<'_>) -> Reply {
        if is_status_token(text) {
            debug!(conn_id = %ctx.conn_id, "status token received");
            Reply::Broadcast(BroadcastMessage::status(ctx.origin, ctx.local_connections))
        } else {
            Reply::Broadcast(BroadcastMessage::chat(ctx.origin, text))
        }
    }
}

/// Echoes each frame back to its sender.
#[derive(Clone, Copy, Debug, Default)]
pub struct EchoHandler;

#[async_trait]
impl FrameHandler for EchoHandler {
    fn name(&self) -> &'static str {
        "echo"
    }

    async fn handle(&self, text: &str, _ctx: &FrameContext<'_>) -> Reply {
        Reply::Direct(format!("Echo: {text}"))
    }
}
