//! WebSocket session lifecycle: one connected client from upgrade through
//! disconnect.

use std::sync::Arc;

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use beacon_core::constants::CLOSE_GOING_AWAY;
use beacon_core::ConnectionId;
use futures::{SinkExt, StreamExt};
use metrics::{counter, gauge, histogram};
use tokio::sync::mpsc;
use tracing::{debug, info, instrument};

use super::connection::{ClientConnection, SendOutcome};
use super::handler::{FrameContext, Reply};
use crate::context::ServerContext;
use crate::metrics::{
    WS_CONNECTION_DURATION_SECONDS, WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL,
    WS_DISCONNECTIONS_TOTAL, WS_REJECTIONS_TOTAL,
};

/// Terminal state a session ended in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    /// Refused during shutdown; never registered.
    Rejected,
    /// Registered, welcomed, and serving frames.
    Connected,
    /// Unregistered and released.
    Closed,
}

/// Run a WebSocket session for a newly upgraded socket.
///
/// 1. Refuses the socket with 1001 if the worker is draining
/// 2. Registers it and queues the welcome frame
/// 3. Spawns the writer that drains the socket's send queue
/// 4. Hands each text frame to the context's frame handler
/// 5. Unregisters on close, transport error or writer failure
#[instrument(skip_all, fields(pid = %ctx.process, conn_id = tracing::field::Empty))]
pub async fn run_session(socket: WebSocket, ctx: Arc<ServerContext>) -> ConnectionState {
    if ctx.shutdown.is_shutting_down() {
        reject(socket).await;
        return ConnectionState::Rejected;
    }

    let conn_id = ConnectionId::new();
    let _ = tracing::Span::current().record("conn_id", conn_id.as_str());
    let (mut ws_tx, mut ws_rx) = socket.split();

    let (send_tx, mut send_rx) = mpsc::channel::<Arc<str>>(ctx.send_queue_capacity);
    let connection = Arc::new(ClientConnection::new(conn_id.clone(), send_tx));
    let _ = ctx.registry.register(Arc::clone(&connection));

    counter!(WS_CONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).increment(1.0);
    info!(connections = ctx.registry.count(), "client connected");

    // through the queue: socket order is enqueue order
    let greeting = beacon_core::message::welcome(ctx.process, connection.connected_at());
    let _ = connection.send(Arc::from(greeting));

    let mut writer = tokio::spawn(async move {
        while let Some(frame) = send_rx.recv().await {
            if ws_tx.send(Message::Text(String::from(&*frame).into())).await.is_err() {
                break;
            }
        }
    });

    let mut state = ConnectionState::Connected;
    while state == ConnectionState::Connected {
        let next = tokio::select! {
            next = ws_rx.next() => next,
            _ = &mut writer => {
                debug!("socket writer stopped");
                state = ConnectionState::Closed;
                continue;
            }
        };
        let msg = match next {
            Some(Ok(msg)) => msg,
            Some(Err(e)) => {
                debug!(error = %e, "socket read failed");
                break;
            }
            None => break,
        };
        let text = match &msg {
            Message::Text(t) => t.as_str(),
            Message::Binary(data) => {
                if let Ok(s) = std::str::from_utf8(data) {
                    s
                } else {
                    debug!(len = data.len(), "ignoring non-UTF-8 binary frame");
                    continue;
                }
            }
            Message::Close(_) => {
                debug!("client sent close frame");
                break;
            }
            Message::Ping(_) | Message::Pong(_) => continue,
        };
        dispatch(&ctx, &connection, text).await;
    }

    writer.abort();
    let _ = ctx.registry.unregister(&conn_id);
    counter!(WS_DISCONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).decrement(1.0);
    histogram!(WS_CONNECTION_DURATION_SECONDS).record(connection.age().as_secs_f64());
    info!(connections = ctx.registry.count(), "client disconnected");
    ConnectionState::Closed
}

async fn dispatch(ctx: &ServerContext, connection: &ClientConnection, text: &str) {
    let frame_ctx = FrameContext {
        origin: ctx.process,
        conn_id: connection.id(),
        local_connections: ctx.registry.count(),
    };
    match ctx.handler.handle(text, &frame_ctx).await {
        Reply::Broadcast(message) => {
            let delivery = ctx.bridge.publish(&message).await;
            debug!(kind = ?message.kind(), ?delivery, "frame broadcast");
        }
        Reply::Direct(reply) => {
            let outcome = connection.send(Arc::from(reply));
            if outcome != SendOutcome::Sent {
                debug!(?outcome, "direct reply not queued");
            }
        }
    }
}

async fn reject(mut socket: WebSocket) {
    counter!(WS_REJECTIONS_TOTAL).increment(1);
    info!("shutdown in progress, refusing connection");
    let frame = CloseFrame {
        code: CLOSE_GOING_AWAY,
        reason: String::new().into(),
    };
    if let Err(e) = socket.send(Message::Close(Some(frame))).await {
        debug!(error = %e, "close frame not delivered");
    }
}
