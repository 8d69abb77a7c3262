//! Per-worker shared state.

use std::sync::Arc;
use std::time::Instant;

use beacon_bus::Broker;
use beacon_core::ProcessId;

use crate::config::{DrainConfig, ServerConfig};
use crate::shutdown::ShutdownCoordinator;
use crate::websocket::bridge::BusBridge;
use crate::websocket::handler::{BroadcastHandler, FrameHandler};
use crate::websocket::registry::ConnectionRegistry;

/// Everything a worker's sessions, notifier and shutdown sequence share.
///
/// Built explicitly and passed around behind `Arc`; several contexts can
/// live in one process, each acting as a separate worker.
pub struct ServerContext {
    /// Identity stamped on this worker's broadcasts.
    pub process: ProcessId,
    /// Shared broker; also backs the periodic lock.
    pub broker: Arc<dyn Broker>,
    /// Sockets attached to this worker.
    pub registry: Arc<ConnectionRegistry>,
    /// Link to the shared broker.
    pub bridge: Arc<BusBridge>,
    /// Drain-and-exit state.
    pub shutdown: Arc<ShutdownCoordinator>,
    /// Frame classification strategy.
    pub handler: Arc<dyn FrameHandler>,
    /// Outbound queue size per socket.
    pub send_queue_capacity: usize,
    /// Drain timing.
    pub drain: DrainConfig,
    /// When the worker started.
    pub start_time: Instant,
}

impl ServerContext {
    /// Build a context around `broker` with the default [`BroadcastHandler`].
    pub fn new(process: ProcessId, broker: Arc<dyn Broker>, config: &ServerConfig) -> Self {
        let registry = Arc::new(ConnectionRegistry::new());
        let bridge = Arc::new(BusBridge::new(
            Arc::clone(&broker),
            config.channel.clone(),
            Arc::clone(&registry),
        ));
        Self {
            process,
            broker,
            registry,
            bridge,
            shutdown: Arc::new(ShutdownCoordinator::new()),
            handler: Arc::new(BroadcastHandler),
            send_queue_capacity: config.send_queue_capacity,
            drain: config.drain,
            start_time: Instant::now(),
        }
    }

    /// Replace the frame handler.
    #[must_use]
    pub fn with_handler(mut self, handler: Arc<dyn FrameHandler>) -> Self {
        self.handler = handler;
        self
    }
}
