//! # beacon-server
//!
//! Axum `WebSocket` gateway for one Beacon worker process.
//!
//! - `WebSocket` endpoint: per-socket session (welcome, frame dispatch, cleanup)
//! - Connection registry of the sockets attached to this worker
//! - Bus bridge: publish to the shared broker, fan inbound messages out
//!   locally, fall back to local-only delivery when the broker is gone
//! - Lock-gated periodic notifier (one worker broadcasts per interval)
//! - Drain-then-exit shutdown triggered by SIGINT / SIGTERM
//! - `/health` and Prometheus `/metrics`

#![deny(unsafe_code)]

pub mod config;
pub mod context;
pub mod errors;
pub mod health;
pub mod metrics;
pub mod scheduler;
pub mod server;
pub mod shutdown;
pub mod websocket;

pub use config::{DrainConfig, ServerConfig};
pub use context::ServerContext;
pub use errors::{Result, ServerError};
pub use server::BeaconServer;
pub use shutdown::{DrainOutcome, HardExit, ProcessExit, ShutdownCoordinator};
