//! WebSocket connection bookkeeping, bus bridging, frame handling and the
//! per-socket session.

pub mod bridge;
pub mod connection;
pub mod handler;
pub mod registry;
pub mod session;
