//! # beacon-core
//!
//! Shared vocabulary for the Beacon broadcast workers:
//!
//! - **Identities**: [`ConnectionId`] for sockets, [`ProcessId`] for workers
//! - **Payloads**: [`BroadcastMessage`] and the text frames it renders to
//! - **Constants**: well-known channel / lock key names and the broker default
//! - **Logging**: [`logging::init_subscriber`] for the `tracing` subscriber

#![deny(unsafe_code)]

pub mod constants;
pub mod ids;
pub mod logging;
pub mod message;

pub use ids::{ConnectionId, ProcessId};
pub use message::{BroadcastMessage, MessageKind};
