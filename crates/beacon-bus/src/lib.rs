//! # beacon-bus
//!
//! The publish/subscribe collaborator every worker shares.
//!
//! - [`Broker`]: publish, subscribe, atomic set-if-absent with expiry, close
//! - [`RedisBroker`]: production backend over one shared Redis connection
//! - [`MemoryBroker`]: in-process backend for single-worker runs and tests,
//!   with failure injection
//! - [`DistributedLock`]: TTL-bounded lock on top of set-if-absent

#![deny(unsafe_code)]

pub mod broker;
pub mod error;
pub mod lock;
pub mod memory;
pub mod redis_broker;

pub use broker::{Broker, MessageStream, from_url};
pub use error::{BusError, Result};
pub use lock::DistributedLock;
pub use memory::MemoryBroker;
pub use redis_broker::RedisBroker;
