//! Expiring mutual-exclusion lock on the broker.
//!
//! There is no release: the holder simply lets the key expire. With a TTL
//! shorter than the caller's period, at most one holder wins per period and a
//! crashed holder never blocks the next one.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::broker::Broker;

/// A named lock acquired with set-if-absent plus expiry.
pub struct DistributedLock {
    broker: Arc<dyn Broker>,
    key: String,
    ttl: Duration,
    holder: String,
}

impl DistributedLock {
    /// Lock `key` for `ttl` on each successful acquire, recording `holder`
    /// as the value.
    pub fn new(
        broker: Arc<dyn Broker>,
        key: impl Into<String>,
        ttl: Duration,
        holder: impl Into<String>,
    ) -> Self {
        Self {
            broker,
            key: key.into(),
            ttl,
            holder: holder.into(),
        }
    }

    /// Lock key.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Expiry applied on acquire.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Try to take the lock. Broker errors count as "not acquired".
    pub async fn try_acquire(&self) -> bool {
        match self
            .broker
            .set_if_absent(&self.key, &self.holder, self.ttl)
            .await
        {
            Ok(true) => {
                debug!(key = %self.key, holder = %self.holder, "lock acquired");
                true
            }
            Ok(false) => {
                debug!(key = %self.key, "lock held elsewhere");
                false
            }
            Err(e) => {
                warn!(key = %self.key, error = %e, "lock acquisition failed");
                false
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
