//! Settings types.
//!
//! Every section deserializes with `#[serde(default)]`, so a settings file
//! only has to name the keys it changes.

use std::time::Duration;

use beacon_core::constants::{BROADCAST_CHANNEL, DEFAULT_BROKER_URL, PERIODIC_LOCK_KEY};
use beacon_core::logging::LogFormat;
use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings for one worker process.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BeaconSettings {
    /// HTTP / WebSocket listener.
    pub server: ServerSettings,
    /// Pub/sub broker connection.
    pub broker: BrokerSettings,
    /// Lock-gated periodic notification.
    pub scheduler: SchedulerSettings,
    /// Drain-and-exit sequence.
    pub shutdown: ShutdownSettings,
    /// Log output.
    pub logging: LoggingSettings,
}

impl BeaconSettings {
    /// Reject combinations the runtime cannot honor.
    pub fn validate(&self) -> Result<()> {
        if self.server.ws_path.is_empty() || !self.server.ws_path.starts_with('/') {
            return Err(SettingsError::InvalidValue(format!(
                "server.wsPath must start with '/', got {:?}",
                self.server.ws_path
            )));
        }
        if self.server.send_queue_capacity == 0 {
            return Err(SettingsError::InvalidValue(
                "server.sendQueueCapacity must be at least 1".into(),
            ));
        }
        if self.scheduler.interval_secs == 0 {
            return Err(SettingsError::InvalidValue(
                "scheduler.intervalSecs must be at least 1".into(),
            ));
        }
        // the lock has to lapse before the next tick or a dead holder starves everyone
        if self.scheduler.lock_ttl_secs == 0
            || self.scheduler.lock_ttl_secs >= self.scheduler.interval_secs
        {
            return Err(SettingsError::InvalidValue(format!(
                "scheduler.lockTtlSecs ({}) must be in 1..{}",
                self.scheduler.lock_ttl_secs, self.scheduler.interval_secs
            )));
        }
        if self.shutdown.poll_interval_ms == 0 {
            return Err(SettingsError::InvalidValue(
                "shutdown.pollIntervalMs must be at least 1".into(),
            ));
        }
        // a zero bound times out every broker call before it starts
        if self.broker.op_timeout_ms == 0 {
            return Err(SettingsError::InvalidValue(
                "broker.opTimeoutMs must be at least 1".into(),
            ));
        }
        if self.broker.channel.is_empty() || self.broker.lock_key.is_empty() {
            return Err(SettingsError::InvalidValue(
                "broker.channel and broker.lockKey must not be empty".into(),
            ));
        }
        Ok(())
    }
}

/// HTTP / WebSocket listener settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Bind port (`0` picks a free port).
    pub port: u16,
    /// Path of the WebSocket endpoint.
    pub ws_path: String,
    /// Outbound frames buffered per connection before new ones are dropped.
    pub send_queue_capacity: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            ws_path: "/ws".to_string(),
            send_queue_capacity: 256,
        }
    }
}

/// Pub/sub broker settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BrokerSettings {
    /// `redis://…` URL, or `memory://` for the in-process broker.
    pub url: String,
    /// Channel shared by every worker.
    pub channel: String,
    /// Key of the periodic notification lock.
    pub lock_key: String,
    /// Upper bound on a single publish or lock round trip.
    pub op_timeout_ms: u64,
}

impl BrokerSettings {
    /// [`Self::op_timeout_ms`] as a `Duration`.
    pub fn op_timeout(&self) -> Duration {
        Duration::from_millis(self.op_timeout_ms)
    }
}

impl Default for BrokerSettings {
    fn default() -> Self {
        Self {
            url: DEFAULT_BROKER_URL.to_string(),
            channel: BROADCAST_CHANNEL.to_string(),
            lock_key: PERIODIC_LOCK_KEY.to_string(),
            op_timeout_ms: 2_000,
        }
    }
}

/// Lock-gated periodic notification settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SchedulerSettings {
    /// Seconds between ticks.
    pub interval_secs: u64,
    /// Lifetime of the lock; must be shorter than the interval.
    pub lock_ttl_secs: u64,
}

impl SchedulerSettings {
    /// Tick period.
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    /// Lock expiry.
    pub fn lock_ttl(&self) -> Duration {
        Duration::from_secs(self.lock_ttl_secs)
    }
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            interval_secs: 10,
            lock_ttl_secs: 9,
        }
    }
}

/// Drain-and-exit settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ShutdownSettings {
    /// How often the drain loop re-checks the connection count.
    pub poll_interval_ms: u64,
    /// How often the drain loop logs progress.
    pub progress_interval_secs: u64,
    /// Ceiling after which the worker exits regardless of open connections.
    pub drain_timeout_secs: u64,
}

impl Default for ShutdownSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1_000,
            progress_interval_secs: 10,
            drain_timeout_secs: 30 * 60,
        }
    }
}

/// Log output settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default filter directive when `RUST_LOG` is unset.
    pub level: String,
    /// Output format.
    pub format: LogFormat,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Compact,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
