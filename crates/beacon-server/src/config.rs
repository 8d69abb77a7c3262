//! Server configuration.
//!
//! The runtime view of [`BeaconSettings`]: durations instead of raw integers,
//! and only the values the server itself consumes.

use std::time::Duration;

use beacon_core::constants::{BROADCAST_CHANNEL, PERIODIC_LOCK_KEY};
use beacon_settings::BeaconSettings;

/// Configuration for one worker's server.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Host to bind (default `"127.0.0.1"`).
    pub host: String,
    /// Port to bind (default `0` for auto-assign).
    pub port: u16,
    /// Route of the `WebSocket` endpoint.
    pub ws_path: String,
    /// Outbound frames queued per socket before new ones are dropped.
    pub send_queue_capacity: usize,
    /// Bus channel shared by all workers.
    pub channel: String,
    /// Key of the periodic notification lock.
    pub lock_key: String,
    /// Period of the lock-gated notification.
    pub broadcast_interval: Duration,
    /// Expiry of the periodic lock; shorter than `broadcast_interval`.
    pub lock_ttl: Duration,
    /// Drain-on-shutdown timing.
    pub drain: DrainConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            ws_path: "/ws".into(),
            send_queue_capacity: 256,
            channel: BROADCAST_CHANNEL.into(),
            lock_key: PERIODIC_LOCK_KEY.into(),
            broadcast_interval: Duration::from_secs(10),
            lock_ttl: Duration::from_secs(9),
            drain: DrainConfig::default(),
        }
    }
}

impl From<&BeaconSettings> for ServerConfig {
    fn from(settings: &BeaconSettings) -> Self {
        Self {
            host: settings.server.host.clone(),
            port: settings.server.port,
            ws_path: settings.server.ws_path.clone(),
            send_queue_capacity: settings.server.send_queue_capacity,
            channel: settings.broker.channel.clone(),
            lock_key: settings.broker.lock_key.clone(),
            broadcast_interval: settings.scheduler.interval(),
            lock_ttl: settings.scheduler.lock_ttl(),
            drain: DrainConfig {
                poll_interval: Duration::from_millis(settings.shutdown.poll_interval_ms),
                progress_interval: Duration::from_secs(settings.shutdown.progress_interval_secs),
                timeout: Duration::from_secs(settings.shutdown.drain_timeout_secs),
            },
        }
    }
}

/// How the shutdown drain polls, reports and gives up.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DrainConfig {
    /// Delay between connection-count checks.
    pub poll_interval: Duration,
    /// Delay between progress log lines.
    pub progress_interval: Duration,
    /// Ceiling after which the worker exits anyway.
    pub timeout: Duration,
}

impl Default for DrainConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            progress_interval: Duration::from_secs(10),
            timeout: Duration::from_secs(30 * 60),
        }
    }
}
