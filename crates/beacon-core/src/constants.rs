//! Well-known names shared by every worker in a deployment.

/// Current version of Beacon (sourced from Cargo.toml).
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Pub/sub channel every worker publishes to and subscribes on.
pub const BROADCAST_CHANNEL: &str = "beacon:broadcast";

/// Key guarding the periodic notification; held by at most one worker per tick.
pub const PERIODIC_LOCK_KEY: &str = "beacon:periodic-notification-lock";

/// Environment variable naming the broker URL.
pub const BROKER_URL_ENV: &str = "REDIS_URL";

/// Broker URL used when [`BROKER_URL_ENV`] is unset.
pub const DEFAULT_BROKER_URL: &str = "redis://127.0.0.1:6379";

/// WebSocket close code sent to clients that connect while a worker drains.
pub const CLOSE_GOING_AWAY: u16 = 1001;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_is_semver() {
        let parts: Vec<&str> = VERSION.split('.').collect();
        assert_eq!(parts.len(), 3, "VERSION must be semver (MAJOR.MINOR.PATCH)");
        for part in parts {
            let _: u32 = part.parse().expect("each semver segment must be a number");
        }
    }

    #[test]
    fn default_broker_is_loopback_standard_port() {
        assert!(DEFAULT_BROKER_URL.starts_with("redis://127.0.0.1"));
        assert!(DEFAULT_BROKER_URL.ends_with(":6379"));
    }

    #[test]
    fn channel_and_lock_key_differ() {
        assert_ne!(BROADCAST_CHANNEL, PERIODIC_LOCK_KEY);
    }
}
