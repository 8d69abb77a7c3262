//! # beacon-settings
//!
//! Configuration management with layered sources for Beacon workers.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`BeaconSettings::default()`]
//! 2. **Settings file**: optional JSON (deep-merged over defaults)
//! 3. **Environment variables**: `REDIS_URL` and `BEACON_*` overrides
//!
//! The worker binary applies its CLI flags on top and then calls
//! [`BeaconSettings::validate`].

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings, load_settings_from_path};
pub use types::*;

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deep_merge_re_exported() {
        let a = serde_json::json!({"x": 1});
        let b = serde_json::json!({"y": 2});
        let merged = deep_merge(a, b);
        assert_eq!(merged["x"], 1);
        assert_eq!(merged["y"], 2);
    }

    #[test]
    fn default_settings_are_valid() {
        let settings = BeaconSettings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.server.port, 8000);
        assert_eq!(settings.server.ws_path, "/ws");
        assert_eq!(settings.broker.url, "redis://127.0.0.1:6379");
        assert_eq!(settings.scheduler.interval_secs, 10);
        assert_eq!(settings.scheduler.lock_ttl_secs, 9);
        assert_eq!(settings.shutdown.drain_timeout_secs, 1800);
    }
}
