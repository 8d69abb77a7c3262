//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`BeaconSettings::default()`]
//! 2. If a settings file exists, deep-merge its values over defaults
//! 3. Apply environment variable overrides (highest priority)
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use beacon_core::constants::BROKER_URL_ENV;
use beacon_core::logging::LogFormat;
use serde_json::Value;
use tracing::debug;

use crate::errors::Result;
use crate::types::BeaconSettings;

/// Environment variable naming an optional JSON settings file.
pub const CONFIG_PATH_ENV: &str = "BEACON_CONFIG";

/// Settings file named by [`CONFIG_PATH_ENV`], if any.
pub fn settings_path() -> Option<PathBuf> {
    read_env_string(CONFIG_PATH_ENV).map(PathBuf::from)
}

/// Load settings from [`settings_path`] (or defaults) with env var overrides.
pub fn load_settings() -> Result<BeaconSettings> {
    match settings_path() {
        Some(path) => load_settings_from_path(&path),
        None => {
            let mut settings = BeaconSettings::default();
            apply_env_overrides(&mut settings);
            Ok(settings)
        }
    }
}

/// Load settings from a specific path with env var overrides.
///
/// If the file does not exist, returns defaults. If the file contains
/// invalid JSON, returns an error.
pub fn load_settings_from_path(path: &Path) -> Result<BeaconSettings> {
    let defaults = serde_json::to_value(BeaconSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: BeaconSettings = serde_json::from_value(merged)?;
    apply_env_overrides(&mut settings);
    Ok(settings)
}

/// Recursive deep merge of two JSON values.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply process environment overrides to loaded settings.
pub fn apply_env_overrides(settings: &mut BeaconSettings) {
    apply_overrides_from(settings, |name| std::env::var(name).ok());
}

/// Apply overrides read through `lookup` (the process environment in
/// production, a map in tests).
///
/// Invalid values are ignored with a warning, keeping the file/default value.
pub fn apply_overrides_from(settings: &mut BeaconSettings, lookup: impl Fn(&str) -> Option<String>) {
    let string = |name: &str| lookup(name).filter(|v| !v.is_empty());
    let number = |name: &str, min: u64, max: u64| {
        let val = string(name)?;
        let result = parse_u64_range(&val, min, max);
        if result.is_none() {
            tracing::warn!(key = name, value = %val, "invalid numeric env var, ignoring");
        }
        result
    };

    if let Some(v) = string(BROKER_URL_ENV) {
        settings.broker.url = v;
    }
    if let Some(v) = string("BEACON_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = number("BEACON_PORT", 0, u64::from(u16::MAX)) {
        // bounded by u16::MAX above
        settings.server.port = u16::try_from(v).unwrap_or(settings.server.port);
    }
    if let Some(v) = string("BEACON_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = string("BEACON_LOG_FORMAT") {
        match v.parse::<LogFormat>() {
            Ok(format) => settings.logging.format = format,
            Err(e) => tracing::warn!(key = "BEACON_LOG_FORMAT", error = %e, "ignoring"),
        }
    }
    if let Some(v) = number("BEACON_BROADCAST_INTERVAL_SECS", 2, 86_400) {
        settings.scheduler.interval_secs = v;
        // keep the lock strictly inside the new period
        if settings.scheduler.lock_ttl_secs >= v {
            settings.scheduler.lock_ttl_secs = v - 1;
        }
    }
    if let Some(v) = number("BEACON_DRAIN_TIMEOUT_SECS", 0, 86_400) {
        settings.shutdown.drain_timeout_secs = v;
    }
}

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

fn read_env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
