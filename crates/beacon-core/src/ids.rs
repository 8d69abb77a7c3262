//! Identity newtypes for sockets and worker processes.
//!
//! [`ConnectionId`] is a UUID v7 (time-ordered) wrapped in a `String` newtype
//! so a socket identity can never be confused with any other string.
//! [`ProcessId`] names the worker that owns a connection or originated a
//! broadcast; it defaults to the OS process id.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier for one accepted WebSocket connection.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(String);

impl ConnectionId {
    /// Create a new random ID (UUID v7, time-ordered).
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    /// Return the inner string as a slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::ops::Deref for ConnectionId {
    type Target = str;
    fn deref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ConnectionId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl From<String> for ConnectionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Identity of a worker process.
///
/// Only used for labeling payloads and log lines, never for routing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProcessId(u32);

impl ProcessId {
    /// The identity of the running OS process.
    #[must_use]
    pub fn current() -> Self {
        Self(std::process::id())
    }

    /// Raw numeric value.
    #[must_use]
    pub fn get(self) -> u32 {
        self.0
    }
}

impl From<u32> for ProcessId {
    fn from(pid: u32) -> Self {
        Self(pid)
    }
}

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_id_new_is_uuid_v7() {
        let id = ConnectionId::new();
        let parsed = Uuid::parse_str(id.as_str()).expect("should be valid UUID");
        assert_eq!(parsed.get_version(), Some(uuid::Version::SortRand));
    }

    #[test]
    fn connection_ids_are_unique() {
        assert_ne!(ConnectionId::new(), ConnectionId::new());
    }

    #[test]
    fn connection_id_deref_and_display() {
        let id = ConnectionId::from("conn-1");
        let s: &str = &id;
        assert_eq!(s, "conn-1");
        assert_eq!(format!("{id}"), "conn-1");
    }

    #[test]
    fn connection_id_hash_and_eq() {
        use std::collections::HashSet;
        let mut set = HashSet::new();
        let id = ConnectionId::from("same");
        let _ = set.insert(id.clone());
        let _ = set.insert(id);
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn process_id_current_matches_os() {
        assert_eq!(ProcessId::current().get(), std::process::id());
    }

    #[test]
    fn process_id_display_is_numeric() {
        assert_eq!(ProcessId::from(4242).to_string(), "4242");
    }

    #[test]
    fn process_id_serializes_transparently() {
        let json = serde_json::to_string(&ProcessId::from(7)).unwrap();
        assert_eq!(json, "7");
    }
}
