//! Per-process set of live connections.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;

use beacon_core::ConnectionId;
use parking_lot::RwLock;

use super::connection::ClientConnection;

/// The sockets attached to this worker, keyed by identity.
///
/// Membership only ever reflects open sockets: sessions unregister on every
/// terminal path and fan-out unregisters sockets whose writer is gone.
pub struct ConnectionRegistry {
    connections: RwLock<HashMap<ConnectionId, Arc<ClientConnection>>>,
}

impl ConnectionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
        }
    }

    /// Add a connection. Returns `false` if its identity is already present.
    pub fn register(&self, connection: Arc<ClientConnection>) -> bool {
        match self.connections.write().entry(connection.id().clone()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                let _ = slot.insert(connection);
                true
            }
        }
    }

    /// Remove a connection. Returns `false` if it was not present.
    pub fn unregister(&self, id: &ConnectionId) -> bool {
        self.connections.write().remove(id).is_some()
    }

    /// Point-in-time copy of the current connections.
    pub fn snapshot(&self) -> Vec<Arc<ClientConnection>> {
        self.connections.read().values().cloned().collect()
    }

    /// Number of live connections.
    pub fn count(&self) -> usize {
        self.connections.read().len()
    }

    /// Whether no connections are attached.
    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    /// Whether `id` is registered.
    pub fn contains(&self, id: &ConnectionId) -> bool {
        self.connections.read().contains_key(id)
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
