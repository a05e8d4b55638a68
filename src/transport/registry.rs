//! Live connections by id.
//!
//! The registry is the only place the dispatcher finds connection handles.
//! A connection is present from a successful `create` until its close
//! callback runs.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │          ConnectionRegistry             │
//! │  ┌─────────────────────────────────┐    │
//! │  │ id=1 → Connection (event loop)  │    │
//! │  │ id=2 → Connection (event loop)  │    │
//! │  │ id=7 → Connection (event loop)  │    │
//! │  └─────────────────────────────────┘    │
//! └─────────────────────────────────────────┘
//! ```

// ============================================================================
// Imports
// ============================================================================

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use tracing::{debug, info};

use crate::identifiers::ConnectionId;

use super::Connection;

// ============================================================================
// ConnectionRegistry
// ============================================================================

/// Thread-safe map of live connections.
///
/// Handles are cloned out under a read lock, so no lock is held while a
/// connection is used.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: RwLock<FxHashMap<ConnectionId, Connection>>,
}

impl ConnectionRegistry {
    /// Creates an empty registry.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `connection` under its id, replacing any previous entry.
    pub fn insert(&self, connection: Connection) {
        let id = connection.id();
        let previous = self.connections.write().insert(id, connection);

        if previous.is_some() {
            debug!(%id, "Registry entry replaced");
        } else {
            debug!(%id, "Connection registered");
        }
    }

    /// Returns the handle for `id`.
    #[inline]
    #[must_use]
    pub fn lookup(&self, id: ConnectionId) -> Option<Connection> {
        self.connections.read().get(&id).cloned()
    }

    /// Removes `id`. Removing an absent id is a no-op.
    pub fn remove(&self, id: ConnectionId) -> Option<Connection> {
        let removed = self.connections.write().remove(&id);
        if removed.is_some() {
            debug!(%id, "Connection unregistered");
        }
        removed
    }

    /// Removes `id` only if its connection has finished.
    ///
    /// A live replacement registered under the same id is left in place.
    /// Returns `true` if an entry was removed.
    pub fn remove_if_closed(&self, id: ConnectionId) -> bool {
        let mut connections = self.connections.write();

        match connections.get(&id) {
            Some(current) if current.is_closed() => {
                connections.remove(&id);
                debug!(%id, "Connection unregistered");
                true
            }
            _ => false,
        }
    }

    /// Number of registered connections.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.connections.read().len()
    }

    /// Returns `true` if nothing is registered.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.connections.read().is_empty()
    }

    /// Registered ids, in no particular order.
    #[must_use]
    pub fn ids(&self) -> Vec<ConnectionId> {
        self.connections.read().keys().copied().collect()
    }

    /// Empties the registry and closes every connection once.
    ///
    /// Returns the number of connections closed.
    pub fn close_all(&self, code: u16, reason: &str) -> usize {
        let drained: Vec<_> = {
            let mut map = self.connections.write();
            map.drain().collect()
        };

        let count = drained.len();
        for (id, connection) in drained {
            connection.close(code, reason);
            debug!(%id, code, "Connection closed by registry");
        }

        if count > 0 {
            info!(count, code, "Registry closed all connections");
        }
        count
    }
}

// ============================================================================
// Tests
// ============================================================================
