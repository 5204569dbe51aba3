pub mod actor;
pub mod broadcast;
pub mod handler;
pub mod protocol;

use dashmap::DashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Type alias for the sender half of a WebSocket connection's outbox.
/// Bounded, so a client that stops reading cannot grow server memory.
pub type ConnectionSender = mpsc::Sender<axum::extract::ws::Message>;

/// Identity of one live connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Connection registry: every live WebSocket outbox keyed by connection id.
///
/// Registration, removal and broadcast may run concurrently from any task.
/// Broadcast visits each member present for the whole iteration exactly once;
/// a connection registered mid-broadcast may or may not receive that payload.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: DashMap<ConnectionId, ConnectionSender>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an outbox to the live set and return its identity.
    pub fn register(&self, tx: ConnectionSender) -> ConnectionId {
        let id = ConnectionId::new();
        self.connections.insert(id, tx);
        tracing::debug!(
            connection_id = %id,
            connections = self.connections.len(),
            "Connection registered"
        );
        id
    }

    /// Remove a connection. Removing an absent connection is a no-op.
    /// Returns whether the connection was present.
    pub fn unregister(&self, id: &ConnectionId) -> bool {
        let removed = self.connections.remove(id).is_some();
        if removed {
            tracing::debug!(
                connection_id = %id,
                connections = self.connections.len(),
                "Connection unregistered"
            );
        }
        removed
    }

    #[cfg(test)]
    pub fn contains(&self, id: &ConnectionId) -> bool {
        self.connections.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}

/// Create a new empty connection registry.
pub fn new_connection_registry() -> Arc<ConnectionRegistry> {
    Arc::new(ConnectionRegistry::new())
}
