//! Presence registry: live connections and the identities bound to them.

use crate::connection::{unix_now, Connection, ConnectionId};
use crate::error::RealtimeError;
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

/// Association of a connection to a display username.
///
/// Bindings are never edited; a rebind replaces the whole value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IdentityBinding {
    /// Display name, trimmed.
    pub username: String,
    /// Connection the name is bound to.
    pub connection_id: ConnectionId,
    /// When the binding was created (Unix timestamp).
    pub bound_at: u64,
}

/// One row of a presence snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PresenceEntry {
    /// Connection identifier.
    pub connection_id: ConnectionId,
    /// Bound username.
    pub username: String,
}

#[derive(Debug, Default)]
struct RegistryInner {
    connections: HashMap<ConnectionId, Arc<Connection>>,
    bindings: HashMap<ConnectionId, IdentityBinding>,
}

/// Single source of truth for who is connected and under which name.
///
/// Both maps sit behind one lock so a snapshot never sees a binding for a
/// connection that is not registered.
#[derive(Debug, Default)]
pub struct PresenceRegistry {
    inner: RwLock<RegistryInner>,
}

impl PresenceRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a live connection.
    pub fn register(&self, connection: Arc<Connection>) {
        self.inner
            .write()
            .connections
            .insert(connection.id.clone(), connection);
    }

    /// Add a live connection unless `max` connections are already registered.
    ///
    /// The count and the insert happen under one write lock, so concurrent
    /// callers can never push the registry past `max`.
    pub fn register_bounded(
        &self,
        connection: Arc<Connection>,
        max: usize,
    ) -> Result<(), RealtimeError> {
        let mut inner = self.inner.write();
        if inner.connections.len() >= max {
            return Err(RealtimeError::ConnectionLimit(max));
        }
        inner.connections.insert(connection.id.clone(), connection);
        Ok(())
    }

    /// Remove a connection together with its binding, if any.
    pub fn remove(
        &self,
        connection_id: &str,
    ) -> Option<(Arc<Connection>, Option<IdentityBinding>)> {
        let mut inner = self.inner.write();
        let connection = inner.connections.remove(connection_id)?;
        let binding = inner.bindings.remove(connection_id);
        Some((connection, binding))
    }

    /// Look up a live connection.
    pub fn get(&self, connection_id: &str) -> Option<Arc<Connection>> {
        self.inner.read().connections.get(connection_id).cloned()
    }

    /// Create or replace the binding for `connection_id`.
    ///
    /// The previous binding, if any, is discarded without a leave.
    pub fn bind(
        &self,
        connection_id: &str,
        username: &str,
    ) -> Result<IdentityBinding, RealtimeError> {
        let username = username.trim();
        if username.is_empty() {
            return Err(RealtimeError::InvalidIdentity(
                "username cannot be empty".to_string(),
            ));
        }

        let mut inner = self.inner.write();
        if !inner.connections.contains_key(connection_id) {
            return Err(RealtimeError::UnknownConnection(connection_id.to_string()));
        }

        let binding = IdentityBinding {
            username: username.to_string(),
            connection_id: connection_id.to_string(),
            bound_at: unix_now(),
        };
        inner
            .bindings
            .insert(connection_id.to_string(), binding.clone());

        Ok(binding)
    }

    /// Remove the binding for `connection_id`.
    ///
    /// `None` means nothing was bound, which callers treat as "already left".
    pub fn unbind(&self, connection_id: &str) -> Option<IdentityBinding> {
        self.inner.write().bindings.remove(connection_id)
    }

    /// Username bound to `connection_id`.
    pub fn lookup(&self, connection_id: &str) -> Option<String> {
        self.inner
            .read()
            .bindings
            .get(connection_id)
            .map(|b| b.username.clone())
    }

    /// Point-in-time copy of every binding.
    pub fn all(&self) -> Vec<PresenceEntry> {
        let mut entries: Vec<PresenceEntry> = self
            .inner
            .read()
            .bindings
            .values()
            .map(|b| PresenceEntry {
                connection_id: b.connection_id.clone(),
                username: b.username.clone(),
            })
            .collect();
        entries.sort_by(|a, b| a.username.cmp(&b.username));
        entries
    }

    /// Point-in-time copy of every live connection.
    pub fn connections(&self) -> Vec<Arc<Connection>> {
        self.inner.read().connections.values().cloned().collect()
    }

    /// Number of live connections.
    pub fn connection_count(&self) -> usize {
        self.inner.read().connections.len()
    }

    /// Number of bound identities.
    pub fn binding_count(&self) -> usize {
        self.inner.read().bindings.len()
    }
}
