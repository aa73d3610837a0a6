//! Registry of live connections.
//!
//! Connections are keyed by [`ConnectionId`] with a secondary index by
//! [`NodeHash`]. A proxy that reconnects before its old stream is torn down
//! has two entries under one node; removing the old one leaves the new one
//! in place.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tracing::debug;

use ads_core::{ConnectionId, NodeHash};

use crate::connection::ConnectionHandle;

/// Concurrent registry of live connections.
///
/// ## Important
///
/// Methods returning several handles return a snapshot `Vec`; no map guard
/// outlives a call.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: DashMap<ConnectionId, Arc<ConnectionHandle>>,
    nodes: DashMap<NodeHash, Vec<ConnectionId>>,
    /// Registered plus reserved slots, checked against connection limits.
    slots: AtomicUsize,
}

impl ConnectionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection.
    pub fn register(&self, handle: Arc<ConnectionHandle>) {
        self.slots.fetch_add(1, Ordering::AcqRel);
        self.insert(handle);
    }

    /// Add a connection unless `limit` connections are already registered.
    /// The slot is reserved atomically, so concurrent callers never exceed
    /// the limit together.
    pub fn try_register(&self, handle: Arc<ConnectionHandle>, limit: usize) -> bool {
        let reserved = self
            .slots
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |slots| {
                (slots < limit).then_some(slots + 1)
            });
        if reserved.is_err() {
            return false;
        }
        self.insert(handle);
        true
    }

    fn insert(&self, handle: Arc<ConnectionHandle>) {
        let id = handle.id();
        let node = handle.node_hash();
        debug!(connection = %id, node = handle.node_id(), "registering connection");
        self.connections.insert(id, handle);
        self.nodes.entry(node).or_default().push(id);
    }

    /// Remove a connection. Returns its handle if it was registered.
    pub fn unregister(&self, id: ConnectionId) -> Option<Arc<ConnectionHandle>> {
        let (_, handle) = self.connections.remove(&id)?;
        self.slots.fetch_sub(1, Ordering::AcqRel);
        let node = handle.node_hash();
        if let Some(mut ids) = self.nodes.get_mut(&node) {
            ids.retain(|existing| *existing != id);
        }
        self.nodes.remove_if(&node, |_, ids| ids.is_empty());
        debug!(connection = %id, node = handle.node_id(), "unregistered connection");
        Some(handle)
    }

    /// Remove every connection of a node. Returns the removed handles.
    pub fn unregister_node(&self, node_id: &str) -> Vec<Arc<ConnectionHandle>> {
        let Some((_, ids)) = self.nodes.remove(&NodeHash::from_id(node_id)) else {
            return Vec::new();
        };
        let removed: Vec<_> = ids
            .into_iter()
            .filter_map(|id| self.connections.remove(&id).map(|(_, handle)| handle))
            .collect();
        self.slots.fetch_sub(removed.len(), Ordering::AcqRel);
        removed
    }

    /// Look up a connection.
    pub fn get(&self, id: ConnectionId) -> Option<Arc<ConnectionHandle>> {
        self.connections.get(&id).map(|r| Arc::clone(r.value()))
    }

    /// Snapshot of every live connection, ordered by id.
    pub fn all(&self) -> Vec<Arc<ConnectionHandle>> {
        let mut handles: Vec<_> = self
            .connections
            .iter()
            .map(|r| Arc::clone(r.value()))
            .collect();
        handles.sort_by_key(|h| h.id());
        handles
    }

    /// Snapshot of a node's connections, oldest first.
    pub fn by_node(&self, node_id: &str) -> Vec<Arc<ConnectionHandle>> {
        let ids = self
            .nodes
            .get(&NodeHash::from_id(node_id))
            .map(|r| r.value().clone())
            .unwrap_or_default();
        ids.into_iter().filter_map(|id| self.get(id)).collect()
    }

    /// Number of live connections.
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    /// Whether no connection is registered.
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Signal every connection to close. Returns how many were newly closed.
    pub fn close_all(&self) -> usize {
        self.all().iter().filter(|handle| handle.close()).count()
    }
}
