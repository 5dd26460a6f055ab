//! Connection registry.
//!
//! A pure identity/lookup table of live connections. It knows nothing about
//! message semantics; rooms only record which room a connection sits in.

use std::collections::HashMap;
use sync_transport::{ConnectionId, Outbox, TransportError};
use tracing::{debug, trace};

use crate::room::RoomId;

/// A live peer connection.
pub struct Connection {
    /// Connection identifier.
    id: ConnectionId,
    /// Write handle; the connection is the sole writer of its socket.
    outbox: Box<dyn Outbox>,
    /// Remote address, if the transport knows it.
    remote_addr: Option<String>,
    /// Room the connection currently belongs to.
    current_room: Option<RoomId>,
}

impl Connection {
    /// Get the connection ID.
    #[must_use]
    pub fn id(&self) -> &ConnectionId {
        &self.id
    }

    /// Get the remote address.
    #[must_use]
    pub fn remote_addr(&self) -> Option<&str> {
        self.remote_addr.as_deref()
    }

    /// Get the room this connection is in.
    #[must_use]
    pub fn current_room(&self) -> Option<&RoomId> {
        self.current_room.as_ref()
    }

    /// Set or clear the current room.
    pub fn set_current_room(&mut self, room: Option<RoomId>) {
        self.current_room = room;
    }

    /// Queue a text frame on this connection.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection's socket has gone away.
    pub fn deliver(&self, frame: String) -> Result<(), TransportError> {
        self.outbox.deliver(frame)
    }

    /// Check if the connection can still accept frames.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.outbox.is_open()
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("remote_addr", &self.remote_addr)
            .field("current_room", &self.current_room)
            .finish_non_exhaustive()
    }
}

/// Table of live connections.
#[derive(Debug, Default)]
pub struct Registry {
    connections: HashMap<ConnectionId, Connection>,
}

impl Registry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new connection and assign it an identity.
    pub fn register(
        &mut self,
        outbox: Box<dyn Outbox>,
        remote_addr: Option<String>,
    ) -> ConnectionId {
        let mut id = ConnectionId::generate();
        while self.connections.contains_key(&id) {
            id = ConnectionId::generate();
        }

        self.connections.insert(
            id.clone(),
            Connection {
                id: id.clone(),
                outbox,
                remote_addr,
                current_room: None,
            },
        );

        debug!(connection = %id, connections = self.connections.len(), "Registered");
        id
    }

    /// Look up a connection.
    #[must_use]
    pub fn lookup(&self, id: &ConnectionId) -> Option<&Connection> {
        self.connections.get(id)
    }

    /// Look up a connection for mutation.
    pub fn lookup_mut(&mut self, id: &ConnectionId) -> Option<&mut Connection> {
        self.connections.get_mut(id)
    }

    /// Remove a connection. Removing an unknown id is a no-op.
    pub fn remove(&mut self, id: &ConnectionId) -> Option<Connection> {
        let removed = self.connections.remove(id);
        if removed.is_some() {
            debug!(connection = %id, connections = self.connections.len(), "Removed");
        } else {
            trace!(connection = %id, "Remove of unknown connection ignored");
        }
        removed
    }

    /// Room the connection is in, if any.
    #[must_use]
    pub fn current_room(&self, id: &ConnectionId) -> Option<&RoomId> {
        self.connections.get(id).and_then(Connection::current_room)
    }

    /// Set the room a connection is in. Unknown connections are ignored.
    pub fn set_current_room(&mut self, id: &ConnectionId, room: Option<RoomId>) {
        if let Some(connection) = self.connections.get_mut(id) {
            connection.set_current_room(room);
        }
    }

    /// Number of live connections.
    #[must_use]
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    /// Check if there are no live connections.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Iterate over live connection ids.
    pub fn ids(&self) -> impl Iterator<Item = &ConnectionId> {
        self.connections.keys()
    }
}
