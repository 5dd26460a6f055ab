//! Message router for the relay.
//!
//! The router decodes inbound frames, dispatches them by kind to the room
//! manager, and writes the resulting deliveries to connection outboxes.
//! It is driven by a single task, so handlers never overlap.

use sync_protocol::{classify, encode, Decoded, MessageKind, ProtocolError, RelayMessage};
use sync_transport::{ConnectionId, Outbox};
use tracing::{debug, trace, warn};

use crate::manager::RoomManager;
use crate::message::Outgoing;
use crate::observer::{NoopObserver, RelayObserver};
use crate::registry::Registry;

/// What the router did with an inbound frame.
#[derive(Debug)]
pub enum RouteOutcome {
    /// The frame was a request and its handler ran.
    Dispatched(MessageKind),
    /// The frame named a kind the relay does not accept from peers.
    Ignored(String),
    /// The frame could not be decoded. No state was changed.
    Rejected(ProtocolError),
    /// The frame came from a connection the registry does not know.
    UnknownConnection,
}

/// The central message router.
///
/// Owns the connection registry and the room manager.
pub struct MessageRouter {
    /// Live connections.
    registry: Registry,
    /// Live rooms.
    rooms: RoomManager,
    /// Lifecycle observer.
    observer: Box<dyn RelayObserver>,
    /// Deliveries produced by the current handler.
    outgoing: Outgoing,
}

impl MessageRouter {
    /// Create a router that reports to no one.
    #[must_use]
    pub fn new() -> Self {
        Self::with_observer(Box::new(NoopObserver))
    }

    /// Create a router reporting lifecycle events to `observer`.
    #[must_use]
    pub fn with_observer(observer: Box<dyn RelayObserver>) -> Self {
        Self::with_parts(RoomManager::new(), observer)
    }

    /// Create a router around an existing room manager.
    #[must_use]
    pub fn with_parts(rooms: RoomManager, observer: Box<dyn RelayObserver>) -> Self {
        Self {
            registry: Registry::new(),
            rooms,
            observer,
            outgoing: Outgoing::new(),
        }
    }

    /// Get the connection registry.
    #[must_use]
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Get the room manager.
    #[must_use]
    pub fn rooms(&self) -> &RoomManager {
        &self.rooms
    }

    /// Get router statistics.
    #[must_use]
    pub fn stats(&self) -> RelayStats {
        let room_ids = self.rooms.room_ids();
        RelayStats {
            connection_count: self.registry.len(),
            room_count: room_ids.len(),
            member_count: room_ids
                .iter()
                .filter_map(|id| self.rooms.room(id))
                .map(|room| room.member_count())
                .sum(),
        }
    }

    /// Accept a new connection and greet it with `ready`.
    pub fn connect(&mut self, outbox: Box<dyn Outbox>, remote_addr: Option<String>) -> ConnectionId {
        let id = self.registry.register(outbox, remote_addr);

        let addr = self.registry.lookup(&id).and_then(|c| c.remote_addr());
        self.observer.on_connected(&id, addr);

        self.outgoing.push(id.clone(), RelayMessage::Ready);
        self.flush();

        id
    }

    /// Handle one inbound text frame from `id`.
    pub fn handle_frame(&mut self, id: &ConnectionId, frame: &str) -> RouteOutcome {
        if self.registry.lookup(id).is_none() {
            trace!(connection = %id, "Frame from unknown connection dropped");
            return RouteOutcome::UnknownConnection;
        }

        self.observer.on_received(id, frame);

        let message = match classify(frame) {
            Ok(Decoded::Message(message)) => message,
            Ok(Decoded::Unknown(kind)) => {
                debug!(connection = %id, kind = %kind, "Ignoring unknown message type");
                return RouteOutcome::Ignored(kind);
            }
            Err(e) => {
                self.observer.on_rejected(id, &e);
                return RouteOutcome::Rejected(e);
            }
        };

        let kind = message.kind();
        if !kind.is_client_to_server() {
            debug!(connection = %id, %kind, "Ignoring server-only message type");
            return RouteOutcome::Ignored(kind.as_str().to_string());
        }

        self.dispatch(id, message);
        self.flush();

        RouteOutcome::Dispatched(kind)
    }

    /// Drop a connection, leaving its room first.
    ///
    /// Returns `false` if the connection was already gone.
    pub fn disconnect(&mut self, id: &ConnectionId) -> bool {
        if self.registry.lookup(id).is_none() {
            return false;
        }

        self.rooms.leave_room(&mut self.registry, id, &mut self.outgoing);
        self.flush();

        self.registry.remove(id);
        self.observer.on_disconnected(id);
        true
    }

    fn dispatch(&mut self, id: &ConnectionId, message: RelayMessage) {
        let registry = &mut self.registry;
        let out = &mut self.outgoing;

        match message {
            RelayMessage::CreateRoom => {
                self.rooms.create_room(registry, id, out);
            }
            RelayMessage::JoinRoom { room_id } => {
                if let Err(e) = self.rooms.join_room(registry, id, &room_id, out) {
                    debug!(connection = %id, error = %e, "Join failed");
                }
            }
            RelayMessage::DestroyRoom { room_id } => {
                if let Err(e) = self.rooms.destroy_room(registry, id, &room_id, out) {
                    debug!(connection = %id, error = %e, "Destroy refused");
                }
            }
            RelayMessage::RoomDemoState { demo_status } => {
                if let Err(e) = self.rooms.update_demo_state(registry, id, demo_status, out) {
                    debug!(connection = %id, error = %e, "Demo state dropped");
                }
            }
            other => {
                trace!(connection = %id, kind = %other.kind(), "No handler");
            }
        }
    }

    /// Encode and deliver every queued message, in order.
    fn flush(&mut self) {
        for delivery in self.outgoing.drain() {
            let frame = match encode(&delivery.message) {
                Ok(frame) => frame,
                Err(e) => {
                    warn!(connection = %delivery.target, error = %e, "Failed to encode message");
                    continue;
                }
            };

            let Some(connection) = self.registry.lookup(&delivery.target) else {
                trace!(connection = %delivery.target, "Delivery to unknown connection dropped");
                continue;
            };

            match connection.deliver(frame.clone()) {
                Ok(()) => self.observer.on_sent(&delivery.target, &frame),
                Err(e) => {
                    debug!(connection = %delivery.target, error = %e, "Delivery failed");
                }
            }
        }
    }
}

impl Default for MessageRouter {
    fn default() -> Self {
        Self::new()
    }
}

/// Relay statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayStats {
    /// Number of live connections.
    pub connection_count: usize,
    /// Number of live rooms.
    pub room_count: usize,
    /// Total members across all rooms.
    pub member_count: usize,
}
