//! Outbound message types for the relay.
//!
//! Room handlers never write to sockets. They queue deliveries, and the
//! message router encodes and sends them afterwards.

use sync_protocol::RelayMessage;
use sync_transport::ConnectionId;

/// A message addressed to one connection.
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    /// Target connection ID.
    pub target: ConnectionId,
    /// The message to deliver.
    pub message: RelayMessage,
}

impl Delivery {
    /// Create a new delivery.
    #[must_use]
    pub fn new(target: ConnectionId, message: RelayMessage) -> Self {
        Self { target, message }
    }
}

/// Ordered queue of deliveries produced while handling one request.
#[derive(Debug, Default)]
pub struct Outgoing {
    deliveries: Vec<Delivery>,
}

impl Outgoing {
    /// Create an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a message for one connection.
    pub fn push(&mut self, target: ConnectionId, message: RelayMessage) {
        self.deliveries.push(Delivery::new(target, message));
    }

    /// Queue the same message for several connections, in order.
    pub fn push_all(&mut self, targets: impl IntoIterator<Item = ConnectionId>, message: &RelayMessage) {
        for target in targets {
            self.push(target, message.clone());
        }
    }

    /// Number of queued deliveries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.deliveries.len()
    }

    /// Check if nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.deliveries.is_empty()
    }

    /// Take all queued deliveries, leaving the queue empty.
    pub fn drain(&mut self) -> std::vec::Drain<'_, Delivery> {
        self.deliveries.drain(..)
    }

    /// Queued deliveries, in order.
    #[must_use]
    pub fn deliveries(&self) -> &[Delivery] {
        &self.deliveries
    }
}
