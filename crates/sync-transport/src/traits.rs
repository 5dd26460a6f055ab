//! Transport abstraction traits for demo-sync.
//!
//! These types define how connections are identified and written to,
//! allowing the relay to be transport-agnostic.

use std::fmt;
use thiserror::Error;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Identifier the relay assigns to a peer connection.
///
/// Relay ids are random UUIDs; they are echoed to other peers in
/// `left_room` notices.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub String);

impl ConnectionId {
    /// Wrap an existing identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Draw a fresh random identifier.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Borrow the identifier text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ConnectionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ConnectionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The peer went away.
    #[error("Connection is closed")]
    ConnectionClosed,

    /// Remote end refused the connection.
    #[error("Connection refused: {0}")]
    ConnectionRefused(String),

    /// Connecting took longer than allowed.
    #[error("Timed out while connecting")]
    Timeout,

    /// Writing to the link failed.
    #[error("Write failed: {0}")]
    SendFailed(String),

    /// Reading from the link failed.
    #[error("Read failed: {0}")]
    ReceiveFailed(String),

    /// A frame could not be encoded or decoded.
    #[error("Bad frame: {0}")]
    Protocol(#[from] sync_protocol::ProtocolError),

    /// Socket-level failure.
    #[error("Socket error: {0}")]
    Io(#[from] std::io::Error),

    /// Other error.
    #[error("{0}")]
    Other(String),
}

/// Write handle for one connection.
///
/// A connection's outbox is its only writer: frames delivered here are
/// forwarded to the socket by a task owned by that connection.
pub trait Outbox: Send {
    /// Queue a text frame for delivery.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::ConnectionClosed`] if the connection is gone.
    fn deliver(&self, frame: String) -> Result<(), TransportError>;

    /// Check if the connection can still accept frames.
    fn is_open(&self) -> bool;
}

impl Outbox for mpsc::UnboundedSender<String> {
    fn deliver(&self, frame: String) -> Result<(), TransportError> {
        self.send(frame).map_err(|_| TransportError::ConnectionClosed)
    }

    fn is_open(&self) -> bool {
        !self.is_closed()
    }
}
