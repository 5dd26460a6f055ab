//! Client error types.

use sync_protocol::ProtocolError;
use sync_transport::TransportError;
use thiserror::Error;

/// Errors surfaced by the device and relay clients.
#[derive(Debug, Error)]
pub enum ClientError {
    /// No socket is open.
    #[error("Not connected yet.")]
    NotConnected,

    /// Nothing accepted the connection.
    #[error("Connection refused: {0}")]
    ConnectionRefused(String),

    /// No matching response arrived before the deadline.
    #[error("Timed out waiting for a response")]
    Timeout,

    /// The socket failed.
    #[error("Transport error: {0}")]
    Transport(TransportError),

    /// A relay frame could not be encoded or decoded.
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// A response matched but its contents could not be parsed.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// A response pattern failed to compile.
    #[error("Invalid pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    /// Client configuration could not be loaded.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<TransportError> for ClientError {
    fn from(e: TransportError) -> Self {
        match e {
            TransportError::ConnectionRefused(addr) => ClientError::ConnectionRefused(addr),
            TransportError::Timeout => ClientError::Timeout,
            TransportError::ConnectionClosed => ClientError::NotConnected,
            TransportError::Protocol(e) => ClientError::Protocol(e),
            other => ClientError::Transport(other),
        }
    }
}

impl ClientError {
    /// Whether this error means the response deadline passed.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, ClientError::Timeout)
    }
}
