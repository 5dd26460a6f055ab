//! Codec for encoding and decoding relay messages.
//!
//! This module provides JSON serialization with one message per text frame.

use serde_json::Value;
use thiserror::Error;

use crate::message::{MessageKind, RelayMessage};

/// Maximum frame size (64 KiB).
pub const MAX_FRAME_SIZE: usize = 64 * 1024;

/// Protocol errors that can occur during encoding/decoding.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Frame exceeds maximum size.
    #[error("Frame size {0} exceeds maximum {MAX_FRAME_SIZE}")]
    FrameTooLarge(usize),

    /// Frame is not valid JSON.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Frame is valid JSON but carries no `type` discriminant.
    #[error("Missing message type")]
    MissingType,

    /// Frame has a known type but a payload that does not fit it.
    #[error("Malformed {kind} message: {source}")]
    Malformed {
        /// Kind named by the frame.
        kind: MessageKind,
        /// Underlying decode failure.
        source: serde_json::Error,
    },

    /// Frame is not valid UTF-8 text.
    #[error("Invalid frame: {0}")]
    Invalid(String),
}

/// Result of classifying an inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    /// A well-formed message of a known kind.
    Message(RelayMessage),
    /// A well-formed frame whose `type` is not part of the protocol.
    Unknown(String),
}

/// Encode a message to a text frame.
///
/// # Errors
///
/// Returns an error if the frame is too large or encoding fails.
pub fn encode(message: &RelayMessage) -> Result<String, ProtocolError> {
    let text = serde_json::to_string(message)?;

    if text.len() > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge(text.len()));
    }

    Ok(text)
}

/// Decode a message from a text frame.
///
/// Unknown kinds are reported as errors; use [`classify`] to tell them apart
/// from malformed frames.
///
/// # Errors
///
/// Returns an error if the frame is too large, not JSON, or not a message.
pub fn decode(text: &str) -> Result<RelayMessage, ProtocolError> {
    match classify(text)? {
        Decoded::Message(message) => Ok(message),
        Decoded::Unknown(kind) => Err(ProtocolError::Invalid(format!(
            "unknown message type '{kind}'"
        ))),
    }
}

/// Decode a message from raw frame bytes.
///
/// # Errors
///
/// Returns an error if the bytes are not UTF-8 or the frame cannot be decoded.
pub fn decode_slice(data: &[u8]) -> Result<RelayMessage, ProtocolError> {
    let text = std::str::from_utf8(data).map_err(|e| ProtocolError::Invalid(e.to_string()))?;
    decode(text)
}

/// Classify an inbound frame.
///
/// The `type` discriminant is looked up first, so a frame naming an unknown
/// kind is distinguishable from a frame whose payload is broken.
///
/// # Errors
///
/// Returns an error if the frame is too large, not a JSON object, has no
/// `type`, or has a payload that does not match its kind.
pub fn classify(text: &str) -> Result<Decoded, ProtocolError> {
    if text.len() > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge(text.len()));
    }

    let value: Value = serde_json::from_str(text)?;

    let name = value
        .get("type")
        .and_then(Value::as_str)
        .ok_or(ProtocolError::MissingType)?;

    let Some(kind) = MessageKind::from_wire(name) else {
        return Ok(Decoded::Unknown(name.to_string()));
    };

    serde_json::from_value(value)
        .map(Decoded::Message)
        .map_err(|source| ProtocolError::Malformed { kind, source })
}
