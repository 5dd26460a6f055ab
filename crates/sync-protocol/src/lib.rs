//! # sync-protocol
//!
//! Wire protocol definitions for the demo-sync relay.
//!
//! Peers talk to the relay with JSON text frames, one message per frame.
//! Every frame is an object carrying a `type` discriminant plus a
//! type-specific payload.
//!
//! ## Message Kinds
//!
//! - `create_room` / `join_room` / `destroy_room` - Room lifecycle requests
//! - `room_demo_state` - Playback position relayed between room members
//! - `ready` / `room_created` / `room_joined` / `room_failed_to_join` /
//!   `left_room` - Server notifications
//!
//! ## Example
//!
//! ```rust
//! use sync_protocol::{codec, RelayMessage};
//!
//! let message = RelayMessage::join_room("aB3xZ");
//!
//! let text = codec::encode(&message).unwrap();
//! assert_eq!(text, r#"{"type":"join_room","roomId":"aB3xZ"}"#);
//! assert_eq!(codec::decode(&text).unwrap(), message);
//! ```

pub mod codec;
pub mod message;

pub use codec::{classify, decode, encode, Decoded, ProtocolError};
pub use message::{DemoStatus, MessageKind, RelayMessage};
