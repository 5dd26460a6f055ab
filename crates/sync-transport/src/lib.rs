//! # sync-transport
//!
//! Transport layer for demo-sync.
//!
//! This crate owns the byte-moving side of the system:
//!
//! - **Outbox** - The write handle a relay connection is addressed through
//! - **WebSocket** - Client link from a peer to the relay
//! - **TCP** - Line-oriented link to the local game client
//!
//! ## Outbox Abstraction
//!
//! The relay never touches sockets directly. Each connection is reached
//! through an [`Outbox`], so room logic can be exercised without a network.
//!
//! ```rust
//! use sync_transport::Outbox;
//! use tokio::sync::mpsc;
//!
//! let (tx, mut rx) = mpsc::unbounded_channel::<String>();
//! tx.deliver(r#"{"type":"ready"}"#.to_string()).unwrap();
//! assert_eq!(rx.try_recv().unwrap(), r#"{"type":"ready"}"#);
//! ```

pub mod tcp;
pub mod traits;
pub mod websocket;

pub use traits::{ConnectionId, Outbox, TransportError};
pub use websocket::{WebSocketReceiver, WebSocketSender};
