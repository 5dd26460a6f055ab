//! # sync-core
//!
//! Connection registry, rooms and message routing for the demo-sync relay.
//!
//! This crate provides the relay's building blocks:
//!
//! - **Registry** - Identity/lookup table of live connections
//! - **Room** - Ephemeral group of connections owned by its creator
//! - **RoomManager** - Room lifecycle and authorization rules
//! - **MessageRouter** - Decodes frames and dispatches them by kind
//! - **RelayObserver** - Typed lifecycle callbacks for logging and metrics
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌───────────────┐     ┌─────────────┐
//! │  Connection │────▶│ MessageRouter │────▶│ RoomManager │
//! └─────────────┘     └───────────────┘     └─────────────┘
//!        ▲                    │                    │
//!        │                    ▼                    ▼
//!        │             ┌─────────────┐      ┌─────────────┐
//!        └─────────────│  Registry   │◀─────│  Outgoing   │
//!          (outbox)    └─────────────┘      └─────────────┘
//! ```
//!
//! The room manager only queues deliveries. The router writes them through
//! each connection's own outbox, so a socket has exactly one writer.
//!
//! ```rust
//! use sync_core::MessageRouter;
//! use tokio::sync::mpsc;
//!
//! let mut router = MessageRouter::new();
//! let (tx, mut rx) = mpsc::unbounded_channel::<String>();
//! let id = router.connect(Box::new(tx), None);
//! assert_eq!(rx.try_recv().unwrap(), r#"{"type":"ready"}"#);
//!
//! router.handle_frame(&id, r#"{"type":"create_room"}"#);
//! assert!(rx.try_recv().unwrap().starts_with(r#"{"type":"room_created""#));
//! ```

pub mod manager;
pub mod message;
pub mod observer;
pub mod registry;
pub mod room;
pub mod router;

pub use manager::{JoinOutcome, RoomError, RoomManager};
pub use message::{Delivery, Outgoing};
pub use observer::{NoopObserver, Observers, RelayObserver, TracingObserver};
pub use registry::{Connection, Registry};
pub use room::{RandomRoomIds, Room, RoomId, RoomIdSource};
pub use router::{MessageRouter, RelayStats, RouteOutcome};
