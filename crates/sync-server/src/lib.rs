//! # Sync Server
//!
//! Room relay for demo-sync. Clients connect over WebSocket, create or join
//! rooms, and the relay forwards demo state from each room's creator to its
//! members.
//!
//! The binary in `main.rs` wires these modules together; they are exposed
//! as a library so the relay can be embedded and driven from tests.

pub mod config;
pub mod handlers;
pub mod metrics;
pub mod relay;

pub use config::Config;
pub use handlers::{run_server, serve};
pub use relay::RelayHandle;
