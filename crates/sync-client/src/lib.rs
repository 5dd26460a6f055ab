//! # sync-client
//!
//! Clients for demo-sync peers.
//!
//! - **Correlator** - Request/response over an unframed text socket
//! - **DeviceClient** - Drives the game's console and polls playback
//! - **RelayClient** - WebSocket link to the relay server
//!
//! ## Response Correlation
//!
//! The game's console has no framing: a command's reply shows up somewhere
//! in the following chunks. A [`Correlator`] pairs each command with a
//! pattern and a timeout, and settles it on whichever comes first.
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use sync_client::{DeviceClient, ResponsePattern};
//!
//! # async fn example() -> Result<(), sync_client::ClientError> {
//! let device = DeviceClient::new("127.0.0.1", 2121);
//! device.ensure_connected().await?;
//!
//! let reply = device
//!     .send("version", ResponsePattern::regex(r"Exe version (\S+)")?, Duration::from_secs(1))
//!     .await?;
//! println!("game version {:?}", reply.group(1));
//!
//! let status = device.demo_tick_info().await?;
//! println!("playing: {}", status.currently_playing);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod correlator;
pub mod demo;
pub mod device;
pub mod error;
pub mod matcher;
pub mod relay;

pub use config::ClientConfig;
pub use correlator::{Correlator, CorrelatorConfig};
pub use device::DeviceClient;
pub use error::ClientError;
pub use matcher::{MatchMode, MatchResult, ResponsePattern};
pub use relay::{RelayClient, RelayEvent};
