//! Client for the game's line-oriented console.
//!
//! The device client owns at most one correlated TCP socket. It can be
//! polled repeatedly: [`DeviceClient::ensure_connected`] is a no-op while a
//! socket is open or a connect is already under way.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use sync_protocol::DemoStatus;
use sync_transport::tcp;
use tracing::{debug, info, warn};

use crate::config::ClientConfig;
use crate::correlator::{Correlator, CorrelatorConfig};
use crate::demo::poll_demo_status;
use crate::error::ClientError;
use crate::matcher::{MatchResult, ResponsePattern};

enum Link {
    Disconnected,
    Connecting,
    Connected(Correlator),
}

/// Resets a link left in `Connecting` when a dial is dropped before it
/// finishes.
struct DialGuard<'a>(&'a Mutex<Link>);

impl Drop for DialGuard<'_> {
    fn drop(&mut self) {
        let mut link = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        if matches!(&*link, Link::Connecting) {
            *link = Link::Disconnected;
        }
    }
}

/// Client for the game's console.
pub struct DeviceClient {
    host: String,
    port: u16,
    connect_timeout: Duration,
    response_timeout: Duration,
    correlator: CorrelatorConfig,
    link: Mutex<Link>,
}

impl DeviceClient {
    /// Create a client for `host:port` with default timeouts.
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        let defaults = ClientConfig::default();
        Self {
            host: host.into(),
            port,
            connect_timeout: defaults.connect_timeout(),
            response_timeout: defaults.response_timeout(),
            correlator: defaults.correlator(),
            link: Mutex::new(Link::Disconnected),
        }
    }

    /// Create a client from configuration.
    #[must_use]
    pub fn from_config(config: &ClientConfig) -> Self {
        Self {
            host: config.device_host.clone(),
            port: config.device_port,
            connect_timeout: config.connect_timeout(),
            response_timeout: config.response_timeout(),
            correlator: config.correlator(),
            link: Mutex::new(Link::Disconnected),
        }
    }

    /// Address this client connects to.
    #[must_use]
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    fn link(&self) -> MutexGuard<'_, Link> {
        self.link.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Check if a socket is open.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        matches!(&*self.link(), Link::Connected(correlator) if correlator.is_open())
    }

    /// Connect, replacing any previous socket.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::ConnectionRefused`] if the game is not
    /// listening, or another error if the connect fails.
    pub async fn connect(&self) -> Result<(), ClientError> {
        let previous = std::mem::replace(&mut *self.link(), Link::Connecting);
        if let Link::Connected(old) = previous {
            debug!(addr = %self.addr(), "Replacing device socket");
            old.close();
        }

        self.dial().await
    }

    /// Connect unless a socket is open or a connect is in flight.
    ///
    /// Returns `true` if this call opened the socket.
    ///
    /// # Errors
    ///
    /// Returns an error if a new connect was attempted and failed.
    pub async fn ensure_connected(&self) -> Result<bool, ClientError> {
        {
            let mut link = self.link();
            let busy = match &*link {
                Link::Connected(correlator) => correlator.is_open(),
                Link::Connecting => true,
                Link::Disconnected => false,
            };
            if busy {
                return Ok(false);
            }
            *link = Link::Connecting;
        }

        self.dial().await.map(|()| true)
    }

    async fn dial(&self) -> Result<(), ClientError> {
        let _reset = DialGuard(&self.link);

        match tcp::connect(&self.host, self.port, self.connect_timeout).await {
            Ok(stream) => {
                let correlator = Correlator::spawn(stream, self.correlator);
                *self.link() = Link::Connected(correlator);
                info!(addr = %self.addr(), "Connected to game console");
                Ok(())
            }
            Err(e) => {
                *self.link() = Link::Disconnected;
                debug!(addr = %self.addr(), error = %e, "Game console connect failed");
                Err(e.into())
            }
        }
    }

    /// Close the socket, failing any pending responses.
    pub fn disconnect(&self) {
        if let Link::Connected(correlator) = std::mem::replace(&mut *self.link(), Link::Disconnected) {
            correlator.close();
            info!(addr = %self.addr(), "Disconnected from game console");
        }
    }

    fn correlator(&self) -> Result<Correlator, ClientError> {
        match &*self.link() {
            Link::Connected(correlator) if correlator.is_open() => Ok(correlator.clone()),
            _ => Err(ClientError::NotConnected),
        }
    }

    /// Send a command and wait for a matching response.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::NotConnected`] at once if no socket is open,
    /// or [`ClientError::Timeout`] if nothing matched in time.
    pub async fn send(
        &self,
        command: &str,
        pattern: impl Into<ResponsePattern>,
        timeout: Duration,
    ) -> Result<MatchResult, ClientError> {
        let correlator = self.correlator()?;
        correlator.send(command, pattern, timeout).await
    }

    /// Ask the game for its playback position.
    ///
    /// A game that does not answer in time is reported as idle.
    ///
    /// # Errors
    ///
    /// Returns an error if no socket is open, the socket fails, or the reply
    /// cannot be parsed.
    pub async fn demo_tick_info(&self) -> Result<DemoStatus, ClientError> {
        let correlator = self.correlator()?;
        let result = poll_demo_status(&correlator, self.response_timeout).await;

        if let Err(ClientError::NotConnected) = result {
            warn!(addr = %self.addr(), "Game console closed while polling");
        }
        result
    }
}

impl std::fmt::Debug for DeviceClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceClient")
            .field("addr", &self.addr())
            .field("connected", &self.is_connected())
            .finish_non_exhaustive()
    }
}
