//! Client for the relay server.
//!
//! The relay client keeps one WebSocket link to the relay. Inbound frames
//! are decoded and published on a broadcast channel together with link
//! state changes, so any number of consumers can follow the session.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use sync_protocol::{classify, encode, Decoded, RelayMessage};
use sync_transport::websocket::{self, WebSocketReceiver, WebSocketSender};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::config::ClientConfig;
use crate::error::ClientError;

/// Capacity of the event channel.
const EVENT_CAPACITY: usize = 256;

/// Something that happened on the relay link.
#[derive(Debug, Clone, PartialEq)]
pub enum RelayEvent {
    /// The link came up.
    Connected,
    /// The link went down.
    Disconnected,
    /// A message arrived from the relay.
    Message(RelayMessage),
}

enum Link {
    Disconnected,
    Connecting,
    Connected {
        generation: u64,
        outbound: mpsc::UnboundedSender<String>,
        reader: JoinHandle<()>,
    },
}

struct Shared {
    link: Mutex<Link>,
    generation: Mutex<u64>,
    events: broadcast::Sender<RelayEvent>,
}

impl Shared {
    fn link(&self) -> MutexGuard<'_, Link> {
        self.link.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn next_generation(&self) -> u64 {
        let mut generation = self.generation.lock().unwrap_or_else(PoisonError::into_inner);
        *generation += 1;
        *generation
    }

    fn publish(&self, event: RelayEvent) {
        // No subscribers is not an error.
        let _ = self.events.send(event);
    }

    /// Mark the link down if it is still the one identified by `generation`.
    fn link_lost(&self, generation: u64) {
        let mut link = self.link();
        if matches!(&*link, Link::Connected { generation: current, .. } if *current == generation) {
            *link = Link::Disconnected;
            drop(link);
            info!("Relay link lost");
            self.publish(RelayEvent::Disconnected);
        }
    }
}

/// Resets a link left in `Connecting` when a dial is dropped before it
/// finishes.
struct DialGuard<'a>(&'a Shared);

impl Drop for DialGuard<'_> {
    fn drop(&mut self) {
        let mut link = self.0.link();
        if matches!(&*link, Link::Connecting) {
            *link = Link::Disconnected;
        }
    }
}

/// Client for the relay server.
#[derive(Clone)]
pub struct RelayClient {
    host: String,
    port: u16,
    connect_timeout: Duration,
    shared: Arc<Shared>,
}

impl RelayClient {
    /// Create a client for the relay at `host:port`.
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self::with_timeout(host, port, ClientConfig::default().connect_timeout())
    }

    /// Create a client from configuration.
    #[must_use]
    pub fn from_config(config: &ClientConfig) -> Self {
        Self::with_timeout(config.relay_host.clone(), config.relay_port, config.connect_timeout())
    }

    fn with_timeout(host: impl Into<String>, port: u16, connect_timeout: Duration) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            host: host.into(),
            port,
            connect_timeout,
            shared: Arc::new(Shared {
                link: Mutex::new(Link::Disconnected),
                generation: Mutex::new(0),
                events,
            }),
        }
    }

    /// Subscribe to link events and inbound messages.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<RelayEvent> {
        self.shared.events.subscribe()
    }

    /// Check if the link is up.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        matches!(
            &*self.shared.link(),
            Link::Connected { outbound, .. } if !outbound.is_closed()
        )
    }

    /// Connect, replacing any previous link.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::ConnectionRefused`] if the relay is not
    /// listening, or another error if the handshake fails.
    pub async fn connect(&self) -> Result<(), ClientError> {
        {
            let mut link = self.shared.link();
            if let Link::Connected { reader, .. } = std::mem::replace(&mut *link, Link::Connecting) {
                debug!("Replacing relay link");
                reader.abort();
                self.shared.publish(RelayEvent::Disconnected);
            }
        }

        self.dial().await
    }

    /// Connect unless the link is up or a connect is in flight.
    ///
    /// Returns `true` if this call brought the link up.
    ///
    /// # Errors
    ///
    /// Returns an error if a new connect was attempted and failed.
    pub async fn ensure_connected(&self) -> Result<bool, ClientError> {
        {
            let mut link = self.shared.link();
            let busy = match &*link {
                Link::Connected { outbound, .. } => !outbound.is_closed(),
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
        let _reset = DialGuard(&self.shared);

        let (sender, receiver) =
            match websocket::connect(&self.host, self.port, self.connect_timeout).await {
                Ok(halves) => halves,
                Err(e) => {
                    *self.shared.link() = Link::Disconnected;
                    debug!(host = %self.host, port = self.port, error = %e, "Relay connect failed");
                    return Err(e.into());
                }
            };

        let generation = self.shared.next_generation();
        let (outbound, rx) = mpsc::unbounded_channel();

        tokio::spawn(write_loop(sender, rx));

        // The reader reports a lost link through the same lock, so it cannot
        // observe the link before it is recorded here.
        let mut link = self.shared.link();
        let reader = tokio::spawn(read_loop(receiver, Arc::clone(&self.shared), generation));
        *link = Link::Connected {
            generation,
            outbound,
            reader,
        };
        self.shared.publish(RelayEvent::Connected);
        drop(link);

        info!(host = %self.host, port = self.port, "Connected to relay");
        Ok(())
    }

    /// Close the link.
    pub fn disconnect(&self) {
        let previous = std::mem::replace(&mut *self.shared.link(), Link::Disconnected);
        if let Link::Connected { reader, .. } = previous {
            // Dropping the outbound sender ends the writer, which closes the
            // socket.
            reader.abort();
            info!("Disconnected from relay");
            self.shared.publish(RelayEvent::Disconnected);
        }
    }

    /// Send a message to the relay.
    ///
    /// Messages sent while the link is down are dropped; the return value
    /// tells whether the message was queued.
    ///
    /// # Errors
    ///
    /// Returns an error if the message cannot be encoded.
    pub fn send(&self, message: &RelayMessage) -> Result<bool, ClientError> {
        let frame = encode(message)?;

        let link = self.shared.link();
        let Link::Connected { outbound, .. } = &*link else {
            trace!(kind = %message.kind(), "Relay not connected, message dropped");
            return Ok(false);
        };

        Ok(outbound.send(frame).is_ok())
    }
}

impl std::fmt::Debug for RelayClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayClient")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("connected", &self.is_connected())
            .finish_non_exhaustive()
    }
}

async fn write_loop(mut sender: WebSocketSender, mut rx: mpsc::UnboundedReceiver<String>) {
    while let Some(frame) = rx.recv().await {
        if let Err(e) = sender.send_text(frame).await {
            warn!(error = %e, "Relay write failed");
            return;
        }
    }
    let _ = sender.close().await;
}

async fn read_loop(mut receiver: WebSocketReceiver, shared: Arc<Shared>, generation: u64) {
    loop {
        match receiver.recv().await {
            Ok(Some(frame)) => match classify(&frame) {
                Ok(Decoded::Message(message)) => shared.publish(RelayEvent::Message(message)),
                Ok(Decoded::Unknown(kind)) => debug!(%kind, "Ignoring unknown relay message"),
                Err(e) => warn!(error = %e, "Dropping malformed relay frame"),
            },
            Ok(None) => break,
            Err(e) => {
                warn!(error = %e, "Relay read failed");
                break;
            }
        }
    }

    shared.link_lost(generation);
}
