//! WebSocket transport implementation.
//!
//! This module provides the peer side of the relay link using
//! tokio-tungstenite. The stream is split so reading and writing can live
//! in different tasks.

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::{
    connect_async,
    tungstenite::{Error as WsError, Message},
    MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, error, warn};

use crate::traits::TransportError;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Connect to a relay at `ws://{host}:{port}/`.
///
/// # Errors
///
/// Returns an error if the TCP connection or the WebSocket handshake fails,
/// or if neither completes within `timeout`.
pub async fn connect(
    host: &str,
    port: u16,
    timeout: Duration,
) -> Result<(WebSocketSender, WebSocketReceiver), TransportError> {
    let url = format!("ws://{host}:{port}/");
    debug!(%url, "Connecting to relay");

    let (stream, _response) = tokio::time::timeout(timeout, connect_async(url.as_str()))
        .await
        .map_err(|_| TransportError::Timeout)?
        .map_err(|e| match e {
            WsError::Io(io) if io.kind() == std::io::ErrorKind::ConnectionRefused => {
                TransportError::ConnectionRefused(url.clone())
            }
            other => TransportError::Other(format!("WebSocket handshake failed: {other}")),
        })?;

    debug!(%url, "WebSocket handshake completed");

    let (sink, stream) = stream.split();
    Ok((WebSocketSender { sink }, WebSocketReceiver { stream }))
}

/// Write half of a relay link.
pub struct WebSocketSender {
    sink: SplitSink<WsStream, Message>,
}

impl WebSocketSender {
    /// Send a text frame.
    ///
    /// # Errors
    ///
    /// Returns an error if the link is broken.
    pub async fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        self.sink
            .send(Message::Text(text))
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))
    }

    /// Close the link gracefully.
    ///
    /// # Errors
    ///
    /// Returns an error if the close frame cannot be sent.
    pub async fn close(&mut self) -> Result<(), TransportError> {
        match self.sink.close().await {
            Ok(()) | Err(WsError::ConnectionClosed | WsError::AlreadyClosed) => Ok(()),
            Err(e) => Err(TransportError::Other(format!("Failed to close: {e}"))),
        }
    }
}

/// Read half of a relay link.
pub struct WebSocketReceiver {
    stream: SplitStream<WsStream>,
}

impl WebSocketReceiver {
    /// Receive the next text frame.
    ///
    /// Returns `None` if the link is closed cleanly. Binary frames are
    /// accepted if they hold UTF-8 text.
    ///
    /// # Errors
    ///
    /// Returns an error if the link fails.
    pub async fn recv(&mut self) -> Result<Option<String>, TransportError> {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => return Ok(Some(text)),
                Some(Ok(Message::Binary(data))) => match String::from_utf8(data) {
                    Ok(text) => return Ok(Some(text)),
                    Err(e) => warn!("Dropping non-UTF-8 binary frame: {}", e),
                },
                Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_))) => {
                    // Pongs are queued by tungstenite itself
                }
                Some(Ok(Message::Close(_))) => {
                    debug!("Received close frame");
                    return Ok(None);
                }
                Some(Err(WsError::ConnectionClosed | WsError::AlreadyClosed)) => {
                    debug!("Connection closed");
                    return Ok(None);
                }
                Some(Err(e)) => {
                    error!("WebSocket error: {}", e);
                    return Err(TransportError::ReceiveFailed(e.to_string()));
                }
                None => {
                    debug!("WebSocket stream ended");
                    return Ok(None);
                }
            }
        }
    }
}
