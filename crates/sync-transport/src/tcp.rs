//! TCP transport for the game client's line protocol.
//!
//! The game exposes an unframed text console over TCP. Commands are written
//! as newline-terminated lines and responses arrive as arbitrary chunks.

use std::io::ErrorKind;
use std::time::Duration;
use tokio::net::TcpStream;
use tracing::debug;

use crate::traits::TransportError;

/// Default port of the game's console listener.
pub const DEFAULT_DEVICE_PORT: u16 = 2121;

/// Open a TCP connection to `host:port`.
///
/// # Errors
///
/// Returns [`TransportError::ConnectionRefused`] if nothing listens there,
/// [`TransportError::Timeout`] if the connect does not finish in time, or
/// [`TransportError::Io`] for any other socket failure.
pub async fn connect(host: &str, port: u16, timeout: Duration) -> Result<TcpStream, TransportError> {
    let addr = format!("{host}:{port}");

    let stream = match tokio::time::timeout(timeout, TcpStream::connect(addr.as_str())).await {
        Err(_) => return Err(TransportError::Timeout),
        Ok(Err(e)) if e.kind() == ErrorKind::ConnectionRefused => {
            return Err(TransportError::ConnectionRefused(addr))
        }
        Ok(Err(e)) => return Err(TransportError::Io(e)),
        Ok(Ok(stream)) => stream,
    };

    stream.set_nodelay(true)?;
    debug!(%addr, "Connected to device");

    Ok(stream)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn test_connect_and_exchange() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 10];
            socket.read_exact(&mut buf).await.unwrap();
            buf.to_vec()
        });

        let mut stream = connect("127.0.0.1", port, Duration::from_secs(2))
            .await
            .unwrap();
        stream.write_all(b"demo_goto\n").await.unwrap();

        assert_eq!(server.await.unwrap(), b"demo_goto\n");
    }

    #[tokio::test]
    async fn test_connect_refused() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let result = connect("127.0.0.1", port, Duration::from_secs(2)).await;
        assert!(matches!(result, Err(TransportError::ConnectionRefused(_))));
    }
}
