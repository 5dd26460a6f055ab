//! Connection handlers for the relay server.
//!
//! This module handles the connection lifecycle. Each WebSocket gets a
//! writer task fed by its outbox and a read loop that forwards frames to
//! the relay event loop.

use crate::config::Config;
use crate::metrics::{self, ConnectionMetricsGuard, MetricsObserver};
use crate::relay::RelayHandle;
use anyhow::Result;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        ConnectInfo, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use futures_util::{SinkExt, StreamExt};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use sync_core::{MessageRouter, Observers, TracingObserver};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Shared server state.
pub struct AppState {
    /// Handle to the relay event loop.
    pub relay: RelayHandle,
    /// Server configuration.
    pub config: Config,
    /// Open WebSocket connections.
    active: AtomicUsize,
}

impl AppState {
    /// Create new app state around a running relay loop.
    #[must_use]
    pub fn new(relay: RelayHandle, config: Config) -> Self {
        Self {
            relay,
            config,
            active: AtomicUsize::new(0),
        }
    }

    /// Reserve a connection slot, unless the limit is reached.
    fn try_acquire(self: &Arc<Self>) -> Option<ConnectionSlot> {
        let limit = self.config.limits.max_connections;
        self.active
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| (n < limit).then_some(n + 1))
            .ok()
            .map(|_| ConnectionSlot(Arc::clone(self)))
    }
}

/// A reserved connection slot, released on drop.
struct ConnectionSlot(Arc<AppState>);

impl Drop for ConnectionSlot {
    fn drop(&mut self) {
        self.0.active.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Build the relay's router with the standard observers.
#[must_use]
pub fn relay_router() -> MessageRouter {
    MessageRouter::with_observer(Box::new(
        Observers::new().with(TracingObserver).with(MetricsObserver),
    ))
}

/// Build the HTTP application.
pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(ws_handler))
        .route("/health", get(health_handler))
        .with_state(state)
}

/// Run the HTTP/WebSocket server until `shutdown` completes.
///
/// # Errors
///
/// Fails if the listen address is invalid or cannot be bound.
pub async fn run_server(
    config: Config,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    // Prometheus exporter, if enabled
    if config.metrics.enabled {
        if let Err(e) = metrics::start_metrics_server(config.metrics.port) {
            error!("Failed to start metrics server: {:#}", e);
        }
    }

    let addr = config.bind_addr()?;
    let listener = TcpListener::bind(addr).await?;

    info!("Relay listening on {}", addr);
    info!("WebSocket endpoint: ws://{}/", addr);

    serve(listener, config, shutdown).await
}

/// Serve the relay on an already bound listener.
///
/// # Errors
///
/// Returns an error if the server fails.
pub async fn serve(
    listener: TcpListener,
    config: Config,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let (relay, relay_task) = RelayHandle::spawn(relay_router());
    let state = Arc::new(AppState::new(relay, config));

    axum::serve(
        listener,
        app(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await?;

    relay_task.abort();
    info!("Relay stopped");
    Ok(())
}

/// `GET /health`: liveness plus room and connection counts.
async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let stats = state.relay.stats().await.unwrap_or_default();

    axum::Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "rooms": stats.room_count,
        "connections": stats.connection_count,
    }))
}

/// Accept a WebSocket upgrade on `/`, subject to the connection limit.
async fn ws_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    State(state): State<Arc<AppState>>,
) -> Response {
    let Some(slot) = state.try_acquire() else {
        warn!(%remote, "Connection limit reached, refusing upgrade");
        metrics::record_error("connection_limit");
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    };

    ws.max_message_size(state.config.limits.max_message_size)
        .on_upgrade(move |socket| handle_websocket(socket, state, remote, slot))
}

/// Pump one WebSocket until either side closes it.
async fn handle_websocket(
    socket: WebSocket,
    state: Arc<AppState>,
    remote: SocketAddr,
    _slot: ConnectionSlot,
) {
    // Held for the lifetime of the socket
    let _metrics_guard = ConnectionMetricsGuard::new();

    let (mut sender, mut receiver) = socket.split();
    let (outbox, mut outbound) = mpsc::unbounded_channel::<String>();

    let Some(connection_id) = state.relay.connect(outbox, Some(remote.to_string())).await else {
        error!(%remote, "Relay loop unavailable, dropping connection");
        return;
    };

    // The registry holds the outbox; this task is the only writer of the socket.
    let writer = tokio::spawn(async move {
        while let Some(frame) = outbound.recv().await {
            if sender.send(Message::Text(frame)).await.is_err() {
                break;
            }
        }
        let _ = sender.close().await;
    });

    while let Some(msg) = receiver.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                state.relay.frame(&connection_id, text);
            }
            Ok(Message::Binary(data)) => match String::from_utf8(data) {
                Ok(text) => state.relay.frame(&connection_id, text),
                Err(_) => {
                    warn!(connection = %connection_id, "Dropping non-UTF-8 binary frame");
                    metrics::record_error("decode");
                }
            },
            Ok(Message::Ping(_) | Message::Pong(_)) => {
                // Pings are answered by axum itself
            }
            Ok(Message::Close(_)) => {
                debug!(connection = %connection_id, "Received close frame");
                break;
            }
            Err(e) => {
                warn!(connection = %connection_id, error = %e, "WebSocket error");
                metrics::record_error("websocket");
                break;
            }
        }
    }

    // Removing the connection drops its outbox, which ends the writer.
    state.relay.disconnect(&connection_id);
    let _ = writer.await;

    debug!(connection = %connection_id, "WebSocket closed");
}
