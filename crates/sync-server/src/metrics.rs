//! Relay counters and gauges.
//!
//! Recorded through the `metrics` facade; the Prometheus exporter is only
//! installed when enabled in the settings, otherwise every call is a no-op.

use anyhow::{Context, Result};
use metrics::{counter, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use sync_core::RelayObserver;
use sync_protocol::ProtocolError;
use sync_transport::ConnectionId;
use tracing::{debug, info};

/// Metric names.
pub mod names {
    pub const CONNECTIONS_TOTAL: &str = "sync_connections_total";
    pub const CONNECTIONS_ACTIVE: &str = "sync_connections_active";
    pub const MESSAGES_TOTAL: &str = "sync_messages_total";
    pub const MESSAGES_BYTES: &str = "sync_messages_bytes";
    pub const ROOMS_ACTIVE: &str = "sync_rooms_active";
    pub const ERRORS_TOTAL: &str = "sync_errors_total";
}

/// Register descriptions for every relay metric.
pub fn init_metrics() {
    metrics::describe_counter!(
        names::CONNECTIONS_TOTAL,
        "WebSocket connections accepted since start"
    );
    metrics::describe_gauge!(
        names::CONNECTIONS_ACTIVE,
        "WebSocket connections currently open"
    );
    metrics::describe_counter!(names::MESSAGES_TOTAL, "Relay frames received and sent");
    metrics::describe_counter!(names::MESSAGES_BYTES, "Relay frame bytes received and sent");
    metrics::describe_gauge!(names::ROOMS_ACTIVE, "Current number of live rooms");
    metrics::describe_counter!(names::ERRORS_TOTAL, "Dropped frames and failed sockets");

    debug!("Relay metrics described");
}

/// Install the Prometheus exporter with its own HTTP listener.
///
/// # Errors
///
/// Returns an error if the exporter cannot be installed.
pub fn start_metrics_server(port: u16) -> Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .context("Failed to install Prometheus exporter")?;

    info!("Prometheus exporter listening on {}", addr);
    Ok(())
}

/// Count an accepted connection.
pub fn record_connection() {
    counter!(names::CONNECTIONS_TOTAL).increment(1);
    gauge!(names::CONNECTIONS_ACTIVE).increment(1.0);
}

/// Count a closed connection.
pub fn record_disconnection() {
    gauge!(names::CONNECTIONS_ACTIVE).decrement(1.0);
}

/// Count one frame in `direction` (`inbound` or `outbound`).
pub fn record_message(bytes: usize, direction: &'static str) {
    counter!(names::MESSAGES_TOTAL, "direction" => direction).increment(1);
    counter!(names::MESSAGES_BYTES, "direction" => direction).increment(bytes as u64);
}

/// Update the live room count.
pub fn set_active_rooms(count: usize) {
    gauge!(names::ROOMS_ACTIVE).set(count as f64);
}

/// Count an error of the given kind.
pub fn record_error(error_type: &'static str) {
    counter!(names::ERRORS_TOTAL, "type" => error_type).increment(1);
}

/// Holds a connection in the active gauge until dropped.
pub struct ConnectionMetricsGuard;

impl ConnectionMetricsGuard {
    /// Count a connection as open.
    #[must_use]
    pub fn new() -> Self {
        record_connection();
        Self
    }
}

impl Default for ConnectionMetricsGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ConnectionMetricsGuard {
    fn drop(&mut self) {
        record_disconnection();
    }
}

/// Relay observer that feeds message counters.
#[derive(Debug, Default, Clone, Copy)]
pub struct MetricsObserver;

impl RelayObserver for MetricsObserver {
    fn on_received(&mut self, _id: &ConnectionId, frame: &str) {
        record_message(frame.len(), "inbound");
    }

    fn on_sent(&mut self, _id: &ConnectionId, frame: &str) {
        record_message(frame.len(), "outbound");
    }

    fn on_rejected(&mut self, _id: &ConnectionId, _error: &ProtocolError) {
        record_error("decode");
    }
}
