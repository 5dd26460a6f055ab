//! # Sync Server
//!
//! Room relay for demo-sync.
//!
//! ## Usage
//!
//! ```bash
//! # Run with default settings (port 3113)
//! sync-server
//!
//! # Listen on another port
//! sync-server 4000
//!
//! # Run with environment variables
//! SYNC_PORT=8080 SYNC_HOST=127.0.0.1 sync-server
//! ```

use anyhow::Result;
use sync_server::{config::Config, handlers, metrics};
use tracing::Level;
use tracing_subscriber::{fmt::writer::MakeWriterExt, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Warnings and errors go to stderr, everything else to stdout
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sync_server=info,sync_core=info".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr.with_max_level(Level::WARN).or_else(std::io::stdout)),
        )
        .init();

    // Load configuration
    let mut config = Config::load()?;
    config.apply_port_arg(std::env::args().nth(1).as_deref());

    tracing::info!("Starting relay on {}:{}", config.host, config.port);

    // Initialize metrics
    metrics::init_metrics();

    // Start the server
    handlers::run_server(config, shutdown_signal()).await?;

    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Shutdown signal received"),
        Err(e) => {
            tracing::error!("Failed to listen for shutdown signal: {}", e);
            std::future::pending::<()>().await;
        }
    }
}
