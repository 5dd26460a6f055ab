//! Relay settings.
//!
//! Settings are layered, later layers winning:
//! 1. built-in defaults
//! 2. the first `sync-server.toml` found on the search path
//! 3. `SYNC_HOST` / `SYNC_PORT` from the environment
//! 4. the first command line argument (port only)

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// Port the relay listens on unless told otherwise.
pub const DEFAULT_PORT: u16 = 3113;

/// Places searched for a settings file, in order.
const SEARCH_PATH: [&str; 3] = [
    "sync-server.toml",
    "/etc/demo-sync/sync-server.toml",
    "~/.config/demo-sync/sync-server.toml",
];

/// Relay settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Address to listen on.
    pub host: String,
    /// TCP port to listen on.
    pub port: u16,
    /// Per-process caps.
    pub limits: LimitsConfig,
    /// Prometheus exporter.
    pub metrics: MetricsConfig,
}

/// Per-process caps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Open WebSockets beyond this are refused with 503.
    pub max_connections: usize,
    /// Largest inbound WebSocket message, in bytes.
    pub max_message_size: usize,
}

/// Prometheus exporter settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Install the exporter at startup.
    pub enabled: bool,
    /// Port of the exporter's own HTTP listener.
    pub port: u16,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            limits: LimitsConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_connections: 10_000,
            max_message_size: sync_protocol::codec::MAX_FRAME_SIZE,
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: 9090,
        }
    }
}

impl Config {
    /// Build the settings from the search path and the environment.
    ///
    /// # Errors
    ///
    /// Fails if a settings file is found but cannot be read or parsed.
    pub fn load() -> Result<Self> {
        let mut config = match find_config_file() {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|name| std::env::var(name).ok());
        Ok(config)
    }

    /// Parse a settings file. Missing keys keep their defaults.
    ///
    /// # Errors
    ///
    /// Fails if the file cannot be read or is not valid TOML.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Cannot read {}", path.display()))?;
        toml::from_str(&text).with_context(|| format!("Invalid settings in {}", path.display()))
    }

    /// Apply `SYNC_HOST` and `SYNC_PORT` as returned by `lookup`.
    ///
    /// A `SYNC_PORT` that is not a port number is ignored.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(host) = lookup("SYNC_HOST") {
            self.host = host;
        }
        if let Some(port) = lookup("SYNC_PORT").and_then(|p| p.trim().parse().ok()) {
            self.port = port;
        }
    }

    /// Apply the positional port argument, if one was given.
    ///
    /// An argument that is not a port number selects [`DEFAULT_PORT`].
    pub fn apply_port_arg(&mut self, arg: Option<&str>) {
        if let Some(arg) = arg {
            self.port = arg.trim().parse().unwrap_or(DEFAULT_PORT);
        }
    }

    /// Socket address to listen on.
    ///
    /// # Errors
    ///
    /// Fails if `host` is not an IP address.
    pub fn bind_addr(&self) -> Result<SocketAddr> {
        let addr = format!("{}:{}", self.host, self.port);
        addr.parse()
            .with_context(|| format!("Invalid listen address {addr}"))
    }
}

fn find_config_file() -> Option<PathBuf> {
    SEARCH_PATH
        .iter()
        .map(|path| PathBuf::from(shellexpand::tilde(path).as_ref()))
        .find(|path| path.exists())
}
