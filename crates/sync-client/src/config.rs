//! Client configuration.
//!
//! Configuration can be loaded from a TOML file; every field has a default.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::correlator::{CorrelatorConfig, DEFAULT_MAX_BUFFER_BYTES};
use crate::error::ClientError;
use crate::matcher::MatchMode;

/// Settings for the device and relay clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Host of the game's console listener.
    #[serde(default = "default_device_host")]
    pub device_host: String,

    /// Port of the game's console listener.
    #[serde(default = "default_device_port")]
    pub device_port: u16,

    /// Relay host.
    #[serde(default = "default_relay_host")]
    pub relay_host: String,

    /// Relay port.
    #[serde(default = "default_relay_port")]
    pub relay_port: u16,

    /// Time to wait for a device response, in milliseconds.
    #[serde(default = "default_response_timeout")]
    pub response_timeout_ms: u64,

    /// Time to wait for a connection, in milliseconds.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,

    /// How device output is matched against pending responses.
    #[serde(default)]
    pub match_mode: MatchMode,

    /// Cap on buffered device output in buffered mode.
    #[serde(default = "default_max_buffer_bytes")]
    pub max_buffer_bytes: usize,
}

fn default_device_host() -> String {
    "127.0.0.1".to_string()
}

fn default_device_port() -> u16 {
    sync_transport::tcp::DEFAULT_DEVICE_PORT
}

fn default_relay_host() -> String {
    "csgo-demo-sync.com".to_string()
}

fn default_relay_port() -> u16 {
    3113
}

fn default_response_timeout() -> u64 {
    1000
}

fn default_connect_timeout() -> u64 {
    2000
}

fn default_max_buffer_bytes() -> usize {
    DEFAULT_MAX_BUFFER_BYTES
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            device_host: default_device_host(),
            device_port: default_device_port(),
            relay_host: default_relay_host(),
            relay_port: default_relay_port(),
            response_timeout_ms: default_response_timeout(),
            connect_timeout_ms: default_connect_timeout(),
            match_mode: MatchMode::default(),
            max_buffer_bytes: default_max_buffer_bytes(),
        }
    }
}

impl ClientConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ClientError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            ClientError::Config(format!("Failed to read {}: {e}", path.display()))
        })?;

        toml::from_str(&contents)
            .map_err(|e| ClientError::Config(format!("Failed to parse {}: {e}", path.display())))
    }

    /// Device response timeout.
    #[must_use]
    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms)
    }

    /// Connection timeout.
    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Correlator settings derived from this configuration.
    #[must_use]
    pub fn correlator(&self) -> CorrelatorConfig {
        CorrelatorConfig {
            mode: self.match_mode,
            max_buffer_bytes: self.max_buffer_bytes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ClientConfig::default();
        assert_eq!(config.device_host, "127.0.0.1");
        assert_eq!(config.device_port, 2121);
        assert_eq!(config.relay_host, "csgo-demo-sync.com");
        assert_eq!(config.relay_port, 3113);
        assert_eq!(config.response_timeout(), Duration::from_millis(1000));
        assert_eq!(config.correlator(), CorrelatorConfig::default());
    }

    #[test]
    fn test_config_from_toml() {
        let toml_str = r#"
            relay_host = "localhost"
            match_mode = "buffered"
            max_buffer_bytes = 1024
        "#;

        let config: ClientConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.relay_host, "localhost");
        assert_eq!(config.relay_port, 3113);
        assert_eq!(config.correlator().mode, MatchMode::Buffered);
        assert_eq!(config.correlator().max_buffer_bytes, 1024);
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            ClientConfig::from_file("/nonexistent/demo-sync-client.toml"),
            Err(ClientError::Config(_))
        ));
    }
}
