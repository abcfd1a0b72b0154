//! # Configuration Management
//!
//! Centralized configuration for a cluster node's links.
//!
//! ## Sections
//! - `node`: what this node announces in its handshake (host, ports, attributes)
//! - `server`: where it listens and which servers it joins
//! - `transport`: frame size limit and read buffer sizing
//! - `logging`: subscriber setup (see [`crate::utils::logging`])
//!
//! ## Configuration Sources
//! - TOML files via `from_file()`
//! - Direct instantiation with defaults
//! - Environment overrides via `from_env()`

use crate::error::{ProtocolError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::net::SocketAddr;
use std::path::Path;
use tracing::Level;

/// Largest frame body accepted from a peer (16 MB)
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Initial capacity of a link's receive buffer
pub const DEFAULT_READ_BUFFER: usize = 8 * 1024;

/// Main configuration structure that contains all configurable settings
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct NetworkConfig {
    /// Identity announced to peers
    #[serde(default)]
    pub node: NodeConfig,

    /// Listener and target servers
    #[serde(default)]
    pub server: ServerConfig,

    /// Transport configuration
    #[serde(default)]
    pub transport: TransportConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl NetworkConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut file = File::open(path)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to open config file: {e}")))?;

        let mut contents = String::new();
        file.read_to_string(&mut contents)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to read config file: {e}")))?;

        Self::from_toml(&contents)
    }

    /// Load configuration from TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str::<Self>(content)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to parse TOML: {e}")))
    }

    /// Load configuration from environment variables on top of the defaults
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env_overrides();
        Ok(config)
    }

    /// Override fields from `CLUSTER_LINK_*` environment variables
    pub fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("CLUSTER_LINK_HOST") {
            self.node.host = host;
        }

        if let Ok(addr) = std::env::var("CLUSTER_LINK_LISTEN_ADDRESS") {
            self.server.address = addr;
        }

        if let Ok(targets) = std::env::var("CLUSTER_LINK_TARGETS") {
            self.server.targets = targets
                .split(',')
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(String::from)
                .collect();
        }

        if let Ok(size) = std::env::var("CLUSTER_LINK_MAX_FRAME_SIZE") {
            if let Ok(val) = size.parse::<usize>() {
                self.transport.max_frame_size = val;
            }
        }
    }

    /// Apply overrides to the default configuration
    pub fn default_with_overrides<F>(mutator: F) -> Self
    where
        F: FnOnce(&mut Self),
    {
        let mut config = Self::default();
        mutator(&mut config);
        config
    }

    /// Generate example configuration file content
    pub fn example_config() -> String {
        toml::to_string_pretty(&Self::default())
            .unwrap_or_else(|_| String::from("# Failed to generate example config"))
    }

    /// Save configuration to a file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to serialize config: {e}")))?;

        std::fs::write(path, content)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to write config file: {e}")))?;

        Ok(())
    }

    /// Validate the configuration for common issues and misconfigurations
    ///
    /// Returns a list of validation errors. Empty list means configuration is valid.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        errors.extend(self.node.validate());
        errors.extend(self.server.validate());
        errors.extend(self.transport.validate());
        errors.extend(self.logging.validate());
        errors
    }

    /// Validate and return Result - convenience method
    pub fn validate_strict(&self) -> Result<()> {
        let errors = self.validate();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ProtocolError::ConfigError(format!(
                "Configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            )))
        }
    }
}

/// What this node tells its peers about itself
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct NodeConfig {
    /// Public host name; peers fall back to our IP address when empty
    #[serde(default)]
    pub host: String,

    /// Listening port per protocol name (e.g. `rtmp = 1935`)
    #[serde(default)]
    pub ports: BTreeMap<String, u16>,

    /// Metadata sent with every handshake
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

impl NodeConfig {
    /// Validate node identity
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.host.len() > 255 {
            errors.push(format!(
                "Host name too long: {} bytes (maximum: 255)",
                self.host.len()
            ));
        }

        if self.ports.len() > 255 {
            errors.push(format!(
                "Too many advertised ports: {} (maximum: 255)",
                self.ports.len()
            ));
        }

        for (protocol, port) in &self.ports {
            if protocol.is_empty() || protocol.len() > 255 {
                errors.push(format!(
                    "Invalid protocol name '{protocol}' (1 to 255 bytes expected)"
                ));
            }
            if *port == 0 {
                errors.push(format!("Port for protocol '{protocol}' cannot be 0"));
            }
        }

        for (key, value) in &self.attributes {
            if key.len() > 255 || value.len() > 255 {
                errors.push(format!("Attribute '{key}' exceeds 255 bytes"));
            }
        }

        errors
    }
}

/// Listener and outbound targets
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Listen address for inbound server links (e.g., "0.0.0.0:1936")
    pub address: String,

    /// Servers to join, as socket addresses
    #[serde(default)]
    pub targets: Vec<String>,

    /// Maximum number of concurrent inbound links
    pub max_connections: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: String::from("127.0.0.1:1936"),
            targets: Vec::new(),
            max_connections: 256,
        }
    }
}

impl ServerConfig {
    /// Parsed target addresses; unparseable entries are reported by `validate`
    pub fn target_addresses(&self) -> Vec<SocketAddr> {
        self.targets.iter().filter_map(|t| t.parse().ok()).collect()
    }

    /// Validate server configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.address.is_empty() {
            errors.push("Server address cannot be empty".to_string());
        } else if self.address.parse::<SocketAddr>().is_err() {
            errors.push(format!(
                "Invalid server address format: '{}' (expected format: '0.0.0.0:1936')",
                self.address
            ));
        }

        for target in &self.targets {
            if target.parse::<SocketAddr>().is_err() {
                errors.push(format!(
                    "Invalid target address format: '{target}' (expected format: '10.0.0.2:1936')"
                ));
            }
        }

        if self.max_connections == 0 {
            errors.push("Max connections must be greater than 0".to_string());
        } else if self.max_connections > 100_000 {
            errors.push(format!(
                "Max connections very high: {} (ensure system resources can support this)",
                self.max_connections
            ));
        }

        errors
    }
}

/// Transport configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TransportConfig {
    /// Maximum accepted frame body in bytes
    pub max_frame_size: usize,

    /// Initial receive buffer capacity per link
    pub read_buffer_capacity: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            max_frame_size: MAX_FRAME_SIZE,
            read_buffer_capacity: DEFAULT_READ_BUFFER,
        }
    }
}

impl TransportConfig {
    /// Validate transport configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        // a frame must at least hold the tag field of a handshake
        if self.max_frame_size < 2 {
            errors.push("Max frame size too small (minimum: 2 bytes)".to_string());
        } else if self.max_frame_size > u32::MAX as usize {
            errors.push(format!(
                "Max frame size too large: {} bytes (length prefix is 32 bits)",
                self.max_frame_size
            ));
        }

        if self.read_buffer_capacity < 64 {
            errors.push("Read buffer capacity too small (minimum: 64 bytes)".to_string());
        }

        errors
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Application name for logs
    pub app_name: String,

    /// Log level
    #[serde(with = "log_level_serde")]
    pub log_level: Level,

    /// Whether to log to console
    pub log_to_console: bool,

    /// Whether to log to file
    pub log_to_file: bool,

    /// Path to log file (if log_to_file is true)
    pub log_file_path: Option<String>,

    /// Whether to use JSON formatting for logs
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            app_name: String::from("cluster-link"),
            log_level: Level::INFO,
            log_to_console: true,
            log_to_file: false,
            log_file_path: None,
            json_format: false,
        }
    }
}

impl LoggingConfig {
    /// Validate logging configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.app_name.is_empty() {
            errors.push("Application name cannot be empty".to_string());
        } else if self.app_name.len() > 64 {
            errors.push(format!(
                "Application name too long: {} characters (maximum: 64)",
                self.app_name.len()
            ));
        }

        if self.log_to_file {
            if let Some(ref path) = self.log_file_path {
                if let Some(parent) = Path::new(path).parent() {
                    if !parent.as_os_str().is_empty() && !parent.exists() {
                        errors.push(format!(
                            "Log file directory does not exist: {}",
                            parent.display()
                        ));
                    }
                }
            } else {
                errors.push("log_file_path must be specified when log_to_file is true".to_string());
            }
        }

        if !self.log_to_console && !self.log_to_file {
            errors
                .push("At least one logging output (console or file) must be enabled".to_string());
        }

        errors
    }
}

/// Helper module for tracing::Level serialization/deserialization
mod log_level_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::str::FromStr;
    use tracing::Level;

    pub fn serialize<S>(level: &Level, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let level_str = match *level {
            Level::TRACE => "trace",
            Level::DEBUG => "debug",
            Level::INFO => "info",
            Level::WARN => "warn",
            Level::ERROR => "error",
        };
        level_str.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Level, D::Error>
    where
        D: Deserializer<'de>,
    {
        let level_str = String::deserialize(deserializer)?;
        Level::from_str(&level_str)
            .map_err(|_| serde::de::Error::custom(format!("Invalid log level: {level_str}")))
    }
}
