//! # Configuration Management
//!
//! Centralized configuration for the client transport and session.
//!
//! ## Configuration Sources
//! - TOML files via `from_file()` / `from_toml()`
//! - Direct instantiation with defaults
//! - `MT_CLIENT_*` environment variables via `from_env()`
//!
//! Durations are written as integer milliseconds.

use crate::core::packet::{ENVELOPE_LEN, RELIABLE_HEADER_LEN, SPLIT_HEADER_LEN};
use crate::core::sequence::SEQUENCE_BASELINE;
use crate::core::split::{DEFAULT_MAX_PENDING, DEFAULT_TIMEOUT};
use crate::error::{ProtocolError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::time::Duration;
use tracing::Level;

/// Default server address of a local Minetest server
pub const DEFAULT_ADDRESS: &str = "127.0.0.1:30000";

/// Largest datagram a sender produces before splitting
pub const MAX_PACKET_LENGTH: usize = 512;

/// Size of the socket read buffer
pub const RECV_BUFFER_SIZE: usize = 1024;

/// Capacity of the raw datagram queue between receive and parse
pub const RECEIVE_QUEUE_CAPACITY: usize = 1000;

/// Capacity of the handshake subscriber's event queue
pub const SUBSCRIBER_CAPACITY: usize = 500;

/// Wait between peer id assignment and the client init
pub const SETTLE_DELAY: Duration = Duration::from_secs(2);

/// Header bytes a split fragment adds on top of its data
pub const SPLIT_OVERHEAD: usize = ENVELOPE_LEN + RELIABLE_HEADER_LEN + SPLIT_HEADER_LEN;

/// Main network configuration structure that contains all configurable settings
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct NetworkConfig {
    /// Session configuration
    #[serde(default)]
    pub client: ClientConfig,

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

    /// Load configuration from environment variables
    ///
    /// Unparseable numeric values are rejected rather than ignored.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(address) = lookup("MT_CLIENT_ADDRESS") {
            config.client.address = address;
        }
        if let Some(username) = lookup("MT_CLIENT_USERNAME") {
            config.client.username = username;
        }
        if let Some(password) = lookup("MT_CLIENT_PASSWORD") {
            config.client.password = password;
        }
        if let Some(language) = lookup("MT_CLIENT_LANGUAGE") {
            config.client.language = language;
        }
        if let Some(media) = lookup("MT_CLIENT_DOWNLOAD_MEDIA") {
            config.client.download_media = parse_env("MT_CLIENT_DOWNLOAD_MEDIA", &media)?;
        }
        if let Some(millis) = lookup("MT_CLIENT_SETTLE_DELAY_MS") {
            config.client.settle_delay =
                Duration::from_millis(parse_env("MT_CLIENT_SETTLE_DELAY_MS", &millis)?);
        }
        if let Some(len) = lookup("MT_CLIENT_MAX_PACKET_LENGTH") {
            config.transport.max_packet_length = parse_env("MT_CLIENT_MAX_PACKET_LENGTH", &len)?;
        }
        if let Some(level) = lookup("MT_CLIENT_LOG_LEVEL") {
            config.logging.log_level = level.parse::<Level>().map_err(|_| {
                ProtocolError::ConfigError(format!("Invalid MT_CLIENT_LOG_LEVEL: {level}"))
            })?;
        }
        if let Some(json) = lookup("MT_CLIENT_LOG_JSON") {
            config.logging.json_format = parse_env("MT_CLIENT_LOG_JSON", &json)?;
        }

        Ok(config)
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
        errors.extend(self.client.validate());
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

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .parse::<T>()
        .map_err(|_| ProtocolError::ConfigError(format!("Invalid {key}: {value}")))
}

/// Session configuration
#[derive(Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Server address as `host:port`
    pub address: String,

    pub username: String,

    /// Never sent on the wire; only fed to the SRP primitive
    pub password: String,

    /// Wait after peer id assignment before sending the client init
    #[serde(with = "duration_serde")]
    pub settle_delay: Duration,

    /// Queue capacity of the handshake's event subscription
    pub subscriber_capacity: usize,

    /// Language code sent with the init confirmation
    pub language: String,

    /// Request every announced media file once connected
    pub download_media: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            address: String::from(DEFAULT_ADDRESS),
            username: String::from("test"),
            password: String::new(),
            settle_delay: SETTLE_DELAY,
            subscriber_capacity: SUBSCRIBER_CAPACITY,
            language: String::new(),
            download_media: false,
        }
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("address", &self.address)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("settle_delay", &self.settle_delay)
            .field("subscriber_capacity", &self.subscriber_capacity)
            .field("language", &self.language)
            .field("download_media", &self.download_media)
            .finish()
    }
}

impl ClientConfig {
    /// Validate client configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        // Hostnames are allowed, so only the host:port shape is checked here.
        match self.address.rsplit_once(':') {
            None => errors.push(format!(
                "Invalid server address format: '{}' (expected format: 'host:30000')",
                self.address
            )),
            Some((host, port)) => {
                if host.is_empty() {
                    errors.push("Server host cannot be empty".to_string());
                }
                if port.parse::<u16>().map_or(true, |p| p == 0) {
                    errors.push(format!("Invalid server port: '{port}'"));
                }
            }
        }

        if self.username.is_empty() {
            errors.push("Username cannot be empty".to_string());
        } else if self.username.len() > 20 {
            errors.push(format!(
                "Username too long: {} characters (maximum: 20)",
                self.username.len()
            ));
        }

        if self.settle_delay.as_secs() > 60 {
            errors.push("Settle delay too long (maximum: 60s)".to_string());
        }

        if self.subscriber_capacity == 0 {
            errors.push("Subscriber capacity must be greater than 0".to_string());
        }

        errors
    }
}

/// Transport configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Reliable payloads at or above this length are split
    pub max_packet_length: usize,

    /// Socket read buffer; longer datagrams are truncated by the OS
    pub recv_buffer_size: usize,

    /// Raw datagrams buffered between receive and parse
    pub receive_queue_capacity: usize,

    /// First reliable sequence number, restored on server greeting
    pub sequence_baseline: u16,

    /// Incomplete split messages held at once
    pub split_max_pending: usize,

    /// Lifetime of an incomplete split message
    #[serde(with = "duration_serde")]
    pub split_timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            max_packet_length: MAX_PACKET_LENGTH,
            recv_buffer_size: RECV_BUFFER_SIZE,
            receive_queue_capacity: RECEIVE_QUEUE_CAPACITY,
            sequence_baseline: SEQUENCE_BASELINE,
            split_max_pending: DEFAULT_MAX_PENDING,
            split_timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl TransportConfig {
    /// Data bytes carried by each split fragment
    pub fn split_chunk_size(&self) -> usize {
        self.max_packet_length.saturating_sub(SPLIT_OVERHEAD)
    }

    /// Validate transport configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.max_packet_length <= SPLIT_OVERHEAD {
            errors.push(format!(
                "Max packet length too small: {} (must exceed split header of {SPLIT_OVERHEAD} bytes)",
                self.max_packet_length
            ));
        } else if self.max_packet_length > 65_507 {
            errors.push(format!(
                "Max packet length too large: {} (maximum UDP payload: 65507)",
                self.max_packet_length
            ));
        }

        if self.recv_buffer_size < self.max_packet_length {
            errors.push(format!(
                "Receive buffer ({}) smaller than max packet length ({})",
                self.recv_buffer_size, self.max_packet_length
            ));
        }

        if self.receive_queue_capacity == 0 {
            errors.push("Receive queue capacity must be greater than 0".to_string());
        }

        if self.split_max_pending == 0 {
            errors.push("Split store must allow at least one pending message".to_string());
        }

        if self.split_timeout.as_millis() < 100 {
            errors.push("Split timeout too short (minimum: 100ms)".to_string());
        }

        errors
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Application name for logs
    pub app_name: String,

    /// Log level
    #[serde(with = "log_level_serde")]
    pub log_level: Level,

    /// Whether to use JSON formatting for logs
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            app_name: String::from("minetest-protocol"),
            log_level: Level::INFO,
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

        errors
    }
}

/// Helper module for Duration serialization/deserialization
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let millis = duration.as_millis() as u64;
        millis.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
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
