//! Error types for fire-core
//!
//! Centralized error handling using `thiserror` for ergonomic error definitions.

use thiserror::Error;

/// Main error type for fire-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Packet parsing failed
    #[error("Packet parsing error: {message}")]
    PacketParse {
        /// Detailed error message
        message: String,
        /// Offset in packet where error occurred
        offset: Option<usize>,
    },

    /// Packet is too small to process
    #[error("Packet too small: expected at least {expected} bytes, got {actual}")]
    PacketTooSmall {
        /// Minimum expected size
        expected: usize,
        /// Actual packet size
        actual: usize,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound {
        /// Path to the missing config file
        path: String,
    },

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    ConfigValue {
        /// Configuration key
        key: String,
        /// Error message
        message: String,
    },

    /// Invalid IP address
    #[error("Invalid IP address: {addr}")]
    InvalidIpAddr {
        /// The invalid address
        addr: String,
    },

    /// Invalid CIDR prefix length
    #[error("Invalid prefix length: {prefix} (must be 0-32)")]
    InvalidPrefix {
        /// The invalid prefix
        prefix: u32,
    },

    /// Application identifier could not be mapped to a numeric identity
    #[error("Unresolved application identity: {package}")]
    UnresolvedIdentity {
        /// Package or bundle identifier
        package: String,
    },

    /// Snapshot read or write failed
    #[error("Persistence error for '{namespace}/{key}': {message}")]
    Persistence {
        /// Store namespace
        namespace: String,
        /// Key within the namespace
        key: String,
        /// Error message
        message: String,
    },

    /// Remote list download failed
    #[error("Fetch failed for '{url}': {message}")]
    Fetch {
        /// Source URL
        url: String,
        /// Error message
        message: String,
    },

    /// Remote list returned a non-success status
    #[error("HTTP error: {status}")]
    HttpStatus {
        /// HTTP status code
        status: u16,
    },

    /// Background worker is gone
    #[error("Worker '{0}' is not running")]
    WorkerStopped(&'static str),

    /// Tunnel device error
    #[error("Tunnel error: {0}")]
    Tunnel(String),

    /// I/O error wrapper
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),
}

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create a packet parse error
    pub fn packet_parse(message: impl Into<String>) -> Self {
        Self::PacketParse {
            message: message.into(),
            offset: None,
        }
    }

    /// Create a packet parse error with offset
    pub fn packet_parse_at(message: impl Into<String>, offset: usize) -> Self {
        Self::PacketParse {
            message: message.into(),
            offset: Some(offset),
        }
    }

    /// Create a config value error
    pub fn config_value(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConfigValue {
            key: key.into(),
            message: message.into(),
        }
    }

    /// Create a persistence error
    pub fn persistence(
        namespace: impl Into<String>,
        key: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Persistence {
            namespace: namespace.into(),
            key: key.into(),
            message: message.into(),
        }
    }

    /// Create a fetch error
    pub fn fetch(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Fetch {
            url: url.into(),
            message: message.into(),
        }
    }
}
