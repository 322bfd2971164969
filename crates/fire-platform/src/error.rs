//! Platform-specific errors

use thiserror::Error;

/// Platform-specific errors
#[derive(Error, Debug)]
pub enum PlatformError {
    /// Snapshot file could not be read or written
    #[error("Store error at {path}: {message}")]
    Store {
        /// File involved
        path: String,
        /// Error message
        message: String,
    },

    /// Namespace or key not usable as a path component
    #[error("Invalid store key: {0}")]
    InvalidKey(String),

    /// Account database line could not be parsed
    #[error("Invalid account entry at line {line}: {message}")]
    AccountParse {
        /// 1-based line number
        line: usize,
        /// Error message
        message: String,
    },

    /// HTTP client error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Tunnel device error
    #[error("Tunnel error: {0}")]
    Tunnel(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Core library error
    #[error(transparent)]
    Core(#[from] fire_core::Error),
}

/// Platform result type
pub type Result<T> = std::result::Result<T, PlatformError>;

impl From<PlatformError> for fire_core::Error {
    fn from(err: PlatformError) -> Self {
        match err {
            PlatformError::Core(inner) => inner,
            PlatformError::Io(inner) => fire_core::Error::Io(inner),
            PlatformError::Tunnel(message) => fire_core::Error::Tunnel(message),
            PlatformError::Store { path, message } => {
                fire_core::Error::persistence(path, "", message)
            }
            other => fire_core::Error::Config(other.to_string()),
        }
    }
}
