//! Error types for kiln-core

use thiserror::Error;

/// Result type alias for kiln-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in kiln-core
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration file could not be found
    #[error("configuration file not found: {path}")]
    ConfigNotFound {
        /// Path that was searched
        path: String,
    },

    /// Failed to parse YAML configuration
    #[error("failed to parse configuration: {0}")]
    ConfigParse(#[from] serde_yaml::Error),

    /// Invalid configuration value
    #[error("invalid configuration: {message}")]
    ConfigInvalid {
        /// Description of what's invalid
        message: String,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Shorthand for a [`Error::ConfigInvalid`] with the given message
    pub fn invalid(message: impl Into<String>) -> Self {
        Error::ConfigInvalid {
            message: message.into(),
        }
    }
}
