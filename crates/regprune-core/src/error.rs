//! Error types for regprune-core

use thiserror::Error;

/// Result type alias using regprune-core's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for regprune
#[derive(Error, Debug)]
pub enum Error {
    /// Required configuration value missing
    #[error("Missing required configuration: {name}. Set the {name} environment variable or pass the corresponding flag.")]
    MissingConfig { name: String },

    /// Invalid configuration value
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    /// JSON parsing error
    #[error("JSON parsing error: {0}")]
    JsonParse(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a missing config error
    pub fn missing_config(name: impl Into<String>) -> Self {
        Self::MissingConfig { name: name.into() }
    }

    /// Create an invalid config error
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }
}
