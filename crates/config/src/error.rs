//! Configuration error types

use std::io;
use thiserror::Error;

/// Result type for configuration operations
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Errors that can occur when loading or validating configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read configuration file
    #[error("failed to read config file '{path}': {source}")]
    IoError {
        /// Path to the file
        path: String,
        /// Underlying IO error
        #[source]
        source: io::Error,
    },

    /// Failed to parse TOML
    #[error("failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Validation error - two listeners configured on the same port
    #[error("port {port} is used by both {first} and {second}")]
    DuplicatePort {
        /// The conflicting port
        port: u16,
        /// First listener using the port
        first: &'static str,
        /// Second listener using the port
        second: &'static str,
    },

    /// Validation error - invalid value
    #[error("invalid {field}: {message}")]
    InvalidValue {
        /// Field name
        field: &'static str,
        /// Error message
        message: String,
    },
}

impl ConfigError {
    /// Create an InvalidValue error
    pub fn invalid_value(field: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidValue {
            field,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_port_error() {
        let err = ConfigError::DuplicatePort {
            port: 4557,
            first: "command_port",
            second: "cue_port",
        };
        assert!(err.to_string().contains("4557"));
        assert!(err.to_string().contains("command_port"));
    }

    #[test]
    fn test_invalid_value_error() {
        let err = ConfigError::invalid_value("observer_host", "must not be empty");
        assert!(err.to_string().contains("observer_host"));
        assert!(err.to_string().contains("must not be empty"));
    }
}
