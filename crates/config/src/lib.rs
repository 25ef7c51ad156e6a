//! cued Configuration
//!
//! TOML-based configuration loading with sensible defaults.
//! Minimal config should just work - only specify what you need to change.
//!
//! # Parsing
//!
//! Use the `FromStr` trait to parse configuration:
//!
//! ```
//! use cued_config::Config;
//! use std::str::FromStr;
//!
//! let config = Config::from_str("[server]\ncue_port = 5559").unwrap();
//! assert_eq!(config.server.cue_port, 5559);
//! ```
//!
//! # Example Minimal Config
//!
//! ```toml
//! [server]
//! command_port = 4557
//! observer_port = 4558
//! ```

mod error;
mod logging;
mod server;

use std::fs;
use std::path::Path;
use std::str::FromStr;

pub use error::{ConfigError, Result};
pub use logging::{LogConfig, LogFormat, LogLevel};
pub use server::ServerConfig;

use serde::Deserialize;

/// Main configuration structure
///
/// All sections are optional with sensible defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Logging configuration
    pub log: LogConfig,

    /// Network and relay settings
    pub server: ServerConfig,
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Errors
    ///
    /// Returns error if file cannot be read or contains invalid TOML.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|e| ConfigError::IoError {
            path: path.display().to_string(),
            source: e,
        })?;

        Self::from_str(&contents)
    }

    /// Parse configuration from a TOML string
    fn parse(s: &str) -> Result<Self> {
        let config: Config = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    ///
    /// Checks for port conflicts between the two listeners and obviously
    /// unusable values.
    fn validate(&self) -> Result<()> {
        let s = &self.server;

        if s.command_port == 0 {
            return Err(ConfigError::invalid_value("command_port", "must not be 0"));
        }
        if s.cue_port == 0 {
            return Err(ConfigError::invalid_value("cue_port", "must not be 0"));
        }
        if s.command_port == s.cue_port {
            return Err(ConfigError::DuplicatePort {
                port: s.command_port,
                first: "command_port",
                second: "cue_port",
            });
        }
        if s.observer_host.is_empty() {
            return Err(ConfigError::invalid_value(
                "observer_host",
                "must not be empty",
            ));
        }
        if s.heartbeat_secs == 0 {
            return Err(ConfigError::invalid_value("heartbeat_secs", "must not be 0"));
        }

        Ok(())
    }
}

impl FromStr for Config {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}
