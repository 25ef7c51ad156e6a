//! Server configuration
//!
//! Network surface of the daemon: the command port the dispatcher listens
//! on, the cue intake port, the observer endpoint wrapped cues are relayed
//! to, and the initial cue relay flags.

use serde::Deserialize;

/// Default command (dispatcher) port
const DEFAULT_COMMAND_PORT: u16 = 4557;

/// Default cue intake port
const DEFAULT_CUE_PORT: u16 = 4559;

/// Default observer endpoint for relayed cues
const DEFAULT_OBSERVER_HOST: &str = "127.0.0.1";
const DEFAULT_OBSERVER_PORT: u16 = 4558;

/// Default relay idle heartbeat interval in seconds
const DEFAULT_HEARTBEAT_SECS: u64 = 60;

/// Server configuration
///
/// # Example
///
/// ```toml
/// [server]
/// command_port = 4557
/// cue_port = 4559
/// observer_host = "127.0.0.1"
/// observer_port = 4558
/// internal = true
/// enabled = false
/// ```
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ServerConfig {
    /// UDP port the command dispatcher listens on
    pub command_port: u16,

    /// UDP port the cue relay listens on
    pub cue_port: u16,

    /// Host wrapped cues are relayed to
    pub observer_host: String,

    /// Port wrapped cues are relayed to
    pub observer_port: u16,

    /// Initial bind scope for the cue intake socket
    /// true = loopback only, false = all interfaces
    pub internal: bool,

    /// Initial cue relaying flag
    pub enabled: bool,

    /// Relay idle heartbeat interval in seconds
    pub heartbeat_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            command_port: DEFAULT_COMMAND_PORT,
            cue_port: DEFAULT_CUE_PORT,
            observer_host: DEFAULT_OBSERVER_HOST.to_string(),
            observer_port: DEFAULT_OBSERVER_PORT,
            internal: true,
            enabled: false,
            heartbeat_secs: DEFAULT_HEARTBEAT_SECS,
        }
    }
}

impl ServerConfig {
    /// The observer endpoint as "host:port"
    pub fn observer_addr(&self) -> String {
        format!("{}:{}", self.observer_host, self.observer_port)
    }
}
