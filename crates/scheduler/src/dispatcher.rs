//! Command dispatcher
//!
//! The API-facing control loop. Receives command datagrams, decodes them,
//! and routes each one: timed bundles become scheduled (or immediate)
//! forwards, immediate commands mutate the tag registry or reconfigure the
//! cue relay. The protocol is fire-and-forget: the dispatcher never replies
//! to a sender, and no input - malformed, unknown, or otherwise - ever
//! terminates the loop.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;

use cued_protocol::{decode, decode_message, encode, now_unix, Arg, Bundle, Message, Packet};

use crate::metrics::DispatcherMetrics;
use crate::registry::{TagRegistry, DEFAULT_TAG};
use crate::relay::{Forward, RelayHandle};
use crate::timer;

/// Schedule under the default tag: `/send_after host port ...cmd`
pub const CMD_SEND_AFTER: &str = "/send_after";

/// Schedule under an explicit tag: `/send_after_tagged tag host port ...cmd`
pub const CMD_SEND_AFTER_TAGGED: &str = "/send_after_tagged";

/// Cancel all pending deliveries for a tag: `/flush tag`
pub const CMD_FLUSH: &str = "/flush";

/// Toggle the cue intake bind scope: `/internal-cue-port flag`
pub const CMD_INTERNAL_CUE_PORT: &str = "/internal-cue-port";

/// Toggle cue relaying: `/stop-start-cue-server flag`
pub const CMD_STOP_START_CUE_SERVER: &str = "/stop-start-cue-server";

/// Delays at or below this many milliseconds skip the timer facility and
/// forward synchronously
pub const NO_DELAY_THRESHOLD_MS: i64 = 1;

/// Default command port
const DEFAULT_COMMAND_PORT: u16 = 4557;

/// Default bind address for the command socket
const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0";

/// Default receive buffer size (64KB, the UDP ceiling)
const DEFAULT_MAX_DATAGRAM: usize = 64 * 1024;

/// Command dispatcher configuration
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Bind address (e.g. "0.0.0.0")
    pub bind_address: String,

    /// Command port
    pub command_port: u16,

    /// Receive buffer size
    pub max_datagram: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            bind_address: DEFAULT_BIND_ADDRESS.into(),
            command_port: DEFAULT_COMMAND_PORT,
            max_datagram: DEFAULT_MAX_DATAGRAM,
        }
    }
}

impl DispatcherConfig {
    /// The socket address to bind to
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.bind_address, self.command_port)
    }
}

/// Command dispatcher errors
#[derive(Debug, thiserror::Error)]
pub enum DispatcherError {
    /// Failed to bind the command port at startup (the only fatal error)
    #[error("failed to bind command port on {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// The API-facing control loop
pub struct Dispatcher {
    config: DispatcherConfig,
    socket: UdpSocket,

    /// Tag -> tracker map, grown on demand, never shrunk
    registry: TagRegistry,

    relay: RelayHandle,
    metrics: Arc<DispatcherMetrics>,
    cancel: CancellationToken,
}

impl Dispatcher {
    /// Bind the command socket and create the dispatcher
    ///
    /// # Errors
    ///
    /// Returns `DispatcherError::Bind` if the port cannot be bound.
    pub async fn bind(
        config: DispatcherConfig,
        relay: RelayHandle,
        cancel: CancellationToken,
    ) -> Result<Self, DispatcherError> {
        let addr = config.bind_addr();
        let socket = UdpSocket::bind(&addr)
            .await
            .map_err(|e| DispatcherError::Bind {
                address: addr.clone(),
                source: e,
            })?;

        Ok(Self {
            config,
            socket,
            registry: TagRegistry::new(),
            relay,
            metrics: Arc::new(DispatcherMetrics::new()),
            cancel,
        })
    }

    /// The command address actually bound
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Get metrics reference
    pub fn metrics(&self) -> Arc<DispatcherMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Run the dispatcher until shutdown
    pub async fn run(mut self) {
        tracing::info!(
            address = %self.config.bind_addr(),
            "command dispatcher started"
        );

        let mut buf = vec![0u8; self.config.max_datagram];

        loop {
            tokio::select! {
                biased;

                _ = self.cancel.cancelled() => break,

                recv = self.socket.recv_from(&mut buf) => match recv {
                    Ok((len, peer)) => {
                        self.metrics.datagram_received();
                        self.handle_datagram(&buf[..len], peer);
                    }
                    Err(e) => {
                        tracing::debug!(error = %e, "command recv error, ignoring");
                    }
                }
            }
        }

        let s = self.metrics.snapshot();
        tracing::info!(
            datagrams_received = s.datagrams_received,
            deliveries_scheduled = s.deliveries_scheduled,
            deliveries_immediate = s.deliveries_immediate,
            flushes = s.flushes,
            tags = self.registry.len(),
            "command dispatcher stopped"
        );
    }

    /// Route one inbound datagram
    fn handle_datagram(&mut self, data: &[u8], peer: SocketAddr) {
        match decode(data) {
            Ok(Packet::Bundle(bundle)) => self.handle_bundle(bundle),
            Ok(Packet::Message(msg)) => self.handle_immediate(msg),
            Err(e) => {
                self.metrics.decode_error();
                tracing::warn!(
                    peer = %peer,
                    len = data.len(),
                    raw = ?&data[..data.len().min(32)],
                    error = %e,
                    "failed to decode command datagram, ignoring"
                );
            }
        }
    }

    /// Route an immediate (un-bundled) command
    fn handle_immediate(&mut self, msg: Message) {
        match msg.address.as_str() {
            CMD_FLUSH => match msg.args.first().and_then(Arg::as_str) {
                Some(tag) => {
                    // Flushing a tag nobody scheduled under is a legal no-op;
                    // the tracker is created either way.
                    let tag = tag.to_string();
                    self.registry.resolve(&tag).flush_all();
                    self.metrics.flush();
                    tracing::debug!(tag = %tag, "flush requested");
                }
                None => {
                    self.metrics.unknown_command();
                    tracing::warn!(command = %msg, "malformed /flush, expected tag string");
                }
            },

            CMD_INTERNAL_CUE_PORT => match msg.args.first().and_then(Arg::as_int) {
                Some(flag) => {
                    self.relay.set_internal(flag == 1);
                    self.metrics.relay_control();
                }
                None => {
                    self.metrics.unknown_command();
                    tracing::warn!(command = %msg, "malformed /internal-cue-port, expected flag");
                }
            },

            CMD_STOP_START_CUE_SERVER => match msg.args.first().and_then(Arg::as_int) {
                Some(flag) => {
                    self.relay.set_enabled(flag == 1);
                    self.metrics.relay_control();
                }
                None => {
                    self.metrics.unknown_command();
                    tracing::warn!(command = %msg, "malformed /stop-start-cue-server, expected flag");
                }
            },

            other => {
                self.metrics.unknown_command();
                tracing::warn!(address = %other, "unknown command, ignoring");
            }
        }
    }

    /// Route a timed bundle
    fn handle_bundle(&mut self, bundle: Bundle) {
        for element in &bundle.elements {
            let msg = match decode_message(element) {
                Ok(msg) => msg,
                Err(e) => {
                    self.metrics.decode_error();
                    tracing::warn!(error = %e, "failed to decode bundle element, ignoring");
                    continue;
                }
            };

            match msg.address.as_str() {
                CMD_SEND_AFTER => self.schedule(DEFAULT_TAG, bundle.time, &msg, 0),
                CMD_SEND_AFTER_TAGGED => match msg.args.first().and_then(Arg::as_str) {
                    Some(tag) => {
                        let tag = tag.to_string();
                        self.schedule(&tag, bundle.time, &msg, 1);
                    }
                    None => {
                        self.metrics.unknown_command();
                        tracing::warn!(command = %msg, "malformed /send_after_tagged, expected tag");
                    }
                },
                other => {
                    self.metrics.unknown_command();
                    tracing::warn!(address = %other, "unexpected bundle command, ignoring");
                }
            }
        }
    }

    /// Schedule one delivery under `tag` for absolute time `time`
    ///
    /// The destination and forwarded command sit in `msg.args` starting at
    /// `skip`: host, port, address, then the forwarded arguments.
    fn schedule(&mut self, tag: &str, time: f64, msg: &Message, skip: usize) {
        let host = match msg.args.get(skip).and_then(Arg::as_str) {
            Some(host) => host.to_string(),
            None => {
                self.metrics.unknown_command();
                tracing::warn!(command = %msg, "malformed schedule command, expected host");
                return;
            }
        };
        let port = match msg.args.get(skip + 1).and_then(Arg::as_int) {
            Some(port) if (1..=i64::from(u16::MAX)).contains(&port) => port as u16,
            _ => {
                self.metrics.unknown_command();
                tracing::warn!(command = %msg, "malformed schedule command, expected port");
                return;
            }
        };
        let address = match msg.args.get(skip + 2).and_then(Arg::as_str) {
            Some(address) => address.to_string(),
            None => {
                self.metrics.unknown_command();
                tracing::warn!(command = %msg, "malformed schedule command, expected address");
                return;
            }
        };

        let tracker = self.registry.resolve(tag);

        // Encode the forwarded command once; it is transmitted verbatim.
        let forwarded = Message {
            address,
            args: msg.args[skip + 3..].to_vec(),
        };
        let payload = encode(&forwarded);

        let delay_ms = round_millis(time - now_unix());

        if delay_ms > NO_DELAY_THRESHOLD_MS {
            let forward = Forward::new(time, host, port, payload);
            // Arm first, register second; a fire that beats registration
            // resolves through the relay's stale check.
            let handle = timer::arm(
                Duration::from_millis(delay_ms as u64),
                self.relay.clone(),
                forward,
                tracker.clone(),
            );
            tracker.track(handle, time);
            self.metrics.delivery_scheduled();
            tracing::trace!(tag, delay_ms, "delivery scheduled");
        } else {
            self.relay.forward(Forward::new(time, host, port, payload));
            self.metrics.delivery_immediate();
            tracing::trace!(tag, delay_ms, "delivery forwarded immediately");
        }
    }
}

/// Milliseconds until `delta_secs`, rounded half away from zero
///
/// `f64::round` rounds half-way cases away from zero, which is the
/// rounding the 1 ms threshold comparison is defined over.
fn round_millis(delta_secs: f64) -> i64 {
    (delta_secs * 1000.0).round() as i64
}

#[cfg(test)]
#[path = "dispatcher_test.rs"]
mod dispatcher_test;
