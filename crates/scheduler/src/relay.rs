//! Cue relay
//!
//! The cue-facing control loop. Owns the cue intake socket, whose bind
//! scope (loopback-only vs all interfaces) is runtime-toggleable, and
//! performs every outbound transmission: wrapped cues to the observer and
//! fired or immediate scheduled forwards to their destinations.
//!
//! # Sockets
//!
//! Outbound transmissions go through a dedicated unbound send socket, not
//! the intake socket. Rebinding the intake therefore never interferes with
//! a forward in progress, and a loopback-restricted intake never restricts
//! forward destinations.
//!
//! # Rebinding
//!
//! Toggling the bind scope closes the old socket, then opens a new one on
//! the same port. Datagrams in flight during the swap may be lost, which is
//! consistent with the at-most-once delivery model of the whole system.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use cued_protocol::{decode, encode, Bytes, Message, Packet};

use crate::metrics::RelayMetrics;
use crate::timer::TimerHandle;
use crate::tracker::TrackerHandle;

/// Address wrapped cues are sent under
pub const CUE_WRAP_ADDRESS: &str = "/external-osc-cue";

/// Default cue intake port
const DEFAULT_CUE_PORT: u16 = 4559;

/// Default observer endpoint for relayed cues
const DEFAULT_OBSERVER_HOST: &str = "127.0.0.1";
const DEFAULT_OBSERVER_PORT: u16 = 4558;

/// Default idle heartbeat interval
const DEFAULT_HEARTBEAT: Duration = Duration::from_secs(60);

/// Default maximum datagram size (64KB, the UDP ceiling)
const DEFAULT_MAX_DATAGRAM: usize = 64 * 1024;

/// Cue relay configuration
#[derive(Debug, Clone)]
pub struct CueRelayConfig {
    /// Intake port
    pub cue_port: u16,

    /// Observer host wrapped cues are relayed to
    pub observer_host: String,

    /// Observer port wrapped cues are relayed to
    pub observer_port: u16,

    /// Initial bind scope: true = loopback only
    pub internal: bool,

    /// Initial relaying flag
    pub enabled: bool,

    /// Idle heartbeat interval
    pub heartbeat: Duration,

    /// Receive buffer size
    pub max_datagram: usize,
}

impl Default for CueRelayConfig {
    fn default() -> Self {
        Self {
            cue_port: DEFAULT_CUE_PORT,
            observer_host: DEFAULT_OBSERVER_HOST.into(),
            observer_port: DEFAULT_OBSERVER_PORT,
            internal: true,
            enabled: false,
            heartbeat: DEFAULT_HEARTBEAT,
            max_datagram: DEFAULT_MAX_DATAGRAM,
        }
    }
}

/// Cue relay errors
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// Failed to bind a socket at startup
    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// One outbound transmission: a relayed delivery to its destination
#[derive(Debug)]
pub struct Forward {
    /// Originally intended absolute delivery time (diagnostics only)
    pub time: f64,

    /// Destination host
    pub host: String,

    /// Destination port
    pub port: u16,

    /// Encoded command bytes, transmitted verbatim
    pub payload: Bytes,

    /// Present when this forward comes from a fired timer
    pub fire: Option<FireContext>,
}

impl Forward {
    /// Create a forward with no fire context (immediate dispatch)
    pub fn new(time: f64, host: impl Into<String>, port: u16, payload: Bytes) -> Self {
        Self {
            time,
            host: host.into(),
            port,
            payload,
            fire: None,
        }
    }
}

/// Links a fired forward back to its timer handle and owning tracker
#[derive(Debug)]
pub struct FireContext {
    pub(crate) handle: TimerHandle,
    pub(crate) tracker: TrackerHandle,
}

/// Commands served by the relay, in arrival order
#[derive(Debug)]
pub enum RelayCommand {
    /// Transmit a payload to its destination (independent of the flags)
    Forward(Forward),
    /// Change the intake bind scope (rebinds if it actually changes)
    SetInternal(bool),
    /// Enable or disable cue relaying (no socket change)
    SetEnabled(bool),
}

/// Cheap clonable sender half of the relay
#[derive(Debug, Clone)]
pub struct RelayHandle {
    tx: mpsc::UnboundedSender<RelayCommand>,
}

impl RelayHandle {
    /// Queue an outbound transmission
    pub fn forward(&self, forward: Forward) {
        self.send(RelayCommand::Forward(forward));
    }

    /// Queue a bind-scope change
    pub fn set_internal(&self, internal: bool) {
        self.send(RelayCommand::SetInternal(internal));
    }

    /// Queue an enable/disable change
    pub fn set_enabled(&self, enabled: bool) {
        self.send(RelayCommand::SetEnabled(enabled));
    }

    fn send(&self, cmd: RelayCommand) {
        if self.tx.send(cmd).is_err() {
            tracing::trace!("relay inbox closed, command dropped");
        }
    }

    /// Test-only handle wired to a bare receiver instead of a relay task
    #[cfg(test)]
    pub(crate) fn for_test() -> (Self, mpsc::UnboundedReceiver<RelayCommand>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

/// The cue-facing control loop
pub struct CueRelay {
    config: CueRelayConfig,

    /// Intake port actually bound (resolved when the config asks for 0)
    port: u16,

    /// Rebindable intake socket; None only if a rebind failed entirely
    intake: Option<UdpSocket>,

    /// Stable outbound socket for all transmissions
    outbound: UdpSocket,

    /// Current bind scope
    internal: bool,

    /// Current relaying flag
    enabled: bool,

    rx: mpsc::UnboundedReceiver<RelayCommand>,
    metrics: Arc<RelayMetrics>,
    cancel: CancellationToken,

    /// Whether any intake traffic arrived since the last heartbeat tick
    traffic_seen: bool,
}

impl CueRelay {
    /// Bind the intake and outbound sockets and create the relay
    ///
    /// # Errors
    ///
    /// Returns `RelayError::Bind` if either socket cannot be bound. This is
    /// the only fatal error the relay can produce; everything after startup
    /// is recoverable.
    pub async fn bind(
        config: CueRelayConfig,
        cancel: CancellationToken,
    ) -> Result<(Self, RelayHandle), RelayError> {
        let intake = bind_scoped(config.cue_port, config.internal).map_err(|e| {
            RelayError::Bind {
                address: scope_addr(config.cue_port, config.internal).to_string(),
                source: e,
            }
        })?;
        let port = intake.local_addr()?.port();

        let outbound = UdpSocket::bind("0.0.0.0:0")
            .await
            .map_err(|e| RelayError::Bind {
                address: "0.0.0.0:0".into(),
                source: e,
            })?;

        let (tx, rx) = mpsc::unbounded_channel();

        let relay = Self {
            internal: config.internal,
            enabled: config.enabled,
            config,
            port,
            intake: Some(intake),
            outbound,
            rx,
            metrics: Arc::new(RelayMetrics::new()),
            cancel,
            traffic_seen: false,
        };

        Ok((relay, RelayHandle { tx }))
    }

    /// The intake address actually bound
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.intake.as_ref().and_then(|s| s.local_addr().ok())
    }

    /// Get metrics reference
    pub fn metrics(&self) -> Arc<RelayMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Run the relay until shutdown
    pub async fn run(mut self) {
        tracing::info!(
            port = self.port,
            internal = self.internal,
            enabled = self.enabled,
            observer = %self.observer_addr(),
            "cue relay started"
        );

        let mut buf = vec![0u8; self.config.max_datagram];
        let mut heartbeat = tokio::time::interval_at(
            tokio::time::Instant::now() + self.config.heartbeat,
            self.config.heartbeat,
        );
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;

                _ = self.cancel.cancelled() => break,

                cmd = self.rx.recv() => match cmd {
                    Some(cmd) => self.handle_command(cmd).await,
                    None => break,
                },

                recv = recv_intake(&self.intake, &mut buf) => match recv {
                    Ok((len, peer)) => {
                        self.traffic_seen = true;
                        self.handle_cue(&buf[..len], peer).await;
                    }
                    Err(e) => {
                        // Transient (e.g. an ICMP-driven reset notification);
                        // the loop keeps serving.
                        self.metrics.transport_error();
                        tracing::debug!(error = %e, "cue intake recv error, ignoring");
                    }
                },

                _ = heartbeat.tick() => {
                    if !self.traffic_seen {
                        tracing::trace!(port = self.port, "cue intake idle");
                    }
                    self.traffic_seen = false;
                }
            }
        }

        let s = self.metrics.snapshot();
        tracing::info!(
            cues_received = s.cues_received,
            cues_relayed = s.cues_relayed,
            forwards_sent = s.forwards_sent,
            stale_fires_dropped = s.stale_fires_dropped,
            rebinds = s.rebinds,
            "cue relay stopped"
        );
    }

    fn observer_addr(&self) -> String {
        format!("{}:{}", self.config.observer_host, self.config.observer_port)
    }

    /// Serve one inbox command
    async fn handle_command(&mut self, cmd: RelayCommand) {
        match cmd {
            RelayCommand::Forward(forward) => self.transmit(forward).await,

            RelayCommand::SetInternal(internal) => {
                if internal == self.internal {
                    tracing::debug!(internal, "cue intake scope unchanged");
                    return;
                }
                self.rebind(internal);
            }

            RelayCommand::SetEnabled(enabled) => {
                self.enabled = enabled;
                tracing::info!(enabled, "cue relaying toggled");
            }
        }
    }

    /// Transmit a forward to its destination
    ///
    /// Independent of the `internal`/`enabled` flags. Fires whose handle
    /// was canceled after the timer expired are dropped as stale; anything
    /// actually fired is then forgotten by its tracker, whether or not the
    /// send itself succeeded (at-most-once: the delivery was consumed).
    async fn transmit(&mut self, forward: Forward) {
        if let Some(ctx) = &forward.fire {
            if ctx.handle.is_canceled() {
                self.metrics.stale_fire_dropped();
                tracing::debug!(
                    timer_id = ctx.handle.id(),
                    tag = %ctx.tracker.tag(),
                    "stale fire dropped"
                );
                return;
            }
        }

        match self
            .outbound
            .send_to(&forward.payload, (forward.host.as_str(), forward.port))
            .await
        {
            Ok(_) => {
                self.metrics.forward_sent();
                tracing::trace!(
                    host = %forward.host,
                    port = forward.port,
                    scheduled_time = forward.time,
                    "forward transmitted"
                );
            }
            Err(e) => {
                self.metrics.send_error();
                tracing::warn!(
                    host = %forward.host,
                    port = forward.port,
                    error = %e,
                    "forward transmission failed"
                );
            }
        }

        if let Some(ctx) = forward.fire {
            ctx.tracker.forget(ctx.handle.id());
        }
    }

    /// Serve one inbound cue datagram
    async fn handle_cue(&mut self, data: &[u8], peer: SocketAddr) {
        self.metrics.cue_received();

        let msg = match decode(data) {
            Ok(Packet::Message(msg)) => msg,
            Ok(Packet::Bundle(_)) => {
                tracing::debug!(peer = %peer, "unexpected bundle on cue intake, ignoring");
                return;
            }
            Err(e) => {
                tracing::warn!(
                    peer = %peer,
                    len = data.len(),
                    error = %e,
                    "failed to decode cue datagram, ignoring"
                );
                return;
            }
        };

        if !self.enabled {
            self.metrics.cue_dropped();
            tracing::debug!(peer = %peer, address = %msg.address, "cue relaying disabled, dropped");
            return;
        }

        let wrapped = wrap_cue(&msg, peer);
        let observer = (self.config.observer_host.as_str(), self.config.observer_port);

        match self.outbound.send_to(&encode(&wrapped), observer).await {
            Ok(_) => {
                self.metrics.cue_relayed();
                tracing::trace!(peer = %peer, address = %msg.address, "cue relayed");
            }
            Err(e) => {
                self.metrics.send_error();
                tracing::warn!(error = %e, "cue relay transmission failed");
            }
        }
    }

    /// Swap the intake socket for one with the new bind scope
    fn rebind(&mut self, internal: bool) {
        // Drop the old socket first: the new bind is on the same port.
        self.intake = None;

        match bind_scoped(self.port, internal) {
            Ok(sock) => {
                self.intake = Some(sock);
                self.internal = internal;
                self.metrics.rebind();
                tracing::info!(port = self.port, internal, "cue intake rebound");
            }
            Err(e) => {
                tracing::error!(
                    port = self.port,
                    internal,
                    error = %e,
                    "cue intake rebind failed, restoring previous scope"
                );
                match bind_scoped(self.port, self.internal) {
                    Ok(sock) => self.intake = Some(sock),
                    Err(e) => {
                        // Forwards still work through the outbound socket.
                        tracing::error!(
                            port = self.port,
                            error = %e,
                            "could not restore cue intake socket, intake disabled"
                        );
                    }
                }
            }
        }
    }
}

/// Receive from the intake socket, or park forever while it is unbound
async fn recv_intake(
    intake: &Option<UdpSocket>,
    buf: &mut [u8],
) -> std::io::Result<(usize, SocketAddr)> {
    match intake {
        Some(sock) => sock.recv_from(buf).await,
        None => std::future::pending().await,
    }
}

/// Wrap an inbound cue for the observer:
/// `/external-osc-cue senderIp senderPort ...originalCommand`
fn wrap_cue(msg: &Message, peer: SocketAddr) -> Message {
    let mut wrapped = Message::new(CUE_WRAP_ADDRESS)
        .arg(peer.ip().to_string())
        .arg(i32::from(peer.port()))
        .arg(msg.address.clone());
    wrapped.args.extend(msg.args.iter().cloned());
    wrapped
}

fn scope_addr(port: u16, internal: bool) -> SocketAddr {
    let ip = if internal {
        IpAddr::V4(Ipv4Addr::LOCALHOST)
    } else {
        IpAddr::V4(Ipv4Addr::UNSPECIFIED)
    };
    SocketAddr::new(ip, port)
}

/// Build an intake socket for the given scope
///
/// `SO_REUSEADDR` is set so a rebind on the same port succeeds promptly
/// after the previous socket closes.
fn bind_scoped(port: u16, internal: bool) -> std::io::Result<UdpSocket> {
    let addr = scope_addr(port, internal);

    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    socket.bind(&addr.into())?;
    socket.set_nonblocking(true)?;

    let std_socket: std::net::UdpSocket = socket.into();
    UdpSocket::from_std(std_socket)
}

#[cfg(test)]
#[path = "relay_test.rs"]
mod relay_test;
