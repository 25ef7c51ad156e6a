//! Diagnostic counters for the two control loops
//!
//! Lightweight atomic counters, read via point-in-time snapshots. These are
//! diagnostics only - nothing in the scheduling logic depends on them.

use std::sync::atomic::{AtomicU64, Ordering};

/// Command dispatcher counters
#[derive(Debug, Default)]
pub struct DispatcherMetrics {
    /// Datagrams received on the command port
    pub datagrams_received: AtomicU64,

    /// Deliveries armed with a timer
    pub deliveries_scheduled: AtomicU64,

    /// Deliveries forwarded synchronously (at or below the no-delay threshold)
    pub deliveries_immediate: AtomicU64,

    /// Flush commands processed
    pub flushes: AtomicU64,

    /// Relay control commands processed
    pub relay_controls: AtomicU64,

    /// Unknown or unexpected command addresses
    pub unknown_commands: AtomicU64,

    /// Datagrams that failed to decode
    pub decode_errors: AtomicU64,
}

impl DispatcherMetrics {
    /// Create new metrics instance
    pub const fn new() -> Self {
        Self {
            datagrams_received: AtomicU64::new(0),
            deliveries_scheduled: AtomicU64::new(0),
            deliveries_immediate: AtomicU64::new(0),
            flushes: AtomicU64::new(0),
            relay_controls: AtomicU64::new(0),
            unknown_commands: AtomicU64::new(0),
            decode_errors: AtomicU64::new(0),
        }
    }

    /// Record a received datagram
    #[inline]
    pub fn datagram_received(&self) {
        self.datagrams_received.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an armed delivery
    #[inline]
    pub fn delivery_scheduled(&self) {
        self.deliveries_scheduled.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a synchronous forward
    #[inline]
    pub fn delivery_immediate(&self) {
        self.deliveries_immediate.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a flush command
    #[inline]
    pub fn flush(&self) {
        self.flushes.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a relay control command
    #[inline]
    pub fn relay_control(&self) {
        self.relay_controls.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an unknown command address
    #[inline]
    pub fn unknown_command(&self) {
        self.unknown_commands.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a decode failure
    #[inline]
    pub fn decode_error(&self) {
        self.decode_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Get snapshot of all counters
    pub fn snapshot(&self) -> DispatcherSnapshot {
        DispatcherSnapshot {
            datagrams_received: self.datagrams_received.load(Ordering::Relaxed),
            deliveries_scheduled: self.deliveries_scheduled.load(Ordering::Relaxed),
            deliveries_immediate: self.deliveries_immediate.load(Ordering::Relaxed),
            flushes: self.flushes.load(Ordering::Relaxed),
            relay_controls: self.relay_controls.load(Ordering::Relaxed),
            unknown_commands: self.unknown_commands.load(Ordering::Relaxed),
            decode_errors: self.decode_errors.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time snapshot of dispatcher counters
#[derive(Debug, Clone, Copy, Default)]
pub struct DispatcherSnapshot {
    pub datagrams_received: u64,
    pub deliveries_scheduled: u64,
    pub deliveries_immediate: u64,
    pub flushes: u64,
    pub relay_controls: u64,
    pub unknown_commands: u64,
    pub decode_errors: u64,
}

/// Cue relay counters
#[derive(Debug, Default)]
pub struct RelayMetrics {
    /// Datagrams received on the cue intake port
    pub cues_received: AtomicU64,

    /// Cues wrapped and relayed to the observer
    pub cues_relayed: AtomicU64,

    /// Cues dropped because relaying was disabled
    pub cues_dropped: AtomicU64,

    /// Scheduled/immediate forwards transmitted
    pub forwards_sent: AtomicU64,

    /// Fires dropped because cancellation was requested first
    pub stale_fires_dropped: AtomicU64,

    /// Outbound send failures
    pub send_errors: AtomicU64,

    /// Intake socket rebinds
    pub rebinds: AtomicU64,

    /// Transient intake receive errors
    pub transport_errors: AtomicU64,
}

impl RelayMetrics {
    /// Create new metrics instance
    pub const fn new() -> Self {
        Self {
            cues_received: AtomicU64::new(0),
            cues_relayed: AtomicU64::new(0),
            cues_dropped: AtomicU64::new(0),
            forwards_sent: AtomicU64::new(0),
            stale_fires_dropped: AtomicU64::new(0),
            send_errors: AtomicU64::new(0),
            rebinds: AtomicU64::new(0),
            transport_errors: AtomicU64::new(0),
        }
    }

    /// Record a received cue datagram
    #[inline]
    pub fn cue_received(&self) {
        self.cues_received.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a relayed cue
    #[inline]
    pub fn cue_relayed(&self) {
        self.cues_relayed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a dropped cue
    #[inline]
    pub fn cue_dropped(&self) {
        self.cues_dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a transmitted forward
    #[inline]
    pub fn forward_sent(&self) {
        self.forwards_sent.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a stale fire drop
    #[inline]
    pub fn stale_fire_dropped(&self) {
        self.stale_fires_dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an outbound send failure
    #[inline]
    pub fn send_error(&self) {
        self.send_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an intake rebind
    #[inline]
    pub fn rebind(&self) {
        self.rebinds.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a transient receive error
    #[inline]
    pub fn transport_error(&self) {
        self.transport_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Get snapshot of all counters
    pub fn snapshot(&self) -> RelaySnapshot {
        RelaySnapshot {
            cues_received: self.cues_received.load(Ordering::Relaxed),
            cues_relayed: self.cues_relayed.load(Ordering::Relaxed),
            cues_dropped: self.cues_dropped.load(Ordering::Relaxed),
            forwards_sent: self.forwards_sent.load(Ordering::Relaxed),
            stale_fires_dropped: self.stale_fires_dropped.load(Ordering::Relaxed),
            send_errors: self.send_errors.load(Ordering::Relaxed),
            rebinds: self.rebinds.load(Ordering::Relaxed),
            transport_errors: self.transport_errors.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time snapshot of relay counters
#[derive(Debug, Clone, Copy, Default)]
pub struct RelaySnapshot {
    pub cues_received: u64,
    pub cues_relayed: u64,
    pub cues_dropped: u64,
    pub forwards_sent: u64,
    pub stale_fires_dropped: u64,
    pub send_errors: u64,
    pub rebinds: u64,
    pub transport_errors: u64,
}
