//! cued scheduling and relay core
//!
//! The engine behind the daemon: a command dispatcher that turns inbound
//! datagrams into immediate or deferred deliveries, per-tag trackers that
//! own the cancelable-timer set for their tag, and the cue relay that
//! performs every outbound transmission and serves the runtime-toggleable
//! cue intake.
//!
//! # Concurrency Model
//!
//! One tokio task per actor: the dispatcher, the relay, each tracker, and
//! each armed timer. Every piece of mutable state (tracker maps, relay
//! flags and sockets, the tag registry) is owned by exactly one task and
//! mutated only there; coordination happens purely over unbounded mpsc
//! channels. There is no ordering guarantee across different actors'
//! inboxes, and no backpressure - heavy traffic costs memory, never blocks
//! a producer.
//!
//! # Cancellation Policy
//!
//! Timer cancellation is logical and best-effort. A `TimerHandle`'s token
//! records the cancellation request; the relay re-checks that token
//! immediately before transmitting a fired delivery and drops it as stale
//! if cancellation came first. A delivery is therefore never both
//! transmitted and canceled.

pub mod dispatcher;
pub mod metrics;
pub mod registry;
pub mod relay;
pub mod timer;
pub mod tracker;

pub use dispatcher::{Dispatcher, DispatcherConfig, DispatcherError, NO_DELAY_THRESHOLD_MS};
pub use metrics::{DispatcherMetrics, DispatcherSnapshot, RelayMetrics, RelaySnapshot};
pub use registry::{TagRegistry, DEFAULT_TAG};
pub use relay::{
    CueRelay, CueRelayConfig, Forward, RelayCommand, RelayError, RelayHandle, CUE_WRAP_ADDRESS,
};
pub use timer::TimerHandle;
pub use tracker::{ScheduledEntry, TrackerHandle};
