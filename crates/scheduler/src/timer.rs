//! Timer facility
//!
//! One-shot deferred deliveries. `arm` spawns a task that sleeps for the
//! requested delay and then hands the prepared forward to the cue relay.
//!
//! # Cancellation
//!
//! Cancellation is asynchronous and best-effort: `TimerHandle::cancel` sets
//! the handle's token and returns immediately. A timer whose sleep has
//! already completed may still deliver its fire message; the relay checks
//! the same token right before transmitting and drops the forward as stale
//! if cancellation was requested first. The token is therefore both the
//! cancellation request and the stale marker, which makes the fire/cancel
//! race resolve deterministically at the single point of transmission.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::relay::{FireContext, Forward, RelayHandle};
use crate::tracker::TrackerHandle;

/// Timer handle ids, unique for the process lifetime
static NEXT_TIMER_ID: AtomicU64 = AtomicU64::new(1);

/// Opaque reference to one armed deferred delivery
///
/// Created by `arm`, consumed exactly once by either firing or
/// cancellation.
#[derive(Debug, Clone)]
pub struct TimerHandle {
    id: u64,
    token: CancellationToken,
}

impl TimerHandle {
    fn next() -> Self {
        Self {
            id: NEXT_TIMER_ID.fetch_add(1, Ordering::Relaxed),
            token: CancellationToken::new(),
        }
    }

    /// Process-unique id of this timer
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Request cancellation (asynchronous, best-effort)
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Whether cancellation has been requested
    pub fn is_canceled(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// Arm a one-shot delivery
///
/// Fills in the forward's fire context (this handle plus the owning
/// tracker) and spawns the sleep task. On expiry the forward is delivered
/// to the relay inbox; the relay transmits it and then tells the tracker to
/// forget the handle. If the handle is canceled while the timer is still
/// sleeping, nothing is delivered.
pub fn arm(
    delay: Duration,
    relay: RelayHandle,
    mut forward: Forward,
    tracker: TrackerHandle,
) -> TimerHandle {
    let handle = TimerHandle::next();
    forward.fire = Some(FireContext {
        handle: handle.clone(),
        tracker,
    });

    let token = handle.token.clone();
    let id = handle.id;
    tokio::spawn(async move {
        tokio::select! {
            biased;

            _ = token.cancelled() => {
                tracing::trace!(timer_id = id, "timer canceled before firing");
            }

            _ = tokio::time::sleep(delay) => {
                relay.forward(forward);
            }
        }
    });

    handle
}

#[cfg(test)]
impl TimerHandle {
    /// Test-only handle with a fresh id and token, not wired to any task
    pub(crate) fn for_test() -> Self {
        Self::next()
    }
}

#[cfg(test)]
#[path = "timer_test.rs"]
mod timer_test;
