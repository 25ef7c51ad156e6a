//! Tag tracker
//!
//! One sequential actor per tag. A tracker owns the set of pending,
//! cancelable scheduled deliveries for its tag; commands are served
//! strictly one at a time in arrival order, which is what makes the map
//! safe without locks - nothing else ever touches it.
//!
//! Trackers have no terminal state: once created they live for the process
//! lifetime (see `TagRegistry`).

use std::collections::HashMap;

use tokio::sync::mpsc;

use crate::timer::TimerHandle;

/// One pending deferred delivery
#[derive(Debug, Clone)]
pub struct ScheduledEntry {
    /// Handle used to request cancellation
    pub handle: TimerHandle,
    /// Absolute delivery time in unix seconds
    pub time: f64,
}

/// Commands served by a tracker, in arrival order
#[derive(Debug)]
pub enum TrackerCommand {
    /// Register an armed delivery
    Track { handle: TimerHandle, time: f64 },
    /// Drop a handle after it fired (absent handle is a legal no-op)
    Forget { id: u64 },
    /// Cancel every pending delivery
    FlushAll,
    /// Cancel pending deliveries scheduled strictly after `cutoff`
    FlushAfter { cutoff: f64 },
}

/// Cheap clonable sender half of a tracker
#[derive(Debug, Clone)]
pub struct TrackerHandle {
    tag: String,
    tx: mpsc::UnboundedSender<TrackerCommand>,
}

impl TrackerHandle {
    /// The tag this tracker owns
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Register `(handle, time)` with the tracker
    pub fn track(&self, handle: TimerHandle, time: f64) {
        self.send(TrackerCommand::Track { handle, time });
    }

    /// Tell the tracker a handle fired and is done
    pub fn forget(&self, id: u64) {
        self.send(TrackerCommand::Forget { id });
    }

    /// Cancel every pending delivery under this tag
    pub fn flush_all(&self) {
        self.send(TrackerCommand::FlushAll);
    }

    /// Cancel pending deliveries scheduled strictly after `cutoff`
    pub fn flush_after(&self, cutoff: f64) {
        self.send(TrackerCommand::FlushAfter { cutoff });
    }

    fn send(&self, cmd: TrackerCommand) {
        // Inbox only closes at shutdown; commands are fire-and-forget.
        if self.tx.send(cmd).is_err() {
            tracing::trace!(tag = %self.tag, "tracker inbox closed, command dropped");
        }
    }
}

/// The actor owning the cancelable-timer set for one tag
pub struct TagTracker {
    tag: String,
    rx: mpsc::UnboundedReceiver<TrackerCommand>,
    entries: HashMap<u64, ScheduledEntry>,
}

/// Spawn a tracker task for `tag` and return its handle
pub fn spawn(tag: impl Into<String>) -> TrackerHandle {
    let tag = tag.into();
    let (tx, rx) = mpsc::unbounded_channel();

    let tracker = TagTracker {
        tag: tag.clone(),
        rx,
        entries: HashMap::new(),
    };
    tokio::spawn(tracker.run());

    TrackerHandle { tag, tx }
}

impl TagTracker {
    /// Serve commands until every handle to this tracker is gone
    async fn run(mut self) {
        tracing::debug!(tag = %self.tag, "tracker started");

        while let Some(cmd) = self.rx.recv().await {
            self.handle_command(cmd);
        }

        tracing::debug!(tag = %self.tag, "tracker stopped");
    }

    /// Apply one command to the entry map
    fn handle_command(&mut self, cmd: TrackerCommand) {
        match cmd {
            TrackerCommand::Track { handle, time } => {
                // Re-tracking an id overwrites the previous entry.
                self.entries
                    .insert(handle.id(), ScheduledEntry { handle, time });
            }

            TrackerCommand::Forget { id } => {
                if self.entries.remove(&id).is_none() {
                    // Expected when a flush raced with firing - the handle
                    // was already removed and canceled.
                    tracing::trace!(
                        tag = %self.tag,
                        timer_id = id,
                        "forget for unknown handle, ignoring"
                    );
                }
            }

            TrackerCommand::FlushAll => {
                let count = self.entries.len();
                for entry in self.entries.values() {
                    entry.handle.cancel();
                }
                self.entries.clear();

                tracing::debug!(tag = %self.tag, canceled = count, "flushed all");
            }

            TrackerCommand::FlushAfter { cutoff } => {
                let before = self.entries.len();
                self.entries.retain(|_, entry| {
                    if entry.time > cutoff {
                        entry.handle.cancel();
                        false
                    } else {
                        true
                    }
                });

                tracing::debug!(
                    tag = %self.tag,
                    cutoff,
                    canceled = before - self.entries.len(),
                    retained = self.entries.len(),
                    "flushed after cutoff"
                );
            }
        }
    }
}

#[cfg(test)]
#[path = "tracker_test.rs"]
mod tracker_test;

#[cfg(test)]
impl TagTracker {
    /// Test-only constructor that does not spawn
    pub(crate) fn for_test(tag: &str) -> (Self, mpsc::UnboundedSender<TrackerCommand>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                tag: tag.to_string(),
                rx,
                entries: HashMap::new(),
            },
            tx,
        )
    }

    pub(crate) fn apply(&mut self, cmd: TrackerCommand) {
        self.handle_command(cmd);
    }

    pub(crate) fn entry_count(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn contains(&self, id: u64) -> bool {
        self.entries.contains_key(&id)
    }
}
