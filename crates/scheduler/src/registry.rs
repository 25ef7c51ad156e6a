//! Tag registry
//!
//! Process-wide map from tag name to its tracker, owned by the command
//! dispatcher. Trackers are created lazily on first use of a tag and never
//! reaped: the map grows for the process lifetime. That growth is a
//! documented characteristic of the system, bounded in practice by the
//! number of distinct tags senders use.

use std::collections::HashMap;

use crate::tracker::{self, TrackerHandle};

/// Tag used when a command does not name one
pub const DEFAULT_TAG: &str = "default";

/// Registry from tag name to tracker handle
#[derive(Debug, Default)]
pub struct TagRegistry {
    trackers: HashMap<String, TrackerHandle>,
}

impl TagRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the tracker for `tag`, spawning it on first use
    pub fn resolve(&mut self, tag: &str) -> TrackerHandle {
        if let Some(handle) = self.trackers.get(tag) {
            return handle.clone();
        }

        tracing::debug!(tag, "creating tracker");
        let handle = tracker::spawn(tag);
        self.trackers.insert(tag.to_string(), handle.clone());
        handle
    }

    /// Number of trackers created so far
    pub fn len(&self) -> usize {
        self.trackers.len()
    }

    /// Whether no tracker has been created yet
    pub fn is_empty(&self) -> bool {
        self.trackers.is_empty()
    }
}
