//! Per-root buffer of pending filesystem events
//!
//! Watchers push raw notifications here between drain cycles. The buffer keeps
//! arrival order but holds at most one event per `(path, kind)` pair, so a burst
//! of identical notifications collapses into the latest observation.

use crate::collaborators::PathVisibility;
use crate::types::{FileEvent, FileEventKind, RawEvent};
use std::path::Path;
use tracing::trace;

/// Ordered, deduplicated queue of events for one watched root
#[derive(Debug, Default, Clone)]
pub struct EventBuffer {
    events: Vec<FileEvent>,
}

impl EventBuffer {
    /// Create an empty buffer
    pub fn new() -> Self {
        Self::default()
    }

    /// Translate and append a raw notification
    ///
    /// Events for paths rejected by `visibility` are dropped. Any earlier
    /// buffered event with the same path and kind is removed before appending.
    ///
    /// # Returns
    ///
    /// `true` if the event was buffered, `false` if it was filtered out.
    pub fn push(&mut self, raw: RawEvent, is_directory: bool, visibility: &dyn PathVisibility) -> bool {
        if raw.path.as_os_str().is_empty() || !visibility.is_visible(&raw.path) {
            trace!("Ignoring event for hidden path {}", raw.path.display());
            return false;
        }

        let event = FileEvent::from_raw(raw, is_directory);
        self.remove_matching(&event.path, event.kind);
        trace!("Buffered {}", event);
        self.events.push(event);
        true
    }

    /// Number of buffered events
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Whether nothing is buffered
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Buffered events in arrival order
    pub fn events(&self) -> &[FileEvent] {
        &self.events
    }

    /// Take all buffered events, leaving the buffer empty
    pub fn take(&mut self) -> Vec<FileEvent> {
        std::mem::take(&mut self.events)
    }

    fn remove_matching(&mut self, path: &Path, kind: FileEventKind) {
        self.events.retain(|e| !(e.kind == kind && e.path == path));
    }
}
