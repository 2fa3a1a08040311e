//! Self-write suppression for data-tree change events
//!
//! When the editor saves a resource, the OS watcher reports that write a little
//! later, possibly on a later drain cycle than the save itself. Those events must
//! not be mistaken for external edits, otherwise every save would trigger a
//! reload prompt.
//!
//! Instead of a wall-clock TTL, suppression is measured in drain cycles using two
//! generations of paths. A flagged path lives in `current` until the next aging
//! step moves it into `previous`; the aging step after that forgets it. A path is
//! therefore suppressed for at least one full drain cycle regardless of how the
//! save and its notification interleave with the idle tick.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::trace;

/// Two-generation set of paths recently written by the editor itself
#[derive(Debug, Default, Clone)]
pub struct SelfModificationSet {
    /// Paths flagged since the last aging step (or carried over from it)
    current: HashSet<PathBuf>,
    /// Paths that were already known at the last aging step
    previous: HashSet<PathBuf>,
}

impl SelfModificationSet {
    /// Creates an empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks a path as written by the editor
    ///
    /// Relative paths are made absolute against the working directory so that
    /// they compare equal to the absolute paths delivered by the watchers.
    /// Empty paths are ignored. Re-flagging a path restarts its aging window.
    pub fn flag(&mut self, path: &Path) {
        if path.as_os_str().is_empty() {
            return;
        }
        let full = normalize(path);
        trace!("Flagged as editor-modified: {}", full.display());
        self.previous.remove(&full);
        self.current.insert(full);
    }

    /// Checks whether a path is currently suppressed
    pub fn contains(&self, path: &Path) -> bool {
        self.current.contains(&normalize(path))
    }

    /// Ages the set by one drain cycle
    ///
    /// Paths that were already present at the previous aging step are dropped,
    /// everything else is remembered for one more cycle.
    pub fn age(&mut self) {
        for path in self.previous.drain() {
            self.current.remove(&path);
        }
        self.previous.extend(self.current.iter().cloned());
    }

    /// Number of suppressed paths
    pub fn len(&self) -> usize {
        self.current.len()
    }

    /// Returns true if nothing is suppressed
    pub fn is_empty(&self) -> bool {
        self.current.is_empty()
    }
}

fn normalize(path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
    }
}
