//! Core data types used throughout the assetsync library
//!
//! This module contains the plain records shared between the event pipeline
//! stages and the reports handed back to the host.
//!
//! ## Overview
//!
//! - **Raw input**: `RawEvent`, `RawEventKind` - what an OS watcher observed
//! - **Normalized events**: `FileEvent`, `FileEventKind` - what the pipeline works on
//! - **Roots**: `WatchRoot` - which watched tree an event belongs to
//! - **Reports**: `DrainReport`, `PropagationReport`, `ProgressInfo`
//!
//! ## Examples
//!
//! ```rust
//! use assetsync::types::{FileEvent, FileEventKind};
//! use std::path::PathBuf;
//!
//! let event = FileEvent::renamed("/data/old.scene", "/data/new.scene", false);
//! assert_eq!(event.kind, FileEventKind::Renamed);
//! assert_eq!(event.old_path, PathBuf::from("/data/old.scene"));
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Which watched tree an event was observed in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WatchRoot {
    /// The managed data tree holding assets
    Data,
    /// The auxiliary source tree holding original authoring files
    Source,
    /// A plugin binary directory
    Plugin,
}

/// Kind of change carried by a raw notification
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RawEventKind {
    /// A new entry appeared
    Created,
    /// An existing entry was written to
    Changed,
    /// An entry disappeared
    Deleted,
    /// An entry was renamed or moved; carries the pre-rename path
    Renamed {
        /// Absolute path before the rename
        from: PathBuf,
    },
}

/// A single notification as delivered by an OS watcher
///
/// Raw events are not assumed to be ordered causally and may be duplicated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawEvent {
    /// Absolute path the notification is about (the new path for renames)
    pub path: PathBuf,
    /// What happened
    pub kind: RawEventKind,
}

impl RawEvent {
    /// Create a raw event
    pub fn new(path: impl Into<PathBuf>, kind: RawEventKind) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }

    /// Create a raw rename notification
    pub fn renamed(from: impl Into<PathBuf>, to: impl Into<PathBuf>) -> Self {
        Self {
            path: to.into(),
            kind: RawEventKind::Renamed { from: from.into() },
        }
    }
}

/// Kind of a normalized file event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FileEventKind {
    /// Entry was created
    Created,
    /// Entry content changed
    Changed,
    /// Entry was deleted
    Deleted,
    /// Entry was renamed or moved
    Renamed,
}

impl fmt::Display for FileEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FileEventKind::Created => "Created",
            FileEventKind::Changed => "Changed",
            FileEventKind::Deleted => "Deleted",
            FileEventKind::Renamed => "Renamed",
        };
        f.write_str(name)
    }
}

/// Normalized filesystem event
///
/// `old_path` equals `path` unless the event is a rename. Two events are
/// equal iff all four fields match.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileEvent {
    /// Absolute current path
    pub path: PathBuf,
    /// Absolute pre-change path
    pub old_path: PathBuf,
    /// Whether the event is about a directory
    pub is_directory: bool,
    /// What happened
    pub kind: FileEventKind,
}

impl FileEvent {
    /// Create a non-rename event (`old_path == path`)
    pub fn new(path: impl Into<PathBuf>, kind: FileEventKind, is_directory: bool) -> Self {
        let path = path.into();
        Self {
            old_path: path.clone(),
            path,
            is_directory,
            kind,
        }
    }

    /// Create a created event
    pub fn created(path: impl Into<PathBuf>, is_directory: bool) -> Self {
        Self::new(path, FileEventKind::Created, is_directory)
    }

    /// Create a changed event
    pub fn changed(path: impl Into<PathBuf>, is_directory: bool) -> Self {
        Self::new(path, FileEventKind::Changed, is_directory)
    }

    /// Create a deleted event
    pub fn deleted(path: impl Into<PathBuf>, is_directory: bool) -> Self {
        Self::new(path, FileEventKind::Deleted, is_directory)
    }

    /// Create a rename event from `old_path` to `path`
    pub fn renamed(
        old_path: impl Into<PathBuf>,
        path: impl Into<PathBuf>,
        is_directory: bool,
    ) -> Self {
        Self {
            path: path.into(),
            old_path: old_path.into(),
            is_directory,
            kind: FileEventKind::Renamed,
        }
    }

    /// Translate a raw notification into a normalized event
    pub fn from_raw(raw: RawEvent, is_directory: bool) -> Self {
        match raw.kind {
            RawEventKind::Created => Self::created(raw.path, is_directory),
            RawEventKind::Changed => Self::changed(raw.path, is_directory),
            RawEventKind::Deleted => Self::deleted(raw.path, is_directory),
            RawEventKind::Renamed { from } => Self::renamed(from, raw.path, is_directory),
        }
    }

    /// Whether this is a rename that does not actually change the path
    pub fn is_noop_rename(&self) -> bool {
        self.kind == FileEventKind::Renamed && self.old_path == self.path
    }

    /// File name of the current path
    pub fn file_name(&self) -> Option<&std::ffi::OsStr> {
        self.path.file_name()
    }

    /// File name of the pre-change path
    pub fn old_file_name(&self) -> Option<&std::ffi::OsStr> {
        self.old_path.file_name()
    }
}

impl fmt::Display for FileEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.kind == FileEventKind::Renamed {
            write!(
                f,
                "{} '{}' -> '{}'",
                self.kind,
                self.old_path.display(),
                self.path.display()
            )
        } else {
            write!(f, "{} '{}'", self.kind, self.path.display())
        }
    }
}

/// Statistics about a single drain cycle
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DrainReport {
    /// Events found in the buffers before aggregation
    pub events_received: usize,
    /// Events left after aggregation and filtering
    pub events_processed: usize,
    /// Cache entries evicted (single paths or subtrees)
    pub evictions: usize,
    /// Source/media paths handed to the recycle bin
    pub recycled: Vec<PathBuf>,
    /// Source/media moves performed (old, new)
    pub mirrored_moves: Vec<(PathBuf, PathBuf)>,
    /// Renames accepted for global propagation
    pub renames_batched: usize,
    /// Source files added to the reimport schedule
    pub reimports_scheduled: usize,
    /// Non-fatal problems encountered
    pub warnings: Vec<String>,
}

impl DrainReport {
    /// Check if the drain did anything at all
    pub fn is_empty(&self) -> bool {
        self.events_received == 0
    }

    /// Fold another report into this one
    pub fn merge(&mut self, other: DrainReport) {
        self.events_received += other.events_received;
        self.events_processed += other.events_processed;
        self.evictions += other.evictions;
        self.recycled.extend(other.recycled);
        self.mirrored_moves.extend(other.mirrored_moves);
        self.renames_batched += other.renames_batched;
        self.reimports_scheduled += other.reimports_scheduled;
        self.warnings.extend(other.warnings);
    }
}

/// Result of one global rename propagation
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PropagationReport {
    /// Number of rename events in the batch
    pub renames: usize,
    /// Total references rewritten
    pub references_rewritten: usize,
    /// Files loaded detached, rewritten and saved back
    pub files_saved: Vec<PathBuf>,
    /// Files skipped by the type pre-filter or because they failed to load
    pub files_skipped: usize,
    /// Cached resources that were modified in place
    pub modified_cached: Vec<PathBuf>,
    /// Time taken in milliseconds
    pub duration_ms: u64,
    /// Any warnings during propagation
    pub warnings: Vec<String>,
}

/// Information passed to progress callbacks
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressInfo {
    /// Operation being performed
    pub operation: String,
    /// Current item being processed
    pub current_item: Option<String>,
    /// Fraction of the operation completed, in `0.0..=1.0`
    pub fraction: f32,
}

impl ProgressInfo {
    /// Get progress as a percentage (0-100)
    pub fn percentage(&self) -> f32 {
        (self.fraction.clamp(0.0, 1.0)) * 100.0
    }
}
