//! Source-tree change handling
//!
//! Only one thing matters in the source tree: a media file that was modified by
//! an external authoring tool needs to be re-imported into the data tree. Those
//! files are collected in a [`ReimportSchedule`] while the user works in the
//! other application, and handed to the [`Reimporter`] once the editor regains
//! focus.

use crate::collaborators::Reimporter;
use crate::types::{FileEvent, FileEventKind};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;
use tracing::{debug, info, trace};

/// Set of source media files waiting to be re-imported
#[derive(Debug, Default, Clone)]
pub struct ReimportSchedule {
    paths: BTreeSet<PathBuf>,
}

impl ReimportSchedule {
    /// Create an empty schedule
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule every changed file located under `media_root`
    ///
    /// # Returns
    ///
    /// Number of paths newly added to the schedule.
    pub fn schedule_changes(&mut self, events: &[FileEvent], media_root: &Path) -> usize {
        let mut added = 0;
        for event in events {
            if event.kind != FileEventKind::Changed {
                continue;
            }
            if !event.path.starts_with(media_root) || !event.path.is_file() {
                trace!("Ignoring source change outside media: {}", event.path.display());
                continue;
            }
            if self.paths.insert(event.path.clone()) {
                trace!("Scheduled for reimport: {}", event.path.display());
                added += 1;
            }
        }
        added
    }

    /// Scheduled paths
    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.paths.iter().map(PathBuf::as_path)
    }

    /// Number of scheduled paths
    pub fn len(&self) -> usize {
        self.paths.len()
    }

    /// Whether nothing is scheduled
    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Hand every scheduled file that still exists to the reimporter
    ///
    /// Waits for `grace` first so that the external writer can release its
    /// file locks. The schedule is cleared even when files vanished in the
    /// meantime.
    ///
    /// # Returns
    ///
    /// The paths that were handed over.
    pub fn flush(&mut self, grace: Duration, reimporter: &mut dyn Reimporter) -> Vec<PathBuf> {
        if self.paths.is_empty() {
            return Vec::new();
        }
        if !grace.is_zero() {
            thread::sleep(grace);
        }

        let scheduled = std::mem::take(&mut self.paths);
        let total = scheduled.len();
        let existing: Vec<PathBuf> = scheduled.into_iter().filter(|p| p.is_file()).collect();
        if existing.len() < total {
            debug!("{} scheduled source files vanished before reimport", total - existing.len());
        }
        if !existing.is_empty() {
            info!("Reimporting {} source files", existing.len());
            reimporter.reimport(&existing);
        }
        existing
    }
}
