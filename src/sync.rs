//! Data-tree synchronization
//!
//! Applies the aggregated and filtered events of one drain cycle to the content
//! cache and the source/media tree, collects the renames that need to be
//! propagated through the project, and raises the semantic events.
//!
//! Only assets (files the catalog recognizes) and directories are of interest;
//! everything else in the data tree is ignored.
//!
//! ## Per-event handling
//!
//! - **Changed**: evict the cached copy. If the asset is the active document or
//!   has unsaved edits, the user decides whether to reload or keep it.
//! - **Deleted**: evict the entry (or the subtree) and schedule the mirrored
//!   source/media items for recycling.
//! - **Renamed**: move the cache entry (or subtree), give listeners a chance to
//!   veto propagation, then queue the rename and mirror it in the media tree.
//!   Renames of empty directories are not propagated.
//! - **Created**: nothing to do beyond raising the event.

use crate::collaborators::{Collaborators, ReloadDecision};
use crate::events::{EventBus, ResourceEvent};
use crate::mirror::{is_empty_dir, MediaMirror};
use crate::types::{DrainReport, FileEvent, FileEventKind};
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument, trace, warn};

/// Result of synchronizing one drain cycle
#[derive(Debug, Default)]
pub struct SyncOutcome {
    /// Statistics and warnings
    pub report: DrainReport,
    /// Renames accepted for global propagation, in event order
    pub rename_batch: Vec<FileEvent>,
}

/// Apply a drain cycle's events to the cache and the media tree
#[instrument(skip_all, fields(events = events.len()))]
pub fn synchronize(
    events: &[FileEvent],
    collaborators: &mut Collaborators,
    mirror: &MediaMirror,
    bus: &mut EventBus,
) -> SyncOutcome {
    let mut pass = SyncPass {
        collaborators,
        mirror,
        bus,
        outcome: SyncOutcome::default(),
        recycle: Vec::new(),
    };

    for event in events {
        match event.kind {
            FileEventKind::Changed => pass.on_changed(event),
            FileEventKind::Deleted => pass.on_deleted(event),
            FileEventKind::Renamed => pass.on_renamed(event),
            FileEventKind::Created => {}
        }
    }

    pass.recycle_scheduled();
    pass.publish(events);

    let SyncPass { outcome, .. } = pass;
    debug!(
        "Synchronized {} events: {} evictions, {} recycled, {} renames batched",
        events.len(),
        outcome.report.evictions,
        outcome.report.recycled.len(),
        outcome.rename_batch.len()
    );
    outcome
}

/// Restore the directory flag of deletions reported without one
///
/// Once a path is gone its kind can no longer be queried, and some backends
/// report directory removals like file removals. A deleted path that is not an
/// asset is treated as a directory when the cache holds entries below it or
/// when its mirrored media directory exists.
///
/// # Returns
///
/// Number of events reclassified.
pub fn mark_deleted_directories(
    events: &mut [FileEvent],
    collaborators: &Collaborators,
    mirror: &MediaMirror,
) -> usize {
    let mut marked = 0;
    let mut loaded: Option<Vec<PathBuf>> = None;

    for event in events.iter_mut() {
        if event.kind != FileEventKind::Deleted
            || event.is_directory
            || collaborators.catalog.is_resource_file(&event.path)
        {
            continue;
        }
        let loaded = loaded.get_or_insert_with(|| collaborators.cache.list_loaded());
        let has_cached_children = loaded
            .iter()
            .any(|p| p != &event.path && p.starts_with(&event.path));
        let has_media_dir = mirror.media_path_for(&event.path).is_some_and(|p| p.is_dir());

        if has_cached_children || has_media_dir {
            debug!("Treating deleted {} as a directory", event.path.display());
            event.is_directory = true;
            marked += 1;
        }
    }
    marked
}

struct SyncPass<'a> {
    collaborators: &'a mut Collaborators,
    mirror: &'a MediaMirror,
    bus: &'a mut EventBus,
    outcome: SyncOutcome,
    recycle: Vec<PathBuf>,
}

impl SyncPass<'_> {
    fn is_relevant(&self, event: &FileEvent) -> bool {
        event.is_directory || self.collaborators.catalog.is_resource_file(&event.path)
    }

    fn on_changed(&mut self, event: &FileEvent) {
        let path = event.path.as_path();
        if !self.collaborators.catalog.is_resource_file(path) || !self.collaborators.cache.has(path) {
            return;
        }

        let is_active = self
            .collaborators
            .documents
            .active_document_path()
            .is_some_and(|active| active == path);

        if !is_active && !self.collaborators.documents.is_unsaved(path) {
            trace!("Evicting externally modified {}", path.display());
            self.collaborators.cache.remove(path);
            self.outcome.report.evictions += 1;
            return;
        }

        match self.collaborators.ui.confirm_reload(path) {
            ReloadDecision::Reload => {
                info!("Reloading {} after external modification", path.display());
                self.collaborators.cache.remove(path);
                self.outcome.report.evictions += 1;
                if is_active {
                    self.reactivate(path);
                }
            }
            ReloadDecision::Keep => {
                info!("Keeping in-memory state of {}", path.display());
            }
        }
    }

    fn reactivate(&mut self, path: &Path) {
        let result = self
            .collaborators
            .cache
            .request(path)
            .and_then(|()| self.collaborators.documents.switch_to(path));
        if let Err(e) = result {
            warn!("Failed to reload active document {}: {}", path.display(), e);
            self.outcome
                .report
                .warnings
                .push(format!("Failed to reload {}: {}", path.display(), e));
        }
    }

    fn on_deleted(&mut self, event: &FileEvent) {
        if !self.is_relevant(event) {
            return;
        }

        for target in self.mirror.delete_targets(event, self.collaborators.catalog.as_ref()) {
            if !self.recycle.contains(&target) {
                self.recycle.push(target);
            }
        }

        if event.is_directory {
            self.collaborators.cache.remove_tree(&event.path);
        } else {
            self.collaborators.cache.remove(&event.path);
        }
        self.outcome.report.evictions += 1;
    }

    fn on_renamed(&mut self, event: &FileEvent) {
        if !self.is_relevant(event) {
            return;
        }

        let catalog = self.collaborators.catalog.as_ref();
        let old_sources = self.mirror.sources_before_rename(event, catalog);

        if event.is_directory {
            self.collaborators.cache.rename_tree(&event.old_path, &event.path);
        } else {
            self.collaborators.cache.rename(&event.old_path, &event.path);
        }

        if event.is_directory && is_empty_dir(&event.path) {
            debug!("Not propagating rename of empty directory {}", event.path.display());
            return;
        }
        if self.bus.begin_global_rename(event) {
            return;
        }

        self.outcome.rename_batch.push(event.clone());
        self.outcome.report.renames_batched += 1;

        let mirrored = self
            .mirror
            .mirror_rename(event, &old_sources, self.collaborators.catalog.as_ref());
        self.outcome.report.mirrored_moves.extend(mirrored.moves);
        self.outcome.report.warnings.extend(mirrored.warnings);
    }

    fn recycle_scheduled(&mut self) {
        if self.recycle.is_empty() {
            return;
        }
        let paths = std::mem::take(&mut self.recycle);
        let outcome = self
            .mirror
            .recycle_and_prune(&paths, self.collaborators.recycle_bin.as_mut());
        for (path, e) in &outcome.failed {
            warn!("Failed to recycle {}: {}", path.display(), e);
            self.outcome
                .report
                .warnings
                .push(format!("Failed to recycle {}: {}", path.display(), e));
        }
        self.outcome.report.recycled.extend(outcome.recycled);
    }

    fn publish(&mut self, events: &[FileEvent]) {
        for event in events {
            if self.is_relevant(event) {
                self.bus.publish(ResourceEvent::from_file_event(event));
            }
        }
    }
}
