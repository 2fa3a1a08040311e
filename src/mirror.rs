//! Source/media mirroring and the filesystem helpers behind it
//!
//! Every asset in the data tree may have been imported from one or more
//! authoring files living in the source/media tree. When assets are deleted or
//! moved outside the editor, the source/media tree has to follow so that the two
//! trees stay organized the same way.
//!
//! ## Mirroring rules
//!
//! - Deleting an asset schedules its existing source files for recycling.
//! - Deleting a directory schedules the mirrored media directory, i.e. the
//!   deleted path rebased from the data root onto the media root.
//! - Renaming an asset moves each source file to the position the asset
//!   catalog reports for the new asset path.
//! - Renaming a directory moves the mirrored media directory.
//!
//! Moves never overwrite an existing destination. A move that fails (a locked
//! file, a move across volumes) falls back to a copy, leaving the original in
//! place. Directories emptied by a move or a deletion are pruned afterwards, but
//! only if they are genuinely empty.

use crate::collaborators::{AssetCatalog, RecycleBin, RecycleOutcome};
use crate::error::{Result, SyncError};
use crate::types::FileEvent;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, trace, warn};
use walkdir::WalkDir;

/// How a mirrored item ended up at its destination
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveOutcome {
    /// Moved atomically
    Moved,
    /// The move failed and the item was copied instead
    Copied,
}

/// Result of mirroring a single rename
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MirrorReport {
    /// Moves performed (old, new)
    pub moves: Vec<(PathBuf, PathBuf)>,
    /// Non-fatal problems
    pub warnings: Vec<String>,
}

/// Maps data-tree paths onto the source/media tree
#[derive(Debug, Clone)]
pub struct MediaMirror {
    data_root: PathBuf,
    media_root: PathBuf,
}

impl MediaMirror {
    /// Create a mirror between a data root and a media root
    pub fn new(data_root: impl Into<PathBuf>, media_root: impl Into<PathBuf>) -> Self {
        Self {
            data_root: data_root.into(),
            media_root: media_root.into(),
        }
    }

    /// Root of the data tree
    pub fn data_root(&self) -> &Path {
        &self.data_root
    }

    /// Root of the source/media tree
    pub fn media_root(&self) -> &Path {
        &self.media_root
    }

    /// Media directory mirroring a data-tree directory
    ///
    /// Returns `None` if `data_path` is not located inside the data root.
    pub fn media_path_for(&self, data_path: &Path) -> Option<PathBuf> {
        let relative = make_relative(data_path, &self.data_root).ok()?;
        if relative.as_os_str().is_empty() {
            Some(self.media_root.clone())
        } else {
            Some(self.media_root.join(relative))
        }
    }

    /// Existing source/media paths to recycle for a deleted asset or directory
    pub fn delete_targets(&self, event: &FileEvent, catalog: &dyn AssetCatalog) -> Vec<PathBuf> {
        if event.is_directory {
            self.media_path_for(&event.path)
                .filter(|p| p.is_dir())
                .into_iter()
                .collect()
        } else {
            catalog
                .source_files(&event.path)
                .into_iter()
                .filter(|p| p.is_file())
                .collect()
        }
    }

    /// Source files of a renamed asset, computed from its old path
    ///
    /// Must be called before the content cache learns about the rename.
    /// Directories have no per-file sources, their media directory is derived
    /// from the paths alone.
    pub fn sources_before_rename(&self, event: &FileEvent, catalog: &dyn AssetCatalog) -> Vec<PathBuf> {
        if event.is_directory {
            Vec::new()
        } else {
            catalog.source_files(&event.old_path)
        }
    }

    /// Move source/media items so that they follow a data-tree rename
    ///
    /// `old_sources` is the result of [`MediaMirror::sources_before_rename`].
    pub fn mirror_rename(
        &self,
        event: &FileEvent,
        old_sources: &[PathBuf],
        catalog: &dyn AssetCatalog,
    ) -> MirrorReport {
        let mut report = MirrorReport::default();

        if event.is_directory {
            let (Some(old_dir), Some(new_dir)) = (
                self.media_path_for(&event.old_path),
                self.media_path_for(&event.path),
            ) else {
                trace!("Rename {} is outside the data root, nothing to mirror", event);
                return report;
            };
            if old_dir != new_dir && old_dir.is_dir() && !new_dir.exists() {
                self.mirror_one(&old_dir, &new_dir, &mut report);
            }
            return report;
        }

        let new_sources = catalog.source_files(&event.path);
        for (index, old) in old_sources.iter().enumerate() {
            let new = new_sources.get(index).unwrap_or(old);
            if old != new && old.is_file() && !new.exists() {
                self.mirror_one(old, new, &mut report);
            }
        }
        report
    }

    /// Send a batch of source/media paths to the recycle bin and prune emptied parents
    ///
    /// Only the parents of items that were actually recycled are pruned.
    pub fn recycle_and_prune(&self, paths: &[PathBuf], bin: &mut dyn RecycleBin) -> RecycleOutcome {
        if paths.is_empty() {
            return RecycleOutcome::default();
        }

        debug!("Recycling {} source/media items", paths.len());
        let outcome = bin.send_to_recycle(paths);

        let parents: BTreeSet<PathBuf> = outcome
            .recycled
            .iter()
            .filter_map(|p| p.parent().map(Path::to_path_buf))
            .collect();
        for parent in parents {
            self.prune_within(&parent);
        }
        outcome
    }

    /// Prune `dir` if it lies strictly inside the media root
    fn prune_within(&self, dir: &Path) {
        if dir == self.media_root || !dir.starts_with(&self.media_root) {
            return;
        }
        if let Err(e) = prune_empty_dir(dir) {
            trace!("Could not prune {}: {}", dir.display(), e);
        }
    }

    fn mirror_one(&self, from: &Path, to: &Path, report: &mut MirrorReport) {
        match move_or_copy(from, to) {
            Ok(outcome) => {
                if outcome == MoveOutcome::Copied {
                    report.warnings.push(format!(
                        "Unable to move {} to {}, copied it instead",
                        from.display(),
                        to.display()
                    ));
                }
                report.moves.push((from.to_path_buf(), to.to_path_buf()));
                if let Some(parent) = from.parent() {
                    self.prune_within(parent);
                }
            }
            Err(e) => {
                warn!("Failed to mirror {} to {}: {}", from.display(), to.display(), e);
                report.warnings.push(e.to_string());
            }
        }
    }
}

/// Move `from` to `to`, falling back to a copy if the move fails
///
/// The destination's parent directory is created first. Works on files and
/// directories alike.
pub fn move_or_copy(from: &Path, to: &Path) -> Result<MoveOutcome> {
    if let Some(parent) = to.parent() {
        fs::create_dir_all(parent)?;
    }

    match fs::rename(from, to) {
        Ok(()) => {
            trace!("Moved {} to {}", from.display(), to.display());
            Ok(MoveOutcome::Moved)
        }
        Err(move_err) => {
            warn!(
                "Unable to move {} to {} ({}). Copying instead.",
                from.display(),
                to.display(),
                move_err
            );
            let copied = if from.is_dir() {
                copy_dir(from, to)
            } else {
                fs::copy(from, to).map(|_| ()).map_err(SyncError::from)
            };
            copied.map_err(|e| SyncError::MoveFailed {
                from: from.to_path_buf(),
                to: to.to_path_buf(),
                source: match e {
                    SyncError::Io(io) => io,
                    _ => move_err,
                },
            })?;
            Ok(MoveOutcome::Copied)
        }
    }
}

/// Recursively copy a directory
pub fn copy_dir(from: &Path, to: &Path) -> Result<()> {
    for entry in WalkDir::new(from).follow_links(false) {
        let entry = entry?;
        let relative = make_relative(entry.path(), from)?;
        let target = to.join(relative);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)?;
        } else {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

/// Remove a directory if it is empty
///
/// # Returns
///
/// Returns `true` if the directory was removed.
pub fn remove_dir_if_empty(path: &Path) -> Result<bool> {
    if path.is_dir() && fs::read_dir(path)?.next().is_none() {
        fs::remove_dir(path)?;
        trace!("Removed empty directory: {:?}", path);
        Ok(true)
    } else {
        Ok(false)
    }
}

/// Remove empty subdirectories of `path`, then `path` itself if it ends up empty
///
/// Never removes a file. Returns `true` if `path` was removed.
pub fn prune_empty_dir(path: &Path) -> Result<bool> {
    if !path.is_dir() {
        return Ok(false);
    }
    for entry in fs::read_dir(path)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            prune_empty_dir(&entry.path())?;
        }
    }
    remove_dir_if_empty(path)
}

/// Whether a directory has no entries
///
/// A directory that cannot be listed counts as non-empty.
pub fn is_empty_dir(path: &Path) -> bool {
    match fs::read_dir(path) {
        Ok(mut entries) => entries.next().is_none(),
        Err(_) => false,
    }
}

/// Make a path relative to a base path
///
/// Tries a lexical strip first and only canonicalizes both paths when that
/// fails, so paths that no longer exist can still be related lexically.
pub fn make_relative(path: &Path, base: &Path) -> Result<PathBuf> {
    if let Ok(relative) = path.strip_prefix(base) {
        return Ok(relative.to_path_buf());
    }

    let path_canon = path.canonicalize()?;
    let base_canon = base.canonicalize()?;

    path_canon
        .strip_prefix(&base_canon)
        .map(|p| p.to_path_buf())
        .map_err(|_| SyncError::internal(format!(
            "Path {:?} is not relative to {:?}",
            path_canon, base_canon
        )))
}
