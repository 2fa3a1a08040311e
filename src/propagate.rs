//! Global rename propagation
//!
//! When assets or directories are renamed outside the editor, every document
//! that points at the old path has to be rewritten. [`RenamePropagation`] does
//! this for one rename batch as a resumable state machine: each call to
//! [`RenamePropagation::step`] performs a bounded amount of work and returns, so
//! the host can keep its UI responsive and report progress in between.
//!
//! ## Stages
//!
//! 1. Application and user settings are reloaded, rewritten and saved.
//! 2. The active document: in sandbox mode its persisted version is loaded
//!    detached, rewritten and saved only when something changed; otherwise an
//!    unsaved in-memory document is rewritten in place.
//! 3. Every asset on disk is scanned. Assets that cannot possibly reference any
//!    renamed type are skipped without loading. Cached assets are rewritten in
//!    place; all others are loaded detached, rewritten, saved if changed and
//!    dropped again, so the scan never populates the cache.
//! 4. The editor is notified once about every cached asset that changed.
//!
//! Rewriting a single asset is atomic with respect to stepping: a step either
//! saves the rewritten asset and advances, or does not touch it at all.

use crate::collaborators::{ChangedObject, Collaborators, ResourceType, SettingsScope};
use crate::references::rewrite_references;
use crate::self_modified::SelfModificationSet;
use crate::types::{FileEvent, ProgressInfo, PropagationReport};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, instrument, trace, warn};

/// Operation name reported in [`ProgressInfo`]
pub const OPERATION: &str = "Updating references";

const SETTINGS_RELOAD_WEIGHT: f32 = 0.04;
const SETTINGS_REWRITE_WEIGHT: f32 = 0.02;
const SETTINGS_SAVE_WEIGHT: f32 = 0.04;
const SCAN_WEIGHT: f32 = 0.9;

/// Where a propagation currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Reload persisted settings
    ReloadSettings,
    /// Rewrite references in the reloaded settings
    RewriteSettings,
    /// Save the settings back
    SaveSettings,
    /// Handle the active document
    ActiveDocument,
    /// Enumerate assets on disk
    PrepareScan,
    /// Rewrite assets one by one
    Scan,
    /// Tell the editor about modified cached assets
    Notify,
    /// Nothing left to do
    Done,
}

/// Rewrites stale references for one batch of renames
#[derive(Debug)]
pub struct RenamePropagation {
    batch: Vec<FileEvent>,
    stage: Stage,
    files: Vec<PathBuf>,
    next_file: usize,
    loaded: HashSet<PathBuf>,
    target_types: Option<Vec<ResourceType>>,
    progress: f32,
    current_item: Option<String>,
    report: PropagationReport,
    started: Instant,
}

impl RenamePropagation {
    /// Prepare a propagation for a rename batch
    pub fn new(batch: Vec<FileEvent>) -> Self {
        let report = PropagationReport {
            renames: batch.len(),
            ..Default::default()
        };
        Self {
            batch,
            stage: Stage::ReloadSettings,
            files: Vec::new(),
            next_file: 0,
            loaded: HashSet::new(),
            target_types: None,
            progress: 0.0,
            current_item: None,
            report,
            started: Instant::now(),
        }
    }

    /// Current stage
    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Whether all work is done
    pub fn is_finished(&self) -> bool {
        self.stage == Stage::Done
    }

    /// Progress after the last step
    pub fn progress(&self) -> ProgressInfo {
        ProgressInfo {
            operation: OPERATION.to_string(),
            current_item: self.current_item.clone(),
            fraction: self.progress.min(1.0),
        }
    }

    /// Report accumulated so far
    pub fn report(&self) -> &PropagationReport {
        &self.report
    }

    /// Consume the propagation and return its report
    pub fn into_report(self) -> PropagationReport {
        self.report
    }

    /// Perform one bounded unit of work
    ///
    /// Files written by the propagation are flagged in `self_modified` so that
    /// their change notifications are not mistaken for external edits.
    ///
    /// # Returns
    ///
    /// `true` while more work remains.
    pub fn step(&mut self, collaborators: &mut Collaborators, self_modified: &mut SelfModificationSet) -> bool {
        match self.stage {
            Stage::ReloadSettings => {
                self.current_item = Some("Settings".to_string());
                for scope in [SettingsScope::Application, SettingsScope::User] {
                    if let Err(e) = collaborators.settings.reload(scope) {
                        self.warn(format!("Failed to reload {:?} settings: {}", scope, e));
                    }
                }
                self.progress += SETTINGS_RELOAD_WEIGHT;
                self.stage = Stage::RewriteSettings;
            }
            Stage::RewriteSettings => {
                for scope in [SettingsScope::Application, SettingsScope::User] {
                    let settings = collaborators.settings.settings_mut(scope);
                    self.report.references_rewritten += rewrite_references(settings, &self.batch);
                }
                self.progress += SETTINGS_REWRITE_WEIGHT;
                self.stage = Stage::SaveSettings;
            }
            Stage::SaveSettings => {
                for scope in [SettingsScope::Application, SettingsScope::User] {
                    if let Err(e) = collaborators.settings.save(scope) {
                        self.warn(format!("Failed to save {:?} settings: {}", scope, e));
                    }
                }
                self.progress += SETTINGS_SAVE_WEIGHT;
                self.stage = Stage::ActiveDocument;
            }
            Stage::ActiveDocument => {
                self.rewrite_active_document(collaborators, self_modified);
                self.stage = Stage::PrepareScan;
            }
            Stage::PrepareScan => {
                self.prepare_scan(collaborators);
                self.stage = if self.files.is_empty() { Stage::Notify } else { Stage::Scan };
            }
            Stage::Scan => {
                self.scan_next(collaborators, self_modified);
                if self.next_file >= self.files.len() {
                    self.stage = Stage::Notify;
                }
            }
            Stage::Notify => {
                if !self.report.modified_cached.is_empty() {
                    let changed: Vec<ChangedObject> = self
                        .report
                        .modified_cached
                        .iter()
                        .cloned()
                        .map(ChangedObject::Resource)
                        .collect();
                    collaborators.ui.notify_changed(&changed);
                }
                self.finish();
            }
            Stage::Done => {}
        }
        !self.is_finished()
    }

    /// Step until finished, reporting progress after every step
    #[instrument(skip_all, fields(renames = self.batch.len()))]
    pub fn run_to_completion(
        mut self,
        collaborators: &mut Collaborators,
        self_modified: &mut SelfModificationSet,
        on_progress: &mut dyn FnMut(ProgressInfo),
    ) -> PropagationReport {
        while self.step(collaborators, self_modified) {
            on_progress(self.progress());
        }
        on_progress(self.progress());
        self.into_report()
    }

    fn rewrite_active_document(
        &mut self,
        collaborators: &mut Collaborators,
        self_modified: &mut SelfModificationSet,
    ) {
        let documents = collaborators.documents.as_mut();

        if documents.is_sandbox_active() {
            let Some(path) = documents.active_document_path() else {
                return;
            };
            self.current_item = Some("Active document".to_string());
            match collaborators.cache.load_detached(&path) {
                Ok(mut persisted) => {
                    let count = rewrite_references(persisted.as_mut(), &self.batch);
                    self.report.references_rewritten += count;
                    if count > 0 {
                        match collaborators.cache.save_detached(&path, persisted.as_ref()) {
                            Ok(()) => {
                                self_modified.flag(&path);
                                self.report.files_saved.push(path);
                            }
                            Err(e) => self.warn(format!("Failed to save {}: {}", path.display(), e)),
                        }
                    }
                }
                Err(e) => self.warn(format!(
                    "Failed to load persisted active document {}: {}",
                    path.display(),
                    e
                )),
            }
        } else if let Some(document) = documents.runtime_document_mut() {
            self.current_item = Some("Active document".to_string());
            let count = rewrite_references(document, &self.batch);
            self.report.references_rewritten += count;
            if count > 0 {
                collaborators.ui.notify_changed(&[ChangedObject::ActiveDocument]);
            }
        }
    }

    fn prepare_scan(&mut self, collaborators: &mut Collaborators) {
        self.files = match collaborators.cache.list_all_on_disk() {
            Ok(files) => files,
            Err(e) => {
                self.warn(format!("Failed to enumerate assets: {}", e));
                Vec::new()
            }
        };
        self.loaded = collaborators.cache.list_loaded().into_iter().collect();

        // Without directories, the renamed types bound which assets can be affected
        if !self.batch.iter().any(|e| e.is_directory) {
            let catalog = collaborators.catalog.as_ref();
            self.target_types = self
                .batch
                .iter()
                .map(|e| catalog.resource_type_from_name(&e.path))
                .collect::<Option<Vec<_>>>();
            if self.target_types.is_none() {
                debug!("A renamed asset has no recognizable type, scanning every asset");
            }
        }
        debug!("Scanning {} assets for stale references", self.files.len());
    }

    /// Process files until one was actually rewritten or the scan is exhausted
    fn scan_next(&mut self, collaborators: &mut Collaborators, self_modified: &mut SelfModificationSet) {
        let share = SCAN_WEIGHT / self.files.len() as f32;

        while self.next_file < self.files.len() {
            let file = self.files[self.next_file].clone();
            self.next_file += 1;

            let verdict = self.target_types.as_ref().map(|targets| {
                let catalog = collaborators.catalog.as_ref();
                catalog
                    .resource_type_from_name(&file)
                    .map(|holder| targets.iter().any(|target| catalog.can_reference(&holder, target)))
            });
            match verdict {
                Some(None) => {
                    self.progress += share;
                    self.report.files_skipped += 1;
                    self.warn(format!(
                        "Could not determine resource type of {} from its file name, skipping it",
                        file.display()
                    ));
                    continue;
                }
                Some(Some(false)) => {
                    trace!("{} cannot reference any renamed type", file.display());
                    self.progress += share;
                    self.report.files_skipped += 1;
                    continue;
                }
                _ => {}
            }

            self.current_item = Some(file.display().to_string());
            self.rewrite_file(&file, collaborators, self_modified);
            self.progress += share;
            return;
        }
    }

    fn rewrite_file(
        &mut self,
        file: &Path,
        collaborators: &mut Collaborators,
        self_modified: &mut SelfModificationSet,
    ) {
        if self.loaded.contains(file) {
            if let Some(resource) = collaborators.cache.loaded_mut(file) {
                let count = rewrite_references(resource, &self.batch);
                self.report.references_rewritten += count;
                if count > 0 {
                    self.report.modified_cached.push(file.to_path_buf());
                }
                return;
            }
        }

        let mut resource = match collaborators.cache.load_detached(file) {
            Ok(resource) => resource,
            Err(e) => {
                self.report.files_skipped += 1;
                self.warn(format!("Failed to load {}: {}", file.display(), e));
                return;
            }
        };

        let count = rewrite_references(resource.as_mut(), &self.batch);
        if count == 0 {
            return;
        }
        match collaborators.cache.save_detached(file, resource.as_ref()) {
            Ok(()) => {
                self.report.references_rewritten += count;
                self_modified.flag(file);
                self.report.files_saved.push(file.to_path_buf());
            }
            Err(e) => self.warn(format!("Failed to save {}: {}", file.display(), e)),
        }
    }

    fn finish(&mut self) {
        self.stage = Stage::Done;
        self.progress = 1.0;
        self.current_item = None;
        self.report.duration_ms = self.started.elapsed().as_millis() as u64;
        info!(
            "Propagated {} renames: {} references rewritten, {} files saved, {} cached assets modified",
            self.report.renames,
            self.report.references_rewritten,
            self.report.files_saved.len(),
            self.report.modified_cached.len()
        );
    }

    fn warn(&mut self, message: String) {
        warn!("{}", message);
        self.report.warnings.push(message);
    }
}
