//! Contracts for the systems the engine cooperates with
//!
//! The engine owns no content and no user interface. Everything it needs from
//! the surrounding editor is expressed as a narrow trait here:
//!
//! - [`PathVisibility`] - which paths are worth watching at all
//! - [`AssetCatalog`] - what counts as an asset, its type and its source files
//! - [`ContentCache`] - the in-memory cache of loaded resources
//! - [`RecycleBin`] - reversible deletion
//! - [`Reimporter`] - re-importing modified source media
//! - [`DocumentState`] - unsaved state, the active document and sandbox mode
//! - [`UserInterface`] - reload confirmation and change notification
//! - [`SettingsStore`] - persisted application and user settings
//!
//! All collaborators are used from the owner thread only, so none of the
//! traits require `Send` or `Sync`.
//!
//! Hosts without an editor surface can use the headless implementations at the
//! bottom of this module.

use crate::error::{Result, SyncError};
use crate::references::{Reference, VisitReferences};
use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Name of a resource type, e.g. `Scene` or `Texture`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceType(pub String);

impl ResourceType {
    /// Create a resource type from its name
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Type name
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A loaded resource whose references can be enumerated
pub trait Resource: VisitReferences {
    /// The type of this resource
    fn resource_type(&self) -> ResourceType;

    /// Concrete value, for caches that persist their own resource types
    fn as_any(&self) -> &dyn Any;
}

/// Decides which paths the watchers should report
pub trait PathVisibility {
    /// Returns false for hidden or otherwise uninteresting paths
    fn is_visible(&self, path: &Path) -> bool;
}

/// Knowledge about asset files, independent of whether they are loaded
pub trait AssetCatalog {
    /// Whether `path` names an engine-managed resource file
    fn is_resource_file(&self, path: &Path) -> bool;

    /// Resource type derived from the file name alone
    fn resource_type_from_name(&self, path: &Path) -> Option<ResourceType>;

    /// Source/media files associated with the asset at `asset_path`
    ///
    /// The result must be deterministic and positional: the n-th entry for the
    /// old path of a renamed asset corresponds to the n-th entry for its new
    /// path. Entries may point at files that do not exist.
    fn source_files(&self, asset_path: &Path) -> Vec<PathBuf>;

    /// Whether a resource of type `holder` can contain a reference to `target`
    fn can_reference(&self, holder: &ResourceType, target: &ResourceType) -> bool;
}

/// The in-memory content cache
pub trait ContentCache {
    /// Whether content for `path` is currently cached
    fn has(&self, path: &Path) -> bool;

    /// Evict a single entry
    fn remove(&mut self, path: &Path);

    /// Evict every entry located at or below `dir`
    fn remove_tree(&mut self, dir: &Path);

    /// Move a cached entry to a new path
    fn rename(&mut self, old: &Path, new: &Path);

    /// Move every cached entry below `old_dir` to the same place below `new_dir`
    fn rename_tree(&mut self, old_dir: &Path, new_dir: &Path);

    /// Load `path` into the cache and initialize it
    fn request(&mut self, path: &Path) -> Result<()>;

    /// Load `path` without registering or initializing it
    ///
    /// The returned instance is owned by the caller. Fails with
    /// `SyncError::NotFound` or `SyncError::Parse`.
    fn load_detached(&mut self, path: &Path) -> Result<Box<dyn Resource>>;

    /// Save a detached instance to `path`
    fn save_detached(&mut self, path: &Path, resource: &dyn Resource) -> Result<()>;

    /// Live cached instance for `path`
    fn loaded_mut(&mut self, path: &Path) -> Option<&mut dyn Resource>;

    /// Paths of all cached entries
    fn list_loaded(&self) -> Vec<PathBuf>;

    /// Paths of every resource file on disk
    fn list_all_on_disk(&self) -> Result<Vec<PathBuf>>;
}

/// Per-item result of a recycle request
#[derive(Debug, Default)]
pub struct RecycleOutcome {
    /// Paths that are no longer in place
    pub recycled: Vec<PathBuf>,
    /// Paths that could not be recycled and why
    pub failed: Vec<(PathBuf, SyncError)>,
}

impl RecycleOutcome {
    /// Outcome where every path failed for the same reason
    pub fn all_failed(paths: &[PathBuf], reason: impl Fn() -> SyncError) -> Self {
        Self {
            recycled: Vec::new(),
            failed: paths.iter().map(|p| (p.clone(), reason())).collect(),
        }
    }
}

/// Reversible deletion facility
pub trait RecycleBin {
    /// Move all `paths` somewhere the user can restore them from
    ///
    /// A failing item must not keep the remaining ones from being recycled.
    fn send_to_recycle(&mut self, paths: &[PathBuf]) -> RecycleOutcome;
}

/// Re-imports modified source media into the data tree
pub trait Reimporter {
    /// Re-import every path in one batch
    fn reimport(&mut self, paths: &[PathBuf]);
}

/// Editor-side document state
pub trait DocumentState {
    /// Whether the resource at `path` has unsaved edits
    fn is_unsaved(&self, path: &Path) -> bool;

    /// Path of the active working document, if it has one
    fn active_document_path(&self) -> Option<PathBuf>;

    /// Whether the active document is a sandboxed, ephemeral copy
    fn is_sandbox_active(&self) -> bool;

    /// The live active document if it exists only in memory
    ///
    /// Returns `None` when the active document has a persisted counterpart.
    fn runtime_document_mut(&mut self) -> Option<&mut dyn Resource>;

    /// Make the (freshly reloaded) resource at `path` the active document
    fn switch_to(&mut self, path: &Path) -> Result<()>;
}

/// Answer to a reload confirmation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReloadDecision {
    /// Discard in-memory state and reload from disk
    Reload,
    /// Keep the in-memory state
    Keep,
}

/// Something whose properties changed as a result of a rename propagation
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ChangedObject {
    /// The in-memory active document
    ActiveDocument,
    /// A cached resource
    Resource(PathBuf),
}

/// Interactive surface of the editor
pub trait UserInterface {
    /// Ask whether to reload `path`, which has unsaved or active state
    fn confirm_reload(&mut self, path: &Path) -> ReloadDecision;

    /// Tell the editor that these objects changed in memory
    fn notify_changed(&mut self, objects: &[ChangedObject]);
}

/// Scope of persisted settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SettingsScope {
    /// Project-wide application settings
    Application,
    /// Per-user settings
    User,
}

/// Persisted settings that may reference assets
pub trait SettingsStore {
    /// Re-read the settings of `scope` from disk
    fn reload(&mut self, scope: SettingsScope) -> Result<()>;

    /// The in-memory settings of `scope`
    fn settings_mut(&mut self, scope: SettingsScope) -> &mut dyn VisitReferences;

    /// Write the settings of `scope` back to disk
    fn save(&mut self, scope: SettingsScope) -> Result<()>;
}

/// The full set of collaborators an engine works with
///
/// Fields are public so hosts and tests can reach their own implementations
/// through the engine.
pub struct Collaborators {
    /// Which paths are watched
    pub visibility: Box<dyn PathVisibility>,
    /// Asset knowledge
    pub catalog: Box<dyn AssetCatalog>,
    /// The content cache
    pub cache: Box<dyn ContentCache>,
    /// Reversible deletion
    pub recycle_bin: Box<dyn RecycleBin>,
    /// Source media re-import
    pub reimporter: Box<dyn Reimporter>,
    /// Editor document state
    pub documents: Box<dyn DocumentState>,
    /// Interactive surface
    pub ui: Box<dyn UserInterface>,
    /// Persisted settings
    pub settings: Box<dyn SettingsStore>,
}

impl fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collaborators").finish_non_exhaustive()
    }
}

/// Visibility predicate hiding paths that match glob patterns
///
/// The default patterns hide dot-files and everything below dot-directories.
/// Paths below one of the configured roots are matched relative to that root,
/// so a root that itself lives in a hidden directory stays visible.
#[derive(Debug, Clone)]
pub struct HiddenPathFilter {
    patterns: Vec<String>,
    set: GlobSet,
    roots: Vec<PathBuf>,
}

impl HiddenPathFilter {
    /// Default hidden patterns
    pub const DEFAULT_PATTERNS: &'static [&'static str] = &[".*", "**/.*", "**/.*/**"];

    /// Build a filter from glob patterns
    pub fn new(patterns: &[String]) -> Result<Self> {
        let mut builder = GlobSetBuilder::new();
        for pattern in patterns {
            builder.add(Glob::new(pattern)?);
        }
        Ok(Self {
            patterns: patterns.to_vec(),
            set: builder.build()?,
            roots: Vec::new(),
        })
    }

    /// Match paths below these roots relative to the root
    pub fn with_roots(mut self, roots: impl IntoIterator<Item = PathBuf>) -> Self {
        self.roots = roots.into_iter().collect();
        self
    }

    /// Patterns this filter was built from
    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }
}

impl Default for HiddenPathFilter {
    fn default() -> Self {
        let patterns: Vec<String> = Self::DEFAULT_PATTERNS.iter().map(|p| p.to_string()).collect();
        let mut builder = GlobSetBuilder::new();
        for pattern in &patterns {
            if let Ok(glob) = Glob::new(pattern) {
                builder.add(glob);
            }
        }
        Self {
            set: builder.build().unwrap_or_else(|_| GlobSet::empty()),
            patterns,
            roots: Vec::new(),
        }
    }
}

impl PathVisibility for HiddenPathFilter {
    fn is_visible(&self, path: &Path) -> bool {
        let relative = self
            .roots
            .iter()
            .find_map(|root| path.strip_prefix(root).ok())
            .unwrap_or(path);
        !self.set.is_match(relative)
    }
}

/// Document state for hosts without documents
#[derive(Debug, Default, Clone, Copy)]
pub struct NoDocuments;

impl DocumentState for NoDocuments {
    fn is_unsaved(&self, _path: &Path) -> bool {
        false
    }

    fn active_document_path(&self) -> Option<PathBuf> {
        None
    }

    fn is_sandbox_active(&self) -> bool {
        false
    }

    fn runtime_document_mut(&mut self) -> Option<&mut dyn Resource> {
        None
    }

    fn switch_to(&mut self, _path: &Path) -> Result<()> {
        Ok(())
    }
}

/// Non-interactive user interface that always gives the same answer
#[derive(Debug, Clone, Copy)]
pub struct AutoConfirm(pub ReloadDecision);

impl Default for AutoConfirm {
    fn default() -> Self {
        AutoConfirm(ReloadDecision::Reload)
    }
}

impl UserInterface for AutoConfirm {
    fn confirm_reload(&mut self, path: &Path) -> ReloadDecision {
        info!("Auto-answering reload of {} with {:?}", path.display(), self.0);
        self.0
    }

    fn notify_changed(&mut self, objects: &[ChangedObject]) {
        debug!("{} objects changed in memory", objects.len());
    }
}

/// Settings store for hosts without persisted settings
#[derive(Debug, Default)]
pub struct NoSettings {
    empty: Vec<Reference>,
}

impl SettingsStore for NoSettings {
    fn reload(&mut self, _scope: SettingsScope) -> Result<()> {
        Ok(())
    }

    fn settings_mut(&mut self, _scope: SettingsScope) -> &mut dyn VisitReferences {
        &mut self.empty
    }

    fn save(&mut self, _scope: SettingsScope) -> Result<()> {
        Ok(())
    }
}

/// Reimporter that only logs
#[derive(Debug, Default, Clone, Copy)]
pub struct NoReimport;

impl Reimporter for NoReimport {
    fn reimport(&mut self, paths: &[PathBuf]) {
        info!("Ignoring reimport of {} source files", paths.len());
    }
}
