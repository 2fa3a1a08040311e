//! File-backed collaborators
//!
//! A complete set of content collaborators for projects whose documents are
//! plain JSON files. They back the command line tool and double as a reference
//! for hosts writing their own.
//!
//! ## Document format
//!
//! A document is any JSON value. References to other assets are objects with a
//! single `$ref` key:
//!
//! ```json
//! {
//!   "name": "Level 1",
//!   "background": { "$ref": "sprites/sky.png" },
//!   "music": { "$ref": null },
//!   "font": { "$ref": "default:Fonts/Generic" }
//! }
//! ```
//!
//! Paths are written relative to the data root with `/` separators. `null`
//! points explicitly at nothing, an empty string is unset and the `default:`
//! prefix names built-in content. Asset types that are not documents (textures,
//! audio) load as opaque resources without references.
//!
//! ## Example
//!
//! ```rust
//! use assetsync::collaborators::AssetCatalog;
//! use assetsync::json_store::AssetRules;
//! use std::path::{Path, PathBuf};
//!
//! let rules = AssetRules::default().with_roots("/p/Data", "/p/Source/Media");
//! assert!(rules.is_resource_file(Path::new("/p/Data/sprites/hero.png")));
//! assert_eq!(
//!     rules.source_files(Path::new("/p/Data/sprites/hero.png"))[0],
//!     PathBuf::from("/p/Source/Media/sprites/hero.png")
//! );
//! ```

use crate::collaborators::{
    AssetCatalog, ContentCache, RecycleBin, RecycleOutcome, Resource, ResourceType, SettingsScope,
    SettingsStore,
};
use crate::error::{Result, SyncError};
use crate::mirror::{move_or_copy, MoveOutcome};
use crate::references::{rebase, Reference, VisitReferences, DEFAULT_CONTENT_PREFIX};
use chrono::Local;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::any::Any;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, trace, warn};
use walkdir::WalkDir;

/// Key marking a reference object inside a JSON document
pub const REF_KEY: &str = "$ref";

/// Reference rule entry matching every target type
pub const ANY_TYPE: &str = "*";

/// Naming and reference rules for the assets of a project
///
/// Serializable so that a project can ship its own rules; the roots are not
/// part of the file and are set with [`AssetRules::with_roots`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssetRules {
    /// Lowercase file extension (without dot) to resource type name
    pub types: BTreeMap<String, String>,
    /// Resource types stored as JSON documents
    pub documents: BTreeSet<String>,
    /// Holder type to the target types it may reference (`*` for any)
    pub references: BTreeMap<String, Vec<String>>,
    /// Resource type to the extensions of its source files, in positional order
    pub sources: BTreeMap<String, Vec<String>>,
    #[serde(skip)]
    data_root: PathBuf,
    #[serde(skip)]
    media_root: PathBuf,
}

impl Default for AssetRules {
    fn default() -> Self {
        let types = [
            ("png", "Texture"),
            ("jpg", "Texture"),
            ("wav", "AudioData"),
            ("ogg", "AudioData"),
            ("shader", "Shader"),
            ("material", "Material"),
            ("prefab", "Prefab"),
            ("scene", "Scene"),
        ];
        fn owned(items: &[&str]) -> Vec<String> {
            items.iter().map(|s| s.to_string()).collect()
        }

        Self {
            types: types
                .iter()
                .map(|(ext, ty)| (ext.to_string(), ty.to_string()))
                .collect(),
            documents: owned(&["Material", "Prefab", "Scene"]).into_iter().collect(),
            references: BTreeMap::from([
                ("Material".to_string(), owned(&["Texture", "Shader"])),
                ("Prefab".to_string(), owned(&[ANY_TYPE])),
                ("Scene".to_string(), owned(&[ANY_TYPE])),
            ]),
            sources: BTreeMap::from([
                ("Texture".to_string(), owned(&["png", "psd"])),
                ("AudioData".to_string(), owned(&["wav", "ogg"])),
            ]),
            data_root: PathBuf::new(),
            media_root: PathBuf::new(),
        }
    }
}

impl AssetRules {
    /// Set the roots used to locate source files
    pub fn with_roots(mut self, data_root: impl Into<PathBuf>, media_root: impl Into<PathBuf>) -> Self {
        self.data_root = data_root.into();
        self.media_root = media_root.into();
        self
    }

    /// Load rules from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let rules = serde_json::from_str(&content).map_err(|e| SyncError::parse(path, e.to_string()))?;
        debug!("Loaded asset rules from {}", path.display());
        Ok(rules)
    }

    /// Whether resources of `resource_type` are JSON documents
    pub fn is_document(&self, resource_type: &ResourceType) -> bool {
        self.documents.contains(resource_type.as_str())
    }
}

impl AssetCatalog for AssetRules {
    fn is_resource_file(&self, path: &Path) -> bool {
        self.resource_type_from_name(path).is_some()
    }

    fn resource_type_from_name(&self, path: &Path) -> Option<ResourceType> {
        let ext = path.extension()?.to_str()?.to_lowercase();
        self.types.get(&ext).map(ResourceType::new)
    }

    fn source_files(&self, asset_path: &Path) -> Vec<PathBuf> {
        let Some(resource_type) = self.resource_type_from_name(asset_path) else {
            return Vec::new();
        };
        let Some(extensions) = self.sources.get(resource_type.as_str()) else {
            return Vec::new();
        };
        let Some(relative) = rebase(asset_path, &self.data_root, &self.media_root) else {
            return Vec::new();
        };
        let (Some(parent), Some(stem)) = (relative.parent(), relative.file_stem()) else {
            return Vec::new();
        };
        let stem = stem.to_string_lossy();
        extensions
            .iter()
            .map(|ext| parent.join(format!("{}.{}", stem, ext)))
            .collect()
    }

    fn can_reference(&self, holder: &ResourceType, target: &ResourceType) -> bool {
        self.references
            .get(holder.as_str())
            .is_some_and(|targets| targets.iter().any(|t| t == ANY_TYPE || t == target.as_str()))
    }
}

/// A JSON document with `$ref` references
#[derive(Debug, Clone, PartialEq)]
pub struct JsonDocument {
    resource_type: ResourceType,
    base: PathBuf,
    value: Value,
}

impl JsonDocument {
    /// Wrap a JSON value; relative references resolve against `base`
    pub fn new(resource_type: ResourceType, base: impl Into<PathBuf>, value: Value) -> Self {
        Self {
            resource_type,
            base: base.into(),
            value,
        }
    }

    /// Parse document text read from `path`
    pub fn parse(path: &Path, resource_type: ResourceType, base: impl Into<PathBuf>, text: &str) -> Result<Self> {
        let value = serde_json::from_str(text).map_err(|e| SyncError::parse(path, e.to_string()))?;
        Ok(Self::new(resource_type, base, value))
    }

    /// The JSON value
    pub fn value(&self) -> &Value {
        &self.value
    }

    /// Pretty-printed JSON text
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.value)?)
    }

    /// Absolute paths of all set references, in document order
    pub fn reference_paths(&mut self) -> Vec<PathBuf> {
        let mut paths = Vec::new();
        self.visit_references(&mut |r| {
            if !r.is_unset() {
                paths.push(r.path.clone());
            }
        });
        paths
    }
}

impl VisitReferences for JsonDocument {
    fn visit_references(&mut self, visitor: &mut dyn FnMut(&mut Reference)) {
        visit_value(&mut self.value, &self.base, visitor);
    }
}

impl Resource for JsonDocument {
    fn resource_type(&self) -> ResourceType {
        self.resource_type.clone()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

fn visit_value(value: &mut Value, base: &Path, visitor: &mut dyn FnMut(&mut Reference)) {
    match value {
        Value::Object(map) => {
            if map.len() == 1 {
                if let Some(target) = map.get_mut(REF_KEY) {
                    visit_ref(target, base, visitor);
                    return;
                }
            }
            for child in map.values_mut() {
                visit_value(child, base, visitor);
            }
        }
        Value::Array(items) => {
            for item in items {
                visit_value(item, base, visitor);
            }
        }
        _ => {}
    }
}

fn visit_ref(target: &mut Value, base: &Path, visitor: &mut dyn FnMut(&mut Reference)) {
    let mut reference = match target {
        Value::Null => Reference::null(),
        Value::String(text) if text.is_empty() || text.starts_with(DEFAULT_CONTENT_PREFIX) => {
            Reference::new(text.as_str())
        }
        Value::String(text) => Reference::new(base.join(text.as_str())),
        _ => return,
    };
    let before = reference.clone();
    visitor(&mut reference);
    if reference != before {
        *target = encode_reference(&reference, base);
    }
}

fn encode_reference(reference: &Reference, base: &Path) -> Value {
    if reference.explicit_null {
        return Value::Null;
    }
    match reference.path.strip_prefix(base) {
        Ok(relative) if !base.as_os_str().is_empty() => Value::String(
            relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/"),
        ),
        _ => Value::String(reference.path.to_string_lossy().into_owned()),
    }
}

/// A non-document asset; it holds no references
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpaqueResource {
    resource_type: ResourceType,
}

impl OpaqueResource {
    /// Create an opaque resource of the given type
    pub fn new(resource_type: ResourceType) -> Self {
        Self { resource_type }
    }
}

impl VisitReferences for OpaqueResource {
    fn visit_references(&mut self, _visitor: &mut dyn FnMut(&mut Reference)) {}
}

impl Resource for OpaqueResource {
    fn resource_type(&self) -> ResourceType {
        self.resource_type.clone()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Content cache over the files of a data root
pub struct JsonAssetStore {
    data_root: PathBuf,
    rules: AssetRules,
    loaded: BTreeMap<PathBuf, Box<dyn Resource>>,
}

impl std::fmt::Debug for JsonAssetStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonAssetStore")
            .field("data_root", &self.data_root)
            .field("loaded", &self.loaded.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl JsonAssetStore {
    /// Create an empty cache for `data_root`
    pub fn new(data_root: impl Into<PathBuf>, rules: AssetRules) -> Self {
        Self {
            data_root: data_root.into(),
            rules,
            loaded: BTreeMap::new(),
        }
    }

    /// Rules used to recognize assets
    pub fn rules(&self) -> &AssetRules {
        &self.rules
    }

    /// Cached instance for `path`
    pub fn get(&self, path: &Path) -> Option<&dyn Resource> {
        let resource = self.loaded.get(path)?;
        Some(resource.as_ref())
    }

    /// Write a cached document back to disk
    pub fn save(&self, path: &Path) -> Result<()> {
        let resource = self.get(path).ok_or_else(|| SyncError::NotFound(path.to_path_buf()))?;
        write_resource(path, resource)
    }

    fn load(&self, path: &Path) -> Result<Box<dyn Resource>> {
        let resource_type = self
            .rules
            .resource_type_from_name(path)
            .ok_or_else(|| SyncError::TypeResolution(path.to_path_buf()))?;
        if !path.is_file() {
            return Err(SyncError::NotFound(path.to_path_buf()));
        }
        if !self.rules.is_document(&resource_type) {
            return Ok(Box::new(OpaqueResource::new(resource_type)));
        }
        let text = fs::read_to_string(path)?;
        let document = JsonDocument::parse(path, resource_type, &self.data_root, &text)?;
        Ok(Box::new(document))
    }
}

/// Persist a resource created by this module
///
/// Documents are written in place, not through a temporary file and a rename:
/// the watcher must see a plain change of the document, which the
/// self-modification set suppresses, never a rename that would be propagated.
fn write_resource(path: &Path, resource: &dyn Resource) -> Result<()> {
    if let Some(document) = resource.as_any().downcast_ref::<JsonDocument>() {
        fs::write(path, document.to_json()?)?;
        trace!("Saved {}", path.display());
        Ok(())
    } else if resource.as_any().is::<OpaqueResource>() {
        trace!("Nothing to save for opaque resource {}", path.display());
        Ok(())
    } else {
        Err(SyncError::internal(format!(
            "Cannot persist a {} resource that was not loaded from JSON",
            resource.resource_type()
        )))
    }
}

impl ContentCache for JsonAssetStore {
    fn has(&self, path: &Path) -> bool {
        self.loaded.contains_key(path)
    }

    fn remove(&mut self, path: &Path) {
        if self.loaded.remove(path).is_some() {
            trace!("Evicted {}", path.display());
        }
    }

    fn remove_tree(&mut self, dir: &Path) {
        self.loaded.retain(|path, _| !path.starts_with(dir));
    }

    fn rename(&mut self, old: &Path, new: &Path) {
        if let Some(resource) = self.loaded.remove(old) {
            self.loaded.insert(new.to_path_buf(), resource);
        }
    }

    fn rename_tree(&mut self, old_dir: &Path, new_dir: &Path) {
        let moved: Vec<PathBuf> = self
            .loaded
            .keys()
            .filter(|path| path.starts_with(old_dir))
            .cloned()
            .collect();
        for old in moved {
            let Some(new) = rebase(&old, old_dir, new_dir) else {
                continue;
            };
            if let Some(resource) = self.loaded.remove(&old) {
                self.loaded.insert(new, resource);
            }
        }
    }

    fn request(&mut self, path: &Path) -> Result<()> {
        if self.loaded.contains_key(path) {
            return Ok(());
        }
        let resource = self.load(path)?;
        self.loaded.insert(path.to_path_buf(), resource);
        debug!("Loaded {}", path.display());
        Ok(())
    }

    fn load_detached(&mut self, path: &Path) -> Result<Box<dyn Resource>> {
        self.load(path)
    }

    fn save_detached(&mut self, path: &Path, resource: &dyn Resource) -> Result<()> {
        write_resource(path, resource)
    }

    fn loaded_mut(&mut self, path: &Path) -> Option<&mut dyn Resource> {
        let resource = self.loaded.get_mut(path)?;
        Some(resource.as_mut())
    }

    fn list_loaded(&self) -> Vec<PathBuf> {
        self.loaded.keys().cloned().collect()
    }

    fn list_all_on_disk(&self) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        for entry in WalkDir::new(&self.data_root).follow_links(false) {
            let entry = entry?;
            if entry.file_type().is_file() && self.rules.is_resource_file(entry.path()) {
                files.push(entry.into_path());
            }
        }
        files.sort();
        Ok(files)
    }
}

/// Application and user settings kept in two JSON files
#[derive(Debug)]
pub struct JsonSettingsStore {
    application_path: PathBuf,
    user_path: PathBuf,
    application: JsonDocument,
    user: JsonDocument,
}

impl JsonSettingsStore {
    /// Settings files whose references resolve against `data_root`
    ///
    /// Nothing is read until [`SettingsStore::reload`] is called.
    pub fn new(application_path: impl Into<PathBuf>, user_path: impl Into<PathBuf>, data_root: &Path) -> Self {
        let empty = || JsonDocument::new(ResourceType::new("Settings"), data_root, Value::Object(Map::new()));
        Self {
            application_path: application_path.into(),
            user_path: user_path.into(),
            application: empty(),
            user: empty(),
        }
    }

    /// The in-memory settings document of `scope`
    pub fn document(&self, scope: SettingsScope) -> &JsonDocument {
        match scope {
            SettingsScope::Application => &self.application,
            SettingsScope::User => &self.user,
        }
    }

    fn slot(&mut self, scope: SettingsScope) -> (&Path, &mut JsonDocument) {
        match scope {
            SettingsScope::Application => (self.application_path.as_path(), &mut self.application),
            SettingsScope::User => (self.user_path.as_path(), &mut self.user),
        }
    }
}

impl SettingsStore for JsonSettingsStore {
    fn reload(&mut self, scope: SettingsScope) -> Result<()> {
        let (path, document) = self.slot(scope);
        let value = if path.is_file() {
            let text = fs::read_to_string(path)?;
            serde_json::from_str(&text).map_err(|e| SyncError::parse(path, e.to_string()))?
        } else {
            Value::Object(Map::new())
        };
        document.value = value;
        Ok(())
    }

    fn settings_mut(&mut self, scope: SettingsScope) -> &mut dyn VisitReferences {
        self.slot(scope).1
    }

    // Written in place for the same reason as `write_resource`
    fn save(&mut self, scope: SettingsScope) -> Result<()> {
        let (path, document) = self.slot(scope);
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(path, document.to_json()?)?;
        Ok(())
    }
}

/// Recycle bin that moves items into timestamped folders below a directory
#[derive(Debug, Clone)]
pub struct TrashDirectory {
    root: PathBuf,
}

impl TrashDirectory {
    /// Use `root` as the trash location; it is created on first use
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Trash location
    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl RecycleBin for TrashDirectory {
    fn send_to_recycle(&mut self, paths: &[PathBuf]) -> RecycleOutcome {
        let batch = self.root.join(Local::now().format("%Y%m%d-%H%M%S%.3f").to_string());
        let mut outcome = RecycleOutcome::default();

        for path in paths {
            if !path.exists() {
                trace!("{} is already gone", path.display());
                outcome.recycled.push(path.clone());
                continue;
            }
            match trash_one(path, &batch) {
                Ok(target) => {
                    trace!("Moved {} to {}", path.display(), target.display());
                    outcome.recycled.push(path.clone());
                }
                Err(e) => {
                    warn!("Could not move {} to the trash: {}", path.display(), e);
                    outcome.failed.push((path.clone(), e));
                }
            }
        }
        info!(
            "Moved {} of {} items to {}",
            outcome.recycled.len(),
            paths.len(),
            batch.display()
        );
        outcome
    }
}

fn trash_one(path: &Path, batch: &Path) -> Result<PathBuf> {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "item".to_string());
    let mut target = batch.join(&name);
    let mut suffix = 1;
    while target.exists() {
        target = batch.join(format!("{}.{}", name, suffix));
        suffix += 1;
    }

    if move_or_copy(path, &target)? == MoveOutcome::Copied {
        if path.is_dir() {
            fs::remove_dir_all(path)?;
        } else {
            fs::remove_file(path)?;
        }
    }
    Ok(target)
}
