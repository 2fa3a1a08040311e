//! Path references embedded in documents and the rename rewrite rule
//!
//! Documents (scenes, prefabs, configuration objects) point at other assets by
//! path. When an asset or directory is renamed outside the editor, every such
//! reference has to follow, otherwise the project silently loses links.
//!
//! Instead of reflecting over arbitrary object graphs, each document type
//! enumerates its own reference fields by implementing [`VisitReferences`].
//! Blanket implementations cover the usual containers so that a type usually
//! only has to forward to its fields:
//!
//! ```rust
//! use assetsync::references::{Reference, VisitReferences};
//!
//! struct Material {
//!     main_texture: Reference,
//!     extra: Vec<Reference>,
//! }
//!
//! impl VisitReferences for Material {
//!     fn visit_references(&mut self, visitor: &mut dyn FnMut(&mut Reference)) {
//!         self.main_texture.visit_references(visitor);
//!         self.extra.visit_references(visitor);
//!     }
//! }
//! ```

use crate::types::{FileEvent, FileEventKind};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

/// Prefix identifying built-in content that never lives in the data tree
pub const DEFAULT_CONTENT_PREFIX: &str = "default:";

/// A pointer-by-path to another asset
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Reference {
    /// Referenced path; empty when unset
    pub path: PathBuf,
    /// Explicitly pointing at nothing (as opposed to unset)
    #[serde(default)]
    pub explicit_null: bool,
}

impl Reference {
    /// Create a reference to `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            explicit_null: false,
        }
    }

    /// Create an explicit null reference
    pub fn null() -> Self {
        Self {
            path: PathBuf::new(),
            explicit_null: true,
        }
    }

    /// Whether the reference points at built-in content
    pub fn is_default_content(&self) -> bool {
        self.path
            .to_str()
            .is_some_and(|p| p.starts_with(DEFAULT_CONTENT_PREFIX))
    }

    /// Whether the reference has no path
    pub fn is_unset(&self) -> bool {
        self.path.as_os_str().is_empty()
    }
}

/// Enumerates every [`Reference`] reachable from a value
///
/// Implementations must visit exhaustively, including references nested in
/// collections and child objects.
pub trait VisitReferences {
    /// Call `visitor` once for every reachable reference
    fn visit_references(&mut self, visitor: &mut dyn FnMut(&mut Reference));
}

impl VisitReferences for Reference {
    fn visit_references(&mut self, visitor: &mut dyn FnMut(&mut Reference)) {
        visitor(self);
    }
}

impl<T: VisitReferences + ?Sized> VisitReferences for Box<T> {
    fn visit_references(&mut self, visitor: &mut dyn FnMut(&mut Reference)) {
        (**self).visit_references(visitor);
    }
}

impl<T: VisitReferences> VisitReferences for Option<T> {
    fn visit_references(&mut self, visitor: &mut dyn FnMut(&mut Reference)) {
        if let Some(inner) = self {
            inner.visit_references(visitor);
        }
    }
}

impl<T: VisitReferences> VisitReferences for Vec<T> {
    fn visit_references(&mut self, visitor: &mut dyn FnMut(&mut Reference)) {
        for item in self.iter_mut() {
            item.visit_references(visitor);
        }
    }
}

impl<K, V: VisitReferences> VisitReferences for BTreeMap<K, V> {
    fn visit_references(&mut self, visitor: &mut dyn FnMut(&mut Reference)) {
        for value in self.values_mut() {
            value.visit_references(visitor);
        }
    }
}

impl<K, V: VisitReferences, S> VisitReferences for HashMap<K, V, S> {
    fn visit_references(&mut self, visitor: &mut dyn FnMut(&mut Reference)) {
        for value in self.values_mut() {
            value.visit_references(visitor);
        }
    }
}

/// Apply a rename batch to a single reference
///
/// Returns `true` if the reference was rewritten. The first matching event
/// wins. File renames match on exact path equality; directory renames match
/// any reference located inside the old directory and keep the remainder of
/// the path unchanged.
pub fn rewrite_reference(reference: &mut Reference, batch: &[FileEvent]) -> bool {
    if reference.explicit_null || reference.is_default_content() || reference.is_unset() {
        return false;
    }

    for event in batch.iter().filter(|e| e.kind == FileEventKind::Renamed) {
        if !event.is_directory {
            if reference.path == event.old_path {
                reference.path = event.path.clone();
                return true;
            }
        } else if let Some(rebased) = rebase(&reference.path, &event.old_path, &event.path) {
            reference.path = rebased;
            return true;
        }
    }
    false
}

/// Apply a rename batch to every reference reachable from `target`
///
/// Returns the number of references rewritten.
pub fn rewrite_references<T: VisitReferences + ?Sized>(target: &mut T, batch: &[FileEvent]) -> usize {
    let mut count = 0;
    target.visit_references(&mut |reference| {
        if rewrite_reference(reference, batch) {
            count += 1;
        }
    });
    count
}

/// Re-root `path` from `old_root` onto `new_root`
///
/// Returns `None` when `path` is not located inside `old_root`. Matching is
/// done per component, so `/data/ab` is not inside `/data/a`.
pub fn rebase(path: &Path, old_root: &Path, new_root: &Path) -> Option<PathBuf> {
    let rest = path.strip_prefix(old_root).ok()?;
    if rest.as_os_str().is_empty() {
        Some(new_root.to_path_buf())
    } else {
        Some(new_root.join(rest))
    }
}
