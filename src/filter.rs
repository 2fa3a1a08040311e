//! Removal of events nobody should react to

use crate::self_modified::SelfModificationSet;
use crate::types::{FileEvent, FileEventKind};
use tracing::trace;

/// Drop no-op renames and change notifications caused by the editor's own saves
///
/// # Returns
///
/// The number of events removed.
pub fn filter_events(events: &mut Vec<FileEvent>, self_modified: &SelfModificationSet) -> usize {
    let before = events.len();
    events.retain(|event| {
        if event.is_noop_rename() {
            trace!("Dropping no-op rename of {}", event.path.display());
            return false;
        }
        if event.kind == FileEventKind::Changed && self_modified.contains(&event.path) {
            trace!("Dropping self-inflicted change of {}", event.path.display());
            return false;
        }
        true
    });
    before - events.len()
}
