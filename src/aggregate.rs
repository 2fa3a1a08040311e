//! Folding of related raw events into minimal semantic events
//!
//! Watchers report what the OS saw, not what the user did. Moving a file between
//! directories may arrive as a delete plus a create, "safe save" tools delete the
//! original and rename a temporary file onto it, and a quick series of renames
//! arrives as a chain. The aggregator recognizes these patterns and rewrites the
//! event list in place so that the latest event of each chain defines its
//! position in the final order.
//!
//! The list is scanned newest to oldest. Each event is compared with every older
//! event still in the list, and whenever a fold applies the comparison of that
//! event starts over against the shrunken list. Passes repeat until nothing
//! folds any more, so the result is a fixpoint: aggregating an aggregated list
//! changes nothing.

use crate::types::{FileEvent, FileEventKind};
use tracing::trace;

/// A fold between a newer and an older event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Fold {
    /// Two renames of the same item
    RenameChain,
    /// A rename onto a path whose previous occupant was just deleted
    RenameOntoDeleted,
    /// A delete followed by a create of an item with the same name
    DeleteThenCreate,
}

/// Aggregate an event list in place until no more folds apply
///
/// # Returns
///
/// The number of folds performed.
pub fn aggregate(events: &mut Vec<FileEvent>) -> usize {
    let mut folds = 0;
    loop {
        let pass = aggregate_pass(events);
        if pass == 0 {
            break;
        }
        folds += pass;
    }
    folds
}

fn aggregate_pass(events: &mut Vec<FileEvent>) -> usize {
    let mut folds = 0;
    let mut current = events.len();

    while current > 1 {
        current -= 1;
        let mut prev = current;
        while prev > 0 {
            prev -= 1;
            let Some(fold) = find_fold(&events[current], &events[prev]) else {
                continue;
            };
            trace!("{:?}: {} folds {}", fold, events[current], events[prev]);

            match fold {
                Fold::RenameChain => {
                    events[current].old_path = events[prev].old_path.clone();
                }
                Fold::RenameOntoDeleted => {
                    let replaced = FileEvent::renamed(
                        events[prev].path.clone(),
                        events[current].path.clone(),
                        events[current].is_directory,
                    );
                    let target = &mut events[current];
                    target.kind = FileEventKind::Changed;
                    target.old_path = target.path.clone();
                    events.insert(current, replaced);
                    current += 1;
                }
                Fold::DeleteThenCreate => {
                    let deleted_path = events[prev].path.clone();
                    let target = &mut events[current];
                    if target.path == deleted_path {
                        target.kind = FileEventKind::Changed;
                    } else {
                        target.kind = FileEventKind::Renamed;
                        target.old_path = deleted_path;
                    }
                }
            }

            events.remove(prev);
            current -= 1;
            folds += 1;
            prev = current;
        }
    }
    folds
}

fn find_fold(current: &FileEvent, prev: &FileEvent) -> Option<Fold> {
    match (current.kind, prev.kind) {
        (FileEventKind::Renamed, FileEventKind::Renamed)
            if current.old_file_name().is_some() && current.old_file_name() == prev.file_name() =>
        {
            Some(Fold::RenameChain)
        }
        (FileEventKind::Renamed, FileEventKind::Deleted) if current.path == prev.path => {
            Some(Fold::RenameOntoDeleted)
        }
        (FileEventKind::Created, FileEventKind::Deleted)
            if current.file_name().is_some() && current.file_name() == prev.file_name() =>
        {
            Some(Fold::DeleteThenCreate)
        }
        _ => None,
    }
}
