//! OS watcher adapter
//!
//! Bridges `notify` to the engine inbox. One recursive watcher is created per
//! root (data, source and every plugin directory); each translates the backend
//! events into [`RawEvent`]s and sends them through an [`InboxSender`].
//!
//! Backends differ in how they report renames. inotify reports a `From` half,
//! a `To` half and then a combined `Both` event sharing one tracker cookie;
//! Windows reports only the two halves. [`EventTranslator`] pairs the halves
//! into a single rename and suppresses the combined duplicate. A `From` half
//! that is never completed (the entry left the watched tree) is reported as a
//! deletion once the next notification arrives or once
//! [`WatcherHandle::flush_unpaired`] finds it older than the given age.
//!
//! A removed path can no longer be inspected, and not every backend says
//! whether it was a directory. The translator therefore remembers the
//! directories of its root, seeded by a walk when watching starts and kept
//! current from the events it translates.

use crate::config::EngineConfig;
use crate::engine::InboxSender;
use crate::error::{Result, SyncError};
use crate::types::{RawEvent, RawEventKind, WatchRoot};
use notify::event::{CreateKind, ModifyKind, RemoveKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, trace};
use walkdir::WalkDir;

/// A raw event together with whether its path is a directory
pub type Translated = (RawEvent, bool);

#[derive(Debug, Clone)]
struct PendingFrom {
    path: PathBuf,
    is_dir: bool,
    tracker: Option<usize>,
    since: Instant,
}

/// Turns `notify` events of one root into raw engine events
#[derive(Debug, Default)]
pub struct EventTranslator {
    pending: Option<PendingFrom>,
    completed: HashSet<usize>,
    known_dirs: HashSet<PathBuf>,
}

impl EventTranslator {
    /// Create a translator with no pending rename halves
    pub fn new() -> Self {
        Self::default()
    }

    /// Remember every directory at or below `root`
    ///
    /// # Returns
    ///
    /// Number of directories found.
    pub fn seed_directories(&mut self, root: &Path) -> usize {
        let before = self.known_dirs.len();
        for entry in WalkDir::new(root).follow_links(false) {
            match entry {
                Ok(entry) if entry.file_type().is_dir() => {
                    self.known_dirs.insert(entry.into_path());
                }
                Ok(_) => {}
                Err(e) => debug!("Skipping unreadable entry while seeding directories: {}", e),
            }
        }
        self.known_dirs.len() - before
    }

    /// Whether `path` was last seen as a directory
    pub fn is_known_dir(&self, path: &Path) -> bool {
        self.known_dirs.contains(path)
    }

    /// Whether a rename `From` half is waiting for its counterpart
    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    fn note_created(&mut self, path: &Path, is_dir: bool) {
        if is_dir {
            for entry in WalkDir::new(path).follow_links(false).into_iter().flatten() {
                if entry.file_type().is_dir() {
                    self.known_dirs.insert(entry.into_path());
                }
            }
            self.known_dirs.insert(path.to_path_buf());
        }
    }

    /// Forget `path` and everything below it, returning whether it was a directory
    fn note_removed(&mut self, path: &Path) -> bool {
        let was_dir = self.known_dirs.contains(path);
        if was_dir {
            self.known_dirs.retain(|dir| !dir.starts_with(path));
        }
        was_dir
    }

    fn note_renamed(&mut self, from: &Path, to: &Path, is_dir: bool) -> bool {
        let was_dir = self.known_dirs.contains(from);
        if was_dir {
            let moved: Vec<PathBuf> = self
                .known_dirs
                .iter()
                .filter(|dir| dir.starts_with(from))
                .cloned()
                .collect();
            for dir in moved {
                self.known_dirs.remove(&dir);
                if let Ok(rest) = dir.strip_prefix(from) {
                    self.known_dirs.insert(to.join(rest));
                }
            }
        }
        let is_dir = is_dir || was_dir;
        if is_dir {
            self.known_dirs.insert(to.to_path_buf());
        }
        is_dir
    }

    fn renamed(&mut self, from: PathBuf, to: &Path) -> Translated {
        let is_dir = self.note_renamed(&from, to, to.is_dir());
        (RawEvent::renamed(from, to.to_path_buf()), is_dir)
    }

    /// Translate one backend event
    ///
    /// May return events for an earlier unpaired rename half before the
    /// events of `event` itself.
    pub fn translate(&mut self, event: &Event) -> Vec<Translated> {
        let tracker = event.tracker();
        let mut out = Vec::new();

        match event.kind {
            EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
                self.flush_into(&mut out);
                if let Some(path) = event.paths.first() {
                    self.pending = Some(PendingFrom {
                        path: path.clone(),
                        is_dir: self.is_known_dir(path),
                        tracker,
                        since: Instant::now(),
                    });
                }
            }
            EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
                let Some(to) = event.paths.first() else {
                    return out;
                };
                match self.pending.take() {
                    Some(from) if from.tracker == tracker => {
                        if let Some(id) = tracker {
                            self.completed.insert(id);
                        }
                        let translated = self.renamed(from.path, to);
                        out.push(translated);
                    }
                    other => {
                        self.pending = other;
                        self.flush_into(&mut out);
                        let is_dir = to.is_dir();
                        self.note_created(to, is_dir);
                        out.push((RawEvent::new(to.clone(), RawEventKind::Created), is_dir));
                    }
                }
            }
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
                if tracker.is_some_and(|id| self.completed.remove(&id)) {
                    trace!("Skipping combined rename already reported by its halves");
                    return out;
                }
                if self.pending.as_ref().is_some_and(|p| p.tracker.is_some() && p.tracker == tracker) {
                    self.pending = None;
                }
                self.flush_into(&mut out);
                if let [from, to, ..] = event.paths.as_slice() {
                    let translated = self.renamed(from.clone(), to);
                    out.push(translated);
                }
            }
            EventKind::Modify(ModifyKind::Name(_)) => {
                self.flush_into(&mut out);
                if let [from, to, ..] = event.paths.as_slice() {
                    let translated = self.renamed(from.clone(), to);
                    out.push(translated);
                } else {
                    // Backends without pairing information report each side separately
                    for path in &event.paths {
                        if path.exists() {
                            let is_dir = path.is_dir();
                            self.note_created(path, is_dir);
                            out.push((RawEvent::new(path.clone(), RawEventKind::Created), is_dir));
                        } else {
                            let is_dir = self.note_removed(path);
                            out.push((RawEvent::new(path.clone(), RawEventKind::Deleted), is_dir));
                        }
                    }
                }
            }
            EventKind::Create(kind) => {
                self.flush_into(&mut out);
                for path in &event.paths {
                    let is_dir = kind == CreateKind::Folder || path.is_dir();
                    self.note_created(path, is_dir);
                    out.push((RawEvent::new(path.clone(), RawEventKind::Created), is_dir));
                }
            }
            EventKind::Modify(ModifyKind::Data(_))
            | EventKind::Modify(ModifyKind::Metadata(_))
            | EventKind::Modify(ModifyKind::Any) => {
                self.flush_into(&mut out);
                for path in &event.paths {
                    out.push((RawEvent::new(path.clone(), RawEventKind::Changed), path.is_dir()));
                }
            }
            EventKind::Remove(kind) => {
                self.flush_into(&mut out);
                for path in &event.paths {
                    let was_dir = self.note_removed(path);
                    out.push((
                        RawEvent::new(path.clone(), RawEventKind::Deleted),
                        kind == RemoveKind::Folder || was_dir,
                    ));
                }
            }
            _ => {}
        }
        out
    }

    /// Report a waiting `From` half as a deletion
    pub fn flush(&mut self) -> Option<Translated> {
        let from = self.pending.take()?;
        self.note_removed(&from.path);
        Some((RawEvent::new(from.path, RawEventKind::Deleted), from.is_dir))
    }

    /// Report a waiting `From` half as a deletion if it is older than `max_age`
    pub fn flush_expired(&mut self, now: Instant, max_age: Duration) -> Option<Translated> {
        let expired = self
            .pending
            .as_ref()
            .is_some_and(|p| now.saturating_duration_since(p.since) >= max_age);
        if expired {
            self.flush()
        } else {
            None
        }
    }

    fn flush_into(&mut self, out: &mut Vec<Translated>) {
        if let Some(event) = self.flush() {
            trace!("Rename source {} left the watched tree", event.0.path.display());
            out.push(event);
        }
    }
}

struct RootWatch {
    root: WatchRoot,
    translator: Arc<Mutex<EventTranslator>>,
    _watcher: RecommendedWatcher,
}

/// Keeps the OS watchers of one engine alive
///
/// Dropping the handle stops watching.
pub struct WatcherHandle {
    watches: Vec<RootWatch>,
    inbox: InboxSender,
}

impl std::fmt::Debug for WatcherHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatcherHandle")
            .field("roots", &self.watches.iter().map(|w| w.root).collect::<Vec<_>>())
            .finish()
    }
}

impl WatcherHandle {
    /// Number of active root watchers
    pub fn len(&self) -> usize {
        self.watches.len()
    }

    /// Whether no root is watched
    pub fn is_empty(&self) -> bool {
        self.watches.is_empty()
    }

    /// Report rename sources that waited longer than `max_age` for their
    /// counterpart as deleted
    ///
    /// # Returns
    ///
    /// Number of deletions sent.
    pub fn flush_unpaired(&self, max_age: Duration) -> usize {
        let now = Instant::now();
        let mut sent = 0;
        for watch in &self.watches {
            let flushed = match watch.translator.lock() {
                Ok(mut translator) => translator.flush_expired(now, max_age),
                Err(poisoned) => poisoned.into_inner().flush_expired(now, max_age),
            };
            if let Some((event, is_dir)) = flushed {
                if self.inbox.send(watch.root, event, is_dir) {
                    sent += 1;
                }
            }
        }
        sent
    }
}

/// Start one recursive watcher per configured root
///
/// The data and source roots must exist; missing plugin directories are
/// skipped.
pub fn spawn_watchers(config: &EngineConfig, inbox: InboxSender) -> Result<WatcherHandle> {
    let mut roots = vec![
        (WatchRoot::Data, config.data_root.clone()),
        (WatchRoot::Source, config.source_root.clone()),
    ];
    roots.extend(config.plugin_dirs.iter().map(|dir| (WatchRoot::Plugin, dir.clone())));

    let mut watches = Vec::with_capacity(roots.len());
    for (root, path) in roots {
        if !path.is_dir() {
            if root == WatchRoot::Plugin {
                debug!("Plugin directory {} does not exist, not watching it", path.display());
                continue;
            }
            return Err(SyncError::InvalidConfiguration(format!(
                "{:?} root {} is not a directory",
                root,
                path.display()
            )));
        }
        watches.push(watch_root(root, &path, inbox.clone())?);
    }

    info!("Watching {} roots", watches.len());
    Ok(WatcherHandle { watches, inbox })
}

fn watch_root(root: WatchRoot, path: &Path, inbox: InboxSender) -> Result<RootWatch> {
    let mut seeded = EventTranslator::new();
    let dirs = seeded.seed_directories(path);
    trace!("Seeded {} known directories for {:?} root", dirs, root);
    let translator = Arc::new(Mutex::new(seeded));
    let shared = translator.clone();

    let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
        Ok(event) => {
            trace!("File system event: {:?}", event);
            let translated = match shared.lock() {
                Ok(mut translator) => translator.translate(&event),
                Err(poisoned) => poisoned.into_inner().translate(&event),
            };
            for (raw, is_dir) in translated {
                if !inbox.send(root, raw, is_dir) {
                    debug!("Engine is gone, dropping notification");
                    return;
                }
            }
        }
        Err(e) => error!("Watch error on {:?} root: {}", root, e),
    })?;

    watcher.watch(path, RecursiveMode::Recursive)?;
    info!("Started watching {:?} root {}", root, path.display());

    Ok(RootWatch {
        root,
        translator,
        _watcher: watcher,
    })
}
