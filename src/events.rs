//! Events produced for editor modules and plugins
//!
//! After a drain cycle the engine raises one [`ResourceEvent`] per surviving
//! event that concerns an asset or a directory. Before propagating a rename it
//! asks every listener whether the rename may be propagated
//! ([`BeginGlobalRename`]).
//!
//! Consumers either register a [`SyncListener`] with the [`EventBus`] or open a
//! channel with [`EventBus::channel`] and poll it on their own schedule.
//!
//! ```rust
//! use assetsync::events::{EventBus, ResourceEvent};
//!
//! let mut bus = EventBus::new();
//! let rx = bus.channel();
//! bus.publish(ResourceEvent::Deleted { path: "/data/a.res".into(), is_directory: false });
//! assert_eq!(rx.try_iter().count(), 1);
//! ```

use crate::types::{FileEvent, FileEventKind};
use crossbeam_channel::{unbounded, Receiver, Sender};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use tracing::{debug, trace};

/// A semantic change to a resource or directory
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceEvent {
    /// A resource or directory appeared
    Created {
        /// Absolute path
        path: PathBuf,
        /// Whether `path` is a directory
        is_directory: bool,
    },
    /// A resource or directory was deleted
    Deleted {
        /// Absolute path
        path: PathBuf,
        /// Whether `path` was a directory
        is_directory: bool,
    },
    /// A resource was modified outside the editor
    Modified {
        /// Absolute path
        path: PathBuf,
        /// Whether `path` is a directory
        is_directory: bool,
    },
    /// A resource or directory was renamed or moved
    Renamed {
        /// New absolute path
        path: PathBuf,
        /// Previous absolute path
        old_path: PathBuf,
        /// Whether `path` is a directory
        is_directory: bool,
    },
    /// A plugin binary was created or rebuilt
    PluginBinaryChanged {
        /// Absolute path of the binary
        path: PathBuf,
    },
}

impl ResourceEvent {
    /// The semantic event corresponding to a processed file event
    pub fn from_file_event(event: &FileEvent) -> Self {
        let path = event.path.clone();
        let is_directory = event.is_directory;
        match event.kind {
            FileEventKind::Created => ResourceEvent::Created { path, is_directory },
            FileEventKind::Changed => ResourceEvent::Modified { path, is_directory },
            FileEventKind::Deleted => ResourceEvent::Deleted { path, is_directory },
            FileEventKind::Renamed => ResourceEvent::Renamed {
                path,
                old_path: event.old_path.clone(),
                is_directory,
            },
        }
    }

    /// Path the event is about
    pub fn path(&self) -> &PathBuf {
        match self {
            ResourceEvent::Created { path, .. }
            | ResourceEvent::Deleted { path, .. }
            | ResourceEvent::Modified { path, .. }
            | ResourceEvent::Renamed { path, .. }
            | ResourceEvent::PluginBinaryChanged { path } => path,
        }
    }
}

impl fmt::Display for ResourceEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceEvent::Created { path, .. } => write!(f, "created {}", path.display()),
            ResourceEvent::Deleted { path, .. } => write!(f, "deleted {}", path.display()),
            ResourceEvent::Modified { path, .. } => write!(f, "modified {}", path.display()),
            ResourceEvent::Renamed { path, old_path, .. } => {
                write!(f, "renamed {} -> {}", old_path.display(), path.display())
            }
            ResourceEvent::PluginBinaryChanged { path } => {
                write!(f, "plugin changed {}", path.display())
            }
        }
    }
}

/// Last-chance veto before a rename is propagated through the project
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BeginGlobalRename {
    /// New absolute path
    pub path: PathBuf,
    /// Previous absolute path
    pub old_path: PathBuf,
    /// Whether the renamed item is a directory
    pub is_directory: bool,
    /// Set to `true` to keep this rename out of reference propagation
    pub cancel: bool,
}

impl BeginGlobalRename {
    /// Veto for a rename event
    pub fn for_event(event: &FileEvent) -> Self {
        Self {
            path: event.path.clone(),
            old_path: event.old_path.clone(),
            is_directory: event.is_directory,
            cancel: false,
        }
    }
}

/// Receiver of engine events
///
/// Listeners run on the owner thread while the engine is processing, so they
/// must not call back into the engine.
pub trait SyncListener {
    /// Called once for every produced resource event
    fn on_resource_event(&mut self, event: &ResourceEvent);

    /// Called before a rename is queued for propagation
    ///
    /// Setting `rename.cancel` skips reference propagation for this rename.
    /// Cache and source/media updates still happen.
    fn on_begin_global_rename(&mut self, _rename: &mut BeginGlobalRename) {}
}

/// Handle identifying a registered listener
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

/// Fan-out of engine events to listeners and channels
#[derive(Default)]
pub struct EventBus {
    next_id: u64,
    listeners: Vec<(SubscriptionId, Box<dyn SyncListener>)>,
    channels: Vec<Sender<ResourceEvent>>,
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("listeners", &format!("<{} listeners>", self.listeners.len()))
            .field("channels", &self.channels.len())
            .finish()
    }
}

impl EventBus {
    /// Create a bus without subscribers
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener
    pub fn subscribe(&mut self, listener: Box<dyn SyncListener>) -> SubscriptionId {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.listeners.push((id, listener));
        debug!("Listener {:?} subscribed", id);
        id
    }

    /// Remove a listener
    ///
    /// Returns `false` if `id` was not registered.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(existing, _)| *existing != id);
        before != self.listeners.len()
    }

    /// Open a channel receiving every future resource event
    ///
    /// The channel is closed from the bus side once the receiver is dropped.
    pub fn channel(&mut self) -> Receiver<ResourceEvent> {
        let (tx, rx) = unbounded();
        self.channels.push(tx);
        rx
    }

    /// Number of registered listeners and open channels
    pub fn subscriber_count(&self) -> usize {
        self.listeners.len() + self.channels.len()
    }

    /// Deliver a resource event to every subscriber
    pub fn publish(&mut self, event: ResourceEvent) {
        trace!("Publishing {}", event);
        for (_, listener) in &mut self.listeners {
            listener.on_resource_event(&event);
        }
        self.channels.retain(|tx| tx.send(event.clone()).is_ok());
    }

    /// Ask every listener whether `event` may be propagated
    ///
    /// Returns `true` if some listener cancelled the propagation.
    pub fn begin_global_rename(&mut self, event: &FileEvent) -> bool {
        let mut rename = BeginGlobalRename::for_event(event);
        for (_, listener) in &mut self.listeners {
            listener.on_begin_global_rename(&mut rename);
        }
        if rename.cancel {
            debug!("Propagation of {} cancelled by a listener", event);
        }
        rename.cancel
    }
}
