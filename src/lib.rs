//! # assetsync - Keep an asset project consistent with its file system
//!
//! A library that watches the data tree of an asset project (and the source
//! tree its media was imported from) and reconciles the in-memory project state
//! with whatever external tools do to those files.
//!
//! ## Overview
//!
//! Files get created, edited, moved and deleted by image editors, version
//! control and file managers while the editor is running. assetsync:
//! - Collects raw notifications from the OS watchers and reduces bursts of them
//!   to a minimal set of semantic events
//! - Evicts stale cached content and asks before throwing away unsaved work
//! - Moves or recycles the source/media files that belong to moved or deleted
//!   assets
//! - Rewrites every reference to a renamed asset or directory across the whole
//!   project, in small steps that keep the host responsive
//! - Tells interested modules about every change that happened
//!
//! ## Architecture
//!
//! - **Event buffers**: raw notifications per watched root, deduplicated on
//!   arrival ([`buffer`])
//! - **Aggregation**: folds rename chains, safe-saves and delete/create pairs
//!   into single events ([`aggregate`], [`filter`])
//! - **Synchronization**: applies one drain cycle to the content cache and the
//!   media tree ([`sync`], [`mirror`], [`source`])
//! - **Propagation**: a resumable state machine rewriting references for one
//!   rename batch ([`propagate`], [`references`])
//! - **Engine**: owns all state and is driven by the host's idle tick
//!   ([`engine`]); watcher threads only ever talk to it through a channel
//!
//! Everything the engine needs from the surrounding editor is a trait in
//! [`collaborators`]. File-backed implementations live in [`json_store`].
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use assetsync::json_store::{AssetRules, JsonAssetStore, TrashDirectory};
//! use assetsync::watcher::spawn_watchers;
//! use assetsync::{EngineConfig, SyncEngine};
//! use std::time::{Duration, Instant};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = EngineConfig::new("/project/Data", "/project/Source");
//! let rules = AssetRules::default().with_roots(&config.data_root, config.media_root());
//!
//! let mut engine = SyncEngine::builder()
//!     .catalog(rules.clone())
//!     .cache(JsonAssetStore::new(&config.data_root, rules))
//!     .recycle_bin(TrashDirectory::new("/project/.trash"))
//!     .build(config.clone())?;
//! let events = engine.event_channel();
//! let _watchers = spawn_watchers(&config, engine.inbox())?;
//!
//! loop {
//!     engine.tick(Instant::now());
//!     for event in events.try_iter() {
//!         println!("{}", event);
//!     }
//!     std::thread::sleep(Duration::from_millis(20));
//! }
//! # }
//! ```
//!
//! ## Key Concepts
//!
//! ### Drain cycles
//!
//! Notifications are not handled as they arrive. The host ticks the engine
//! periodically and, at most once per quiescence window, the buffered events
//! of each root are aggregated, filtered and applied in one go. Editor-made
//! writes flagged with [`SyncEngine::flag_path_modified`] are suppressed for at
//! least one full cycle.
//!
//! ### Rename propagation
//!
//! Renames accepted during a drain are propagated as one batch on later ticks.
//! Listeners can veto a single rename before it joins the batch. Batches that
//! arrive while another is running are queued, never dropped.
//!
//! ## Error Handling
//!
//! Building blocks return `Result<T, SyncError>`. A drain cycle or propagation
//! step never fails as a whole; failures become warnings in the returned
//! [`DrainReport`] or [`PropagationReport`].
//!
//! ## Module Organization
//!
//! - [`engine`]: The engine, its builder and the inbox
//! - [`config`]: Engine configuration
//! - [`collaborators`]: Contracts for the editor-side systems
//! - [`events`]: Semantic events and listener registration
//! - [`watcher`]: OS watcher adapter
//! - [`json_store`]: File-backed collaborators
//! - [`types`]: Common types and data structures
//! - [`error`]: Error types and handling

// Public API modules
pub mod collaborators;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod json_store;
pub mod references;
pub mod types;
pub mod watcher;

// Pipeline stages
pub mod aggregate;
pub mod buffer;
pub mod filter;
pub mod mirror;
pub mod propagate;
pub mod self_modified;
pub mod source;
pub mod sync;

// Re-export main types for convenience
pub use collaborators::{
    AssetCatalog, ContentCache, DocumentState, PathVisibility, RecycleBin, RecycleOutcome, Reimporter,
    Resource, ResourceType, SettingsStore, UserInterface,
};
pub use config::EngineConfig;
pub use engine::{InboxSender, SyncEngine, SyncEngineBuilder};
pub use error::{Result, SyncError};
pub use events::{BeginGlobalRename, ResourceEvent, SubscriptionId, SyncListener};
pub use references::{Reference, VisitReferences};
pub use types::*;
