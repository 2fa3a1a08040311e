//! The sync engine
//!
//! [`SyncEngine`] owns all state of one watched project: the per-root event
//! buffers, the self-modification set, the reimport schedule and the rename
//! propagations that are queued or running. It is driven entirely by its host:
//!
//! - watcher threads send notifications through an [`InboxSender`]
//! - the host calls [`SyncEngine::tick`] periodically on its owner thread
//! - the host calls [`SyncEngine::on_focus_regained`] when its window is
//!   activated again
//! - the host calls [`SyncEngine::flag_path_modified`] after saving a file
//!
//! Nothing inside the engine is shared between threads except the inbox, so
//! several engines can coexist in one process.
//!
//! # Examples
//!
//! ```rust,ignore
//! use assetsync::{EngineConfig, SyncEngineBuilder};
//! use std::time::Instant;
//!
//! let mut engine = SyncEngineBuilder::new()
//!     .catalog(my_catalog)
//!     .cache(my_cache)
//!     .recycle_bin(my_bin)
//!     .build(EngineConfig::new("/project/Data", "/project/Source"))?;
//!
//! let inbox = engine.inbox();
//! // hand `inbox` to the watchers, then on every idle tick:
//! let report = engine.tick(Instant::now());
//! ```

use crate::aggregate::aggregate;
use crate::buffer::EventBuffer;
use crate::collaborators::{
    AssetCatalog, AutoConfirm, Collaborators, ContentCache, DocumentState, HiddenPathFilter,
    NoDocuments, NoReimport, NoSettings, PathVisibility, RecycleBin, Reimporter, SettingsStore,
    UserInterface,
};
use crate::config::EngineConfig;
use crate::error::{Result, SyncError};
use crate::events::{EventBus, ResourceEvent, SubscriptionId, SyncListener};
use crate::filter::filter_events;
use crate::mirror::MediaMirror;
use crate::propagate::RenamePropagation;
use crate::self_modified::SelfModificationSet;
use crate::source::ReimportSchedule;
use crate::sync::{mark_deleted_directories, synchronize};
use crate::types::{
    DrainReport, FileEvent, FileEventKind, ProgressInfo, PropagationReport, RawEvent, RawEventKind,
    WatchRoot,
};
use crossbeam_channel::{unbounded, Receiver, Sender};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, instrument, trace};

/// Finished propagation reports kept until the host collects them
pub const MAX_RETAINED_REPORTS: usize = 32;

/// A raw notification on its way from a watcher thread to the engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    /// Tree the notification was observed in
    pub root: WatchRoot,
    /// What was observed
    pub event: RawEvent,
    /// Whether the path is a directory
    pub is_directory: bool,
}

/// Cloneable, thread-safe handle for feeding notifications to an engine
#[derive(Debug, Clone)]
pub struct InboxSender {
    tx: Sender<Notification>,
}

impl InboxSender {
    /// Queue a notification for the next tick
    ///
    /// Returns `false` once the engine has been dropped.
    pub fn send(&self, root: WatchRoot, event: RawEvent, is_directory: bool) -> bool {
        self.tx
            .send(Notification {
                root,
                event,
                is_directory,
            })
            .is_ok()
    }
}

/// Filesystem event aggregation and synchronization engine
pub struct SyncEngine {
    config: EngineConfig,
    collaborators: Collaborators,
    mirror: MediaMirror,
    bus: EventBus,
    data_buffer: EventBuffer,
    source_buffer: EventBuffer,
    self_modified: SelfModificationSet,
    reimports: ReimportSchedule,
    pending: VecDeque<Vec<FileEvent>>,
    active: Option<RenamePropagation>,
    finished: VecDeque<PropagationReport>,
    inbox_tx: Sender<Notification>,
    inbox_rx: Receiver<Notification>,
    last_drain: Option<Instant>,
}

impl std::fmt::Debug for SyncEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("config", &self.config)
            .field("bus", &self.bus)
            .field("data_buffer", &self.data_buffer.len())
            .field("source_buffer", &self.source_buffer.len())
            .field("self_modified", &self.self_modified.len())
            .field("reimports", &self.reimports.len())
            .field("pending", &self.pending.len())
            .field("active", &self.active.is_some())
            .finish()
    }
}

impl SyncEngine {
    /// Start building an engine
    pub fn builder() -> SyncEngineBuilder {
        SyncEngineBuilder::new()
    }

    /// Handle for watcher threads
    pub fn inbox(&self) -> InboxSender {
        InboxSender {
            tx: self.inbox_tx.clone(),
        }
    }

    /// Active configuration
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The collaborators the engine was built with
    pub fn collaborators(&self) -> &Collaborators {
        &self.collaborators
    }

    /// Mutable access to the collaborators
    pub fn collaborators_mut(&mut self) -> &mut Collaborators {
        &mut self.collaborators
    }

    /// Register a listener for produced events
    pub fn subscribe(&mut self, listener: Box<dyn SyncListener>) -> SubscriptionId {
        self.bus.subscribe(listener)
    }

    /// Remove a listener
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.bus.unsubscribe(id)
    }

    /// Open a channel receiving every future produced event
    pub fn event_channel(&mut self) -> Receiver<ResourceEvent> {
        self.bus.channel()
    }

    /// Record that the editor itself just wrote `path`
    ///
    /// A change notification for `path` arriving within the next full drain
    /// cycle is not treated as an external modification.
    pub fn flag_path_modified(&mut self, path: &Path) {
        self.self_modified.flag(path);
    }

    /// The set of paths currently treated as written by the editor
    pub fn self_modified(&self) -> &SelfModificationSet {
        &self.self_modified
    }

    /// Source files waiting to be re-imported
    pub fn reimport_schedule(&self) -> &ReimportSchedule {
        &self.reimports
    }

    /// Feed a notification directly, on the owner thread
    ///
    /// Plugin notifications are handled immediately; data and source
    /// notifications are buffered until the next drain.
    ///
    /// # Returns
    ///
    /// `true` if the notification was kept.
    pub fn push_event(&mut self, root: WatchRoot, event: RawEvent, is_directory: bool) -> bool {
        match root {
            WatchRoot::Data => {
                self.data_buffer
                    .push(event, is_directory, self.collaborators.visibility.as_ref())
            }
            WatchRoot::Source => {
                self.source_buffer
                    .push(event, is_directory, self.collaborators.visibility.as_ref())
            }
            WatchRoot::Plugin => self.on_plugin_event(event),
        }
    }

    fn on_plugin_event(&mut self, event: RawEvent) -> bool {
        let relevant = matches!(event.kind, RawEventKind::Created | RawEventKind::Changed)
            && self.config.is_plugin_binary(&event.path);
        if !relevant {
            trace!("Ignoring plugin directory event for {}", event.path.display());
            return false;
        }
        info!("Plugin binary changed: {}", event.path.display());
        self.bus
            .publish(ResourceEvent::PluginBinaryChanged { path: event.path });
        true
    }

    /// Move everything the watchers sent into the buffers
    ///
    /// # Returns
    ///
    /// Number of notifications received.
    pub fn pump_inbox(&mut self) -> usize {
        let mut received = 0;
        while let Ok(notification) = self.inbox_rx.try_recv() {
            self.push_event(notification.root, notification.event, notification.is_directory);
            received += 1;
        }
        received
    }

    /// Periodic entry point, called by the host on its owner thread
    ///
    /// Pulls pending notifications from the inbox, advances a running rename
    /// propagation, and drains the buffers if the quiescence window since the
    /// last drain has elapsed. Renames found by this drain are propagated on
    /// later ticks, never inline.
    pub fn tick(&mut self, now: Instant) -> DrainReport {
        self.pump_inbox();
        self.advance_propagation(self.config.propagation_steps_per_tick);

        if let Some(last) = self.last_drain {
            if now.saturating_duration_since(last) < self.config.quiescence_window {
                return DrainReport::default();
            }
        }
        self.last_drain = Some(now);
        self.drain()
    }

    /// Run one full drain cycle regardless of timing
    ///
    /// Processes the source tree, then the data tree, then ages the
    /// self-modification set.
    #[instrument(skip(self))]
    pub fn drain(&mut self) -> DrainReport {
        let mut report = self.drain_source_events();
        report.merge(self.drain_data_events());
        self.self_modified.age();
        if !report.is_empty() {
            debug!(
                "Drain cycle: {} received, {} processed, {} warnings",
                report.events_received,
                report.events_processed,
                report.warnings.len()
            );
        }
        report
    }

    /// Drain the source-tree buffer into the reimport schedule
    pub fn drain_source_events(&mut self) -> DrainReport {
        let mut events = self.source_buffer.take();
        let mut report = DrainReport {
            events_received: events.len(),
            ..Default::default()
        };
        if events.is_empty() {
            return report;
        }

        aggregate(&mut events);
        filter_events(&mut events, &self.self_modified);
        report.events_processed = events.len();
        report.reimports_scheduled = self.reimports.schedule_changes(&events, self.mirror.media_root());
        report
    }

    /// Drain the data-tree buffer through aggregation, filtering and synchronization
    pub fn drain_data_events(&mut self) -> DrainReport {
        let mut events = self.data_buffer.take();
        let received = events.len();
        if events.is_empty() {
            return DrainReport::default();
        }

        aggregate(&mut events);
        filter_events(&mut events, &self.self_modified);
        mark_deleted_directories(&mut events, &self.collaborators, &self.mirror);
        let outcome = synchronize(&events, &mut self.collaborators, &self.mirror, &mut self.bus);

        let mut report = outcome.report;
        report.events_received = received;
        report.events_processed = events.len();
        if !outcome.rename_batch.is_empty() {
            debug!("Queued a batch of {} renames for propagation", outcome.rename_batch.len());
            self.pending.push_back(outcome.rename_batch);
        }
        report
    }

    /// Re-import modified source media after the host window is activated
    ///
    /// # Returns
    ///
    /// The files handed to the reimporter.
    pub fn on_focus_regained(&mut self) -> Vec<PathBuf> {
        self.reimports
            .flush(self.config.reimport_grace, self.collaborators.reimporter.as_mut())
    }

    /// Whether a propagation is running or queued
    pub fn is_propagating(&self) -> bool {
        self.active.is_some() || !self.pending.is_empty()
    }

    /// Number of rename batches waiting behind the running propagation
    pub fn pending_batches(&self) -> usize {
        self.pending.len()
    }

    /// Progress of the running propagation
    pub fn propagation_progress(&self) -> Option<ProgressInfo> {
        self.active.as_ref().map(RenamePropagation::progress)
    }

    /// Reports of propagations finished since the last call
    ///
    /// At most [`MAX_RETAINED_REPORTS`] reports are kept between two calls;
    /// older ones are dropped first.
    pub fn take_propagation_reports(&mut self) -> Vec<PropagationReport> {
        self.finished.drain(..).collect()
    }

    fn retain_report(&mut self, report: PropagationReport) {
        if self.finished.len() >= MAX_RETAINED_REPORTS {
            debug!("Dropping oldest unclaimed propagation report");
            self.finished.pop_front();
        }
        self.finished.push_back(report);
    }

    /// Perform up to `max_steps` propagation steps
    ///
    /// Starts the next queued batch when nothing is running. Returns the
    /// progress of the propagation that is still running afterwards.
    pub fn advance_propagation(&mut self, max_steps: usize) -> Option<ProgressInfo> {
        for _ in 0..max_steps {
            if self.active.is_none() {
                let batch = self.pending.pop_front()?;
                info!("Starting propagation of {} renames", batch.len());
                self.active = Some(RenamePropagation::new(batch));
            }

            let Some(propagation) = self.active.as_mut() else {
                break;
            };
            if !propagation.step(&mut self.collaborators, &mut self.self_modified) {
                if let Some(done) = self.active.take() {
                    self.retain_report(done.into_report());
                }
            }
        }
        self.propagation_progress()
    }

    /// Drive every running and queued propagation to completion
    ///
    /// `on_progress` is called after every step.
    pub fn run_propagation(&mut self, on_progress: &mut dyn FnMut(ProgressInfo)) -> Vec<PropagationReport> {
        let mut reports = self.take_propagation_reports();
        if let Some(propagation) = self.active.take() {
            reports.push(propagation.run_to_completion(&mut self.collaborators, &mut self.self_modified, on_progress));
        }
        while let Some(batch) = self.pending.pop_front() {
            reports.push(RenamePropagation::new(batch).run_to_completion(
                &mut self.collaborators,
                &mut self.self_modified,
                on_progress,
            ));
        }
        reports
    }

    /// Propagate a manually assembled rename batch right away
    ///
    /// Fails with [`SyncError::PropagationInProgress`] while another
    /// propagation is running or queued.
    pub fn propagate_now(
        &mut self,
        batch: Vec<FileEvent>,
        on_progress: &mut dyn FnMut(ProgressInfo),
    ) -> Result<PropagationReport> {
        if self.is_propagating() {
            return Err(SyncError::PropagationInProgress);
        }
        if let Some(event) = batch.iter().find(|e| e.kind != FileEventKind::Renamed) {
            return Err(SyncError::internal(format!("not a rename: {}", event)));
        }
        Ok(RenamePropagation::new(batch).run_to_completion(
            &mut self.collaborators,
            &mut self.self_modified,
            on_progress,
        ))
    }
}

/// Builder for creating a [`SyncEngine`]
///
/// The asset catalog, the content cache and the recycle bin are required.
/// Every other collaborator has a headless default:
///
/// - `visibility`: [`HiddenPathFilter`] built from the configured patterns
/// - `reimporter`: [`NoReimport`]
/// - `documents`: [`NoDocuments`]
/// - `ui`: [`AutoConfirm`] answering "reload"
/// - `settings`: [`NoSettings`]
#[derive(Default)]
pub struct SyncEngineBuilder {
    visibility: Option<Box<dyn PathVisibility>>,
    catalog: Option<Box<dyn AssetCatalog>>,
    cache: Option<Box<dyn ContentCache>>,
    recycle_bin: Option<Box<dyn RecycleBin>>,
    reimporter: Option<Box<dyn Reimporter>>,
    documents: Option<Box<dyn DocumentState>>,
    ui: Option<Box<dyn UserInterface>>,
    settings: Option<Box<dyn SettingsStore>>,
    listeners: Vec<Box<dyn SyncListener>>,
}

impl std::fmt::Debug for SyncEngineBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngineBuilder")
            .field("catalog", &self.catalog.is_some())
            .field("cache", &self.cache.is_some())
            .field("recycle_bin", &self.recycle_bin.is_some())
            .field("listeners", &self.listeners.len())
            .finish_non_exhaustive()
    }
}

impl SyncEngineBuilder {
    /// Create a builder without collaborators
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the path visibility predicate
    pub fn visibility(mut self, visibility: impl PathVisibility + 'static) -> Self {
        self.visibility = Some(Box::new(visibility));
        self
    }

    /// Set the asset catalog
    pub fn catalog(mut self, catalog: impl AssetCatalog + 'static) -> Self {
        self.catalog = Some(Box::new(catalog));
        self
    }

    /// Set the content cache
    pub fn cache(mut self, cache: impl ContentCache + 'static) -> Self {
        self.cache = Some(Box::new(cache));
        self
    }

    /// Set the recycle bin
    pub fn recycle_bin(mut self, bin: impl RecycleBin + 'static) -> Self {
        self.recycle_bin = Some(Box::new(bin));
        self
    }

    /// Set the reimporter
    pub fn reimporter(mut self, reimporter: impl Reimporter + 'static) -> Self {
        self.reimporter = Some(Box::new(reimporter));
        self
    }

    /// Set the document state
    pub fn documents(mut self, documents: impl DocumentState + 'static) -> Self {
        self.documents = Some(Box::new(documents));
        self
    }

    /// Set the user interface
    pub fn ui(mut self, ui: impl UserInterface + 'static) -> Self {
        self.ui = Some(Box::new(ui));
        self
    }

    /// Set the settings store
    pub fn settings(mut self, settings: impl SettingsStore + 'static) -> Self {
        self.settings = Some(Box::new(settings));
        self
    }

    /// Register a listener from the start
    pub fn listener(mut self, listener: impl SyncListener + 'static) -> Self {
        self.listeners.push(Box::new(listener));
        self
    }

    /// Build the engine
    ///
    /// # Errors
    ///
    /// - [`SyncError::InvalidConfiguration`] / [`SyncError::InvalidPattern`] if
    ///   `config` does not validate
    /// - [`SyncError::MissingCollaborator`] if a required collaborator is missing
    pub fn build(self, config: EngineConfig) -> Result<SyncEngine> {
        config.validate()?;

        let visibility = match self.visibility {
            Some(visibility) => visibility,
            None => {
                let mut roots = vec![config.data_root.clone(), config.source_root.clone()];
                roots.extend(config.plugin_dirs.iter().cloned());
                Box::new(HiddenPathFilter::new(&config.hidden_patterns)?.with_roots(roots))
            }
        };
        let collaborators = Collaborators {
            visibility,
            catalog: self.catalog.ok_or(SyncError::MissingCollaborator("asset catalog"))?,
            cache: self.cache.ok_or(SyncError::MissingCollaborator("content cache"))?,
            recycle_bin: self.recycle_bin.ok_or(SyncError::MissingCollaborator("recycle bin"))?,
            reimporter: self.reimporter.unwrap_or_else(|| Box::new(NoReimport)),
            documents: self.documents.unwrap_or_else(|| Box::new(NoDocuments)),
            ui: self.ui.unwrap_or_else(|| Box::new(AutoConfirm::default())),
            settings: self.settings.unwrap_or_else(|| Box::new(NoSettings::default())),
        };

        let mut bus = EventBus::new();
        for listener in self.listeners {
            bus.subscribe(listener);
        }

        let (inbox_tx, inbox_rx) = unbounded();
        info!(
            "Sync engine ready for {} (media: {})",
            config.data_root.display(),
            config.media_root().display()
        );
        Ok(SyncEngine {
            mirror: MediaMirror::new(config.data_root.clone(), config.media_root()),
            config,
            collaborators,
            bus,
            data_buffer: EventBuffer::new(),
            source_buffer: EventBuffer::new(),
            self_modified: SelfModificationSet::new(),
            reimports: ReimportSchedule::new(),
            pending: VecDeque::new(),
            active: None,
            finished: VecDeque::new(),
            inbox_tx,
            inbox_rx,
            last_drain: None,
        })
    }
}
