//! # Mass Upload Orchestrator
//!
//! [`MassUpload`] owns the record set, its derived state and the three
//! runners. It is a single-owner state machine: every mutation happens
//! through `&mut self`, and spawned transfers only talk back through the
//! runner message channel that the owner pumps.
//!
//! ## Scheduling
//!
//! One scheduling cycle (`tick`) asks the record set for its highest
//! priority record and hands it to the deleter or the uploader. At most one
//! transfer runs at a time. After a user mutation, `force_best_tick` aborts
//! a running upload if a different action now ranks first; the next tick
//! happens once the aborted upload has stopped. Deletions are never
//! preempted.
//!
//! ## Usage
//!
//! ```ignore
//! use core_upload::MassUpload;
//!
//! let mut upload = MassUpload::new(store);
//! upload.fetch_file_infos_from_server();
//! upload.add_files(selected_files);
//! upload.run_until_idle().await;
//! assert!(upload.snapshot().is_complete());
//! ```
//!
//! Starting a run spawns a tokio task, so methods that may schedule work
//! must be called from within a tokio runtime.

use crate::error::{Result, UploadError};
use crate::error_list::{ErrorList, UploadErrorEntry};
use crate::progress::ProgressAggregator;
use crate::record::{FileId, FileRecord, RecordChange};
use crate::record_set::{RecordEvent, RecordObserver, RecordSet};
use crate::runner::{
    self, Deleter, DeleterEvent, Lister, ListerEvent, MessageReceiver, MessageSender,
    RunnerMessage, Uploader, UploaderEvent,
};
use bridge_traits::{BridgeError, LocalFileHandle, RemoteFileInfo, RemoteFileStore, TransferProgress};
use core_runtime::config::UploadConfig;
use core_runtime::events::{
    CoreEvent, EventBus, EventStream, FileEvent, ListingEvent, StateEvent, TransferEvent,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Top-level state of a mass upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UploadStatus {
    Waiting,
    ListingFiles,
    ListingFilesError,
    Uploading,
    UploadingError,
    WaitingError,
    /// Idle, but some records disagree with the remote side
    WaitingConflict,
}

impl UploadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UploadStatus::Waiting => "waiting",
            UploadStatus::ListingFiles => "listing-files",
            UploadStatus::ListingFilesError => "listing-files-error",
            UploadStatus::Uploading => "uploading",
            UploadStatus::UploadingError => "uploading-error",
            UploadStatus::WaitingError => "waiting-error",
            UploadStatus::WaitingConflict => "waiting-conflict",
        }
    }
}

impl fmt::Display for UploadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time copy of everything a UI needs to render the upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadSnapshot {
    pub status: UploadStatus,
    pub progress: TransferProgress,
    pub list_files_progress: Option<TransferProgress>,
    pub list_files_error: Option<BridgeError>,
    pub errors: Vec<UploadErrorEntry>,
    pub conflicted: Vec<FileId>,
    pub file_count: usize,
}

impl UploadSnapshot {
    /// Every known byte is uploaded and nothing is pending or failed.
    pub fn is_complete(&self) -> bool {
        self.progress.total > 0
            && self.progress.loaded == self.progress.total
            && self.status == UploadStatus::Waiting
            && self.errors.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Action {
    Upload(FileId),
    Delete(FileId),
}

enum Dispatch {
    Upload(LocalFileHandle),
    Delete(RemoteFileInfo),
    /// Never reached the server; nothing remote to delete
    DropLocal(FileId),
}

pub struct MassUpload {
    store: Arc<dyn RemoteFileStore>,
    records: RecordSet,
    progress: ProgressAggregator,
    errors: ErrorList,
    lister: Lister,
    uploader: Uploader,
    deleter: Deleter,
    status: UploadStatus,
    list_files_progress: Option<TransferProgress>,
    list_files_error: Option<BridgeError>,
    published_progress: TransferProgress,
    published_error_count: usize,
    outbox: MessageSender,
    inbox: MessageReceiver,
    events: EventBus,
}

impl MassUpload {
    pub fn new(store: Arc<dyn RemoteFileStore>) -> Self {
        Self::with_event_bus(store, EventBus::default())
    }

    /// Builds an orchestrator from validated configuration.
    pub fn from_config(config: &UploadConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::with_event_bus(
            Arc::clone(&config.remote_store),
            EventBus::new(config.event_buffer_size),
        ))
    }

    pub fn with_event_bus(store: Arc<dyn RemoteFileStore>, events: EventBus) -> Self {
        let (outbox, inbox) = runner::channel();
        Self {
            lister: Lister::new(Arc::clone(&store), outbox.clone()),
            uploader: Uploader::new(Arc::clone(&store), outbox.clone()),
            deleter: Deleter::new(Arc::clone(&store), outbox.clone()),
            store,
            records: RecordSet::new(),
            progress: ProgressAggregator::new(),
            errors: ErrorList::new(),
            status: UploadStatus::Waiting,
            list_files_progress: None,
            list_files_error: None,
            published_progress: TransferProgress::default(),
            published_error_count: 0,
            outbox,
            inbox,
            events,
        }
    }

    // ------------------------------------------------------------------
    // Observable state
    // ------------------------------------------------------------------

    pub fn status(&self) -> UploadStatus {
        self.status
    }

    pub fn list_files_progress(&self) -> Option<TransferProgress> {
        self.list_files_progress
    }

    pub fn list_files_error(&self) -> Option<&BridgeError> {
        self.list_files_error.as_ref()
    }

    pub fn upload_progress(&self) -> TransferProgress {
        self.progress.progress()
    }

    /// Records currently carrying an error, sorted by id.
    pub fn upload_errors(&self) -> &[UploadErrorEntry] {
        self.errors.entries()
    }

    pub fn records(&self) -> &RecordSet {
        &self.records
    }

    pub fn record(&self, id: &str) -> Option<&FileRecord> {
        self.records.get(id)
    }

    pub fn conflicted_ids(&self) -> Vec<FileId> {
        self.records.conflicted_ids().cloned().collect()
    }

    /// Whether any runner has a run in flight.
    pub fn is_busy(&self) -> bool {
        self.lister.is_running() || self.is_transferring()
    }

    pub fn snapshot(&self) -> UploadSnapshot {
        UploadSnapshot {
            status: self.status,
            progress: self.upload_progress(),
            list_files_progress: self.list_files_progress,
            list_files_error: self.list_files_error.clone(),
            errors: self.errors.entries().to_vec(),
            conflicted: self.conflicted_ids(),
            file_count: self.records.len(),
        }
    }

    pub fn subscribe(&self) -> EventStream {
        EventStream::new(self.events.subscribe())
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.events
    }

    // ------------------------------------------------------------------
    // User actions
    // ------------------------------------------------------------------

    /// Adds local files the user selected.
    #[instrument(skip(self, handles))]
    pub fn add_files<I>(&mut self, handles: I)
    where
        I: IntoIterator<Item = LocalFileHandle>,
    {
        let events = self
            .progress
            .run_in_batch(&mut self.records, |records| records.add_local_files(handles));
        debug!(events = events.len(), "Merged local files");
        self.apply(events);
        self.force_best_tick();
    }

    /// Merges file infos reported by the remote side.
    #[instrument(skip(self, infos))]
    pub fn add_file_infos<I>(&mut self, infos: I)
    where
        I: IntoIterator<Item = RemoteFileInfo>,
    {
        let events = self
            .progress
            .run_in_batch(&mut self.records, |records| records.add_remote_infos(infos));
        debug!(events = events.len(), "Merged remote file infos");
        self.apply(events);
        self.force_best_tick();
    }

    /// Clears the record's error so it is scheduled again.
    #[instrument(skip(self))]
    pub fn retry_upload(&mut self, file_id: &str) -> Result<()> {
        self.update_or_missing(file_id, |record| record.without_error())?;
        self.force_best_tick();
        Ok(())
    }

    #[instrument(skip(self))]
    pub fn retry_all_uploads(&mut self) {
        for file_id in self.errors.ids() {
            self.update_record(&file_id, |record| record.without_error());
        }
        self.force_best_tick();
    }

    /// Schedules the record for deletion.
    ///
    /// Any error is cleared so the deletion is not blocked by it. A record
    /// that has nothing on the remote side and no upload in flight is
    /// dropped right away.
    #[instrument(skip(self))]
    pub fn remove_upload(&mut self, file_id: &str) -> Result<()> {
        let local_only = self
            .records
            .get(file_id)
            .map(|record| record.remote_info().is_none() && !record.is_uploading());

        match local_only {
            None => {
                return Err(UploadError::RecordNotFound {
                    file_id: file_id.to_string(),
                })
            }
            Some(true) => {
                debug!("Removing record without remote data");
                let removed = self.records.remove(file_id).into_iter().collect();
                self.apply(removed);
            }
            Some(false) => {
                self.update_record(file_id, |record| {
                    [record.set_deleting(true), record.without_error()]
                        .into_iter()
                        .flatten()
                });
            }
        }
        self.force_best_tick();
        Ok(())
    }

    /// Tears the upload down: cancels the running upload, drops every
    /// record and starts over with fresh runners.
    #[instrument(skip(self))]
    pub fn abort(&mut self) {
        info!(records = self.records.len(), "Aborting mass upload");
        self.uploader.abort();

        for file_id in self.records.ids() {
            self.update_record(&file_id, |record| record.set_deleting(true));
        }
        let reset = self.records.reset(Vec::new());
        self.apply(vec![reset]);

        self.lister = Lister::new(Arc::clone(&self.store), self.outbox.clone());
        self.uploader = Uploader::new(Arc::clone(&self.store), self.outbox.clone());
        self.deleter = Deleter::new(Arc::clone(&self.store), self.outbox.clone());
        self.list_files_progress = None;
        self.list_files_error = None;
        self.recompute_status();
    }

    /// Starts listing remote files. Does nothing while a listing runs.
    #[instrument(skip(self))]
    pub fn fetch_file_infos_from_server(&mut self) {
        if self.lister.is_running() {
            debug!("Listing already in progress");
            return;
        }
        let event = self.lister.run();
        self.on_lister_event(event);
    }

    pub fn retry_list_files(&mut self) {
        self.fetch_file_infos_from_server();
    }

    // ------------------------------------------------------------------
    // Event pumping
    // ------------------------------------------------------------------

    /// Waits for the next runner message. Pending forever while idle.
    pub async fn recv_message(&mut self) -> Option<RunnerMessage> {
        self.inbox.recv().await
    }

    pub fn handle_message(&mut self, message: RunnerMessage) {
        match message {
            RunnerMessage::Lister { run, event } => {
                if let Some(event) = self.lister.accept(run, event) {
                    self.on_lister_event(event);
                }
            }
            RunnerMessage::Uploader { run, event } => {
                if let Some(event) = self.uploader.accept(run, event) {
                    self.on_uploader_event(event);
                }
            }
            RunnerMessage::Deleter { run, event } => {
                if let Some(event) = self.deleter.accept(run, event) {
                    self.on_deleter_event(event);
                }
            }
        }
    }

    /// Handles one runner message.
    ///
    /// Waits for one while busy; otherwise only drains what is already
    /// queued. Returns `false` if there was nothing to handle.
    pub async fn process_next_event(&mut self) -> bool {
        let message = if self.is_busy() {
            self.inbox.recv().await
        } else {
            self.inbox.try_recv().ok()
        };
        match message {
            Some(message) => {
                self.handle_message(message);
                true
            }
            None => false,
        }
    }

    /// Handles every message already queued without waiting.
    pub fn process_pending_events(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(message) = self.inbox.try_recv() {
            self.handle_message(message);
            handled += 1;
        }
        handled
    }

    /// Pumps runner messages until no run is in flight.
    pub async fn run_until_idle(&mut self) {
        while self.is_busy() {
            if !self.process_next_event().await {
                break;
            }
        }
    }

    // ------------------------------------------------------------------
    // Scheduling
    // ------------------------------------------------------------------

    fn is_transferring(&self) -> bool {
        self.uploader.is_running() || self.deleter.is_running()
    }

    fn running_action(&self) -> Option<Action> {
        if let Some(file_id) = self.uploader.current_file() {
            return Some(Action::Upload(file_id.to_string()));
        }
        self.deleter
            .current_file()
            .map(|file_id| Action::Delete(file_id.to_string()))
    }

    fn desired_action(&self) -> Option<Action> {
        self.records.next().map(|record| {
            let file_id = record.id().to_string();
            if record.is_deleting() {
                Action::Delete(file_id)
            } else {
                Action::Upload(file_id)
            }
        })
    }

    fn next_dispatch(&self) -> Option<Dispatch> {
        let record = self.records.next()?;
        if record.is_deleting() {
            return Some(match record.remote_info() {
                Some(info) => Dispatch::Delete(info.clone()),
                None => Dispatch::DropLocal(record.id().to_string()),
            });
        }
        record.local_handle().cloned().map(Dispatch::Upload)
    }

    /// One scheduling cycle.
    fn tick(&mut self) {
        if !self.is_transferring() {
            while let Some(dispatch) = self.next_dispatch() {
                match dispatch {
                    Dispatch::Upload(handle) => {
                        info!(file_id = %handle.name, "Dispatching upload");
                        let event = self.uploader.run(handle);
                        self.on_uploader_event(event);
                        break;
                    }
                    Dispatch::Delete(info) => {
                        info!(file_id = %info.name, "Dispatching delete");
                        let event = self.deleter.run(info);
                        self.on_deleter_event(event);
                        break;
                    }
                    Dispatch::DropLocal(file_id) => {
                        debug!(file_id = %file_id, "Removing record without remote data");
                        let removed = self.records.remove(&file_id).into_iter().collect();
                        self.apply(removed);
                    }
                }
            }
        }
        self.recompute_status();
    }

    /// Ticks if idle, otherwise preempts a running upload that no longer
    /// matches the best action.
    fn force_best_tick(&mut self) {
        match self.running_action() {
            None => self.tick(),
            Some(Action::Upload(current)) => {
                let desired = self.desired_action();
                if desired != Some(Action::Upload(current.clone())) && !self.uploader.is_aborting() {
                    info!(file_id = %current, next = ?desired, "Preempting upload");
                    self.uploader.abort();
                }
                self.recompute_status();
            }
            Some(Action::Delete(_)) => self.recompute_status(),
        }
    }

    fn derive_status(&self) -> UploadStatus {
        if self.lister.is_running() {
            UploadStatus::ListingFiles
        } else if self.is_transferring() {
            if self.errors.is_empty() {
                UploadStatus::Uploading
            } else {
                UploadStatus::UploadingError
            }
        } else if self.list_files_error.is_some() {
            UploadStatus::ListingFilesError
        } else if !self.errors.is_empty() {
            UploadStatus::WaitingError
        } else if self.records.has_conflicts() {
            UploadStatus::WaitingConflict
        } else {
            UploadStatus::Waiting
        }
    }

    fn recompute_status(&mut self) {
        let next = self.derive_status();
        if next == self.status {
            return;
        }
        info!(from = %self.status, to = %next, "Upload status changed");
        self.emit(CoreEvent::State(StateEvent::StatusChanged {
            from: self.status.to_string(),
            to: next.to_string(),
        }));
        self.status = next;
    }

    // ------------------------------------------------------------------
    // Runner event handlers
    // ------------------------------------------------------------------

    fn on_lister_event(&mut self, event: ListerEvent) {
        match event {
            ListerEvent::Started => {
                self.list_files_error = None;
                self.list_files_progress = None;
                self.emit(CoreEvent::Listing(ListingEvent::Started));
                self.recompute_status();
            }
            ListerEvent::Progress(progress) => {
                self.list_files_progress = Some(progress);
                self.emit(CoreEvent::Listing(ListingEvent::Progress {
                    loaded: progress.loaded,
                    total: progress.total,
                }));
            }
            ListerEvent::Succeeded(infos) => {
                info!(file_count = infos.len(), "Remote listing completed");
                self.emit(CoreEvent::Listing(ListingEvent::Completed {
                    file_count: infos.len(),
                }));
                self.add_file_infos(infos);
            }
            ListerEvent::Failed(error) => {
                warn!(error = %error, "Remote listing failed");
                self.emit(CoreEvent::Listing(ListingEvent::Failed {
                    message: error.to_string(),
                }));
                self.list_files_error = Some(error);
            }
            ListerEvent::Stopped => self.recompute_status(),
        }
    }

    fn on_uploader_event(&mut self, event: UploaderEvent) {
        match event {
            UploaderEvent::Started { file_id } => {
                self.emit(CoreEvent::Transfer(TransferEvent::UploadStarted {
                    file_id: file_id.clone(),
                }));
                self.update_record(&file_id, |record| {
                    [record.set_uploading(true), record.without_error()]
                        .into_iter()
                        .flatten()
                });
            }
            UploaderEvent::Progress { file_id, progress } => {
                self.emit(CoreEvent::Transfer(TransferEvent::UploadProgress {
                    file_id: file_id.clone(),
                    loaded: progress.loaded,
                    total: progress.total,
                }));
                self.update_record(&file_id, |record| record.update_with_progress(progress));
            }
            UploaderEvent::Succeeded { file_id } => {
                info!(file_id = %file_id, "Upload completed");
                self.emit(CoreEvent::Transfer(TransferEvent::UploadCompleted {
                    file_id: file_id.clone(),
                }));
                self.update_record(&file_id, |record| record.complete_upload());
            }
            UploaderEvent::Failed { file_id, error } => {
                warn!(file_id = %file_id, error = %error, "Upload failed");
                self.emit(CoreEvent::Transfer(TransferEvent::UploadFailed {
                    file_id: file_id.clone(),
                    message: error.to_string(),
                }));
                self.update_record(&file_id, |record| record.with_error(error));
            }
            UploaderEvent::Aborted { file_id } => {
                info!(file_id = %file_id, "Upload aborted");
                self.emit(CoreEvent::Transfer(TransferEvent::UploadAborted { file_id }));
            }
            UploaderEvent::Stopped { file_id } => {
                self.update_record(&file_id, |record| record.set_uploading(false));
                self.tick();
            }
        }
    }

    fn on_deleter_event(&mut self, event: DeleterEvent) {
        match event {
            DeleterEvent::Started { file_id } => {
                self.emit(CoreEvent::Transfer(TransferEvent::DeleteStarted { file_id }));
            }
            DeleterEvent::Succeeded { file_id } => {
                info!(file_id = %file_id, "Remote file deleted");
                self.emit(CoreEvent::Transfer(TransferEvent::DeleteCompleted {
                    file_id: file_id.clone(),
                }));
                let removed = self.records.remove(&file_id).into_iter().collect();
                self.apply(removed);
            }
            DeleterEvent::Failed { file_id, error } => {
                warn!(file_id = %file_id, error = %error, "Delete failed");
                self.emit(CoreEvent::Transfer(TransferEvent::DeleteFailed {
                    file_id: file_id.clone(),
                    message: error.to_string(),
                }));
                self.update_record(&file_id, |record| record.with_error(error));
            }
            DeleterEvent::Stopped { .. } => self.tick(),
        }
    }

    // ------------------------------------------------------------------
    // Record plumbing
    // ------------------------------------------------------------------

    fn update_record<F, R>(&mut self, file_id: &str, f: F) -> bool
    where
        F: FnOnce(&mut FileRecord) -> R,
        R: IntoIterator<Item = RecordChange>,
    {
        match self.records.update(file_id, f) {
            Some(events) => {
                self.apply(events);
                true
            }
            None => {
                debug!(file_id = %file_id, "Ignoring update for unknown record");
                false
            }
        }
    }

    fn update_or_missing<F, R>(&mut self, file_id: &str, f: F) -> Result<()>
    where
        F: FnOnce(&mut FileRecord) -> R,
        R: IntoIterator<Item = RecordChange>,
    {
        if self.update_record(file_id, f) {
            Ok(())
        } else {
            Err(UploadError::RecordNotFound {
                file_id: file_id.to_string(),
            })
        }
    }

    /// Fans record events out to the observers and the event bus.
    fn apply(&mut self, events: Vec<RecordEvent>) {
        for event in &events {
            self.progress.on_record_event(event, &self.records);
            self.errors.on_record_event(event, &self.records);
            self.publish_record_event(event);
        }
        self.publish_aggregates();
    }

    fn publish_record_event(&self, event: &RecordEvent) {
        let file_event = match event {
            RecordEvent::Added(file_ids) => FileEvent::Added {
                file_ids: file_ids.clone(),
            },
            RecordEvent::Changed(change) => FileEvent::Changed {
                file_id: change.id.clone(),
                field: change.field(),
            },
            RecordEvent::Removed(record) => FileEvent::Removed {
                file_id: record.id().to_string(),
            },
            RecordEvent::Reset => FileEvent::Reset {
                count: self.records.len(),
            },
        };
        self.emit(CoreEvent::File(file_event));
    }

    fn publish_aggregates(&mut self) {
        let progress = self.progress.progress();
        if progress != self.published_progress {
            self.published_progress = progress;
            self.emit(CoreEvent::State(StateEvent::ProgressChanged {
                loaded: progress.loaded,
                total: progress.total,
            }));
        }

        let error_count = self.errors.len();
        if error_count != self.published_error_count {
            self.published_error_count = error_count;
            self.emit(CoreEvent::State(StateEvent::ErrorsChanged { count: error_count }));
        }
    }

    fn emit(&self, event: CoreEvent) {
        // No subscribers is fine.
        self.events.emit(event).ok();
    }
}

impl fmt::Debug for MassUpload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MassUpload")
            .field("status", &self.status)
            .field("records", &self.records.len())
            .field("progress", &self.progress.progress())
            .field("errors", &self.errors.len())
            .field("busy", &self.is_busy())
            .finish()
    }
}
