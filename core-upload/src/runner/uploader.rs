use super::{supervise, MessageSender, RunId, RunnerMessage};
use crate::record::FileId;
use bridge_traits::{BridgeError, LocalFileHandle, ProgressReporter, RemoteFileStore, TransferProgress};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploaderEvent {
    Started { file_id: FileId },
    Progress { file_id: FileId, progress: TransferProgress },
    Succeeded { file_id: FileId },
    Failed { file_id: FileId, error: BridgeError },
    /// The run failed after `abort()`; no error belongs to the record
    Aborted { file_id: FileId },
    Stopped { file_id: FileId },
}

impl UploaderEvent {
    pub fn file_id(&self) -> &str {
        match self {
            UploaderEvent::Started { file_id }
            | UploaderEvent::Progress { file_id, .. }
            | UploaderEvent::Succeeded { file_id }
            | UploaderEvent::Failed { file_id, .. }
            | UploaderEvent::Aborted { file_id }
            | UploaderEvent::Stopped { file_id } => file_id,
        }
    }
}

enum State {
    Idle,
    Running {
        run: RunId,
        file_id: FileId,
        cancel: CancellationToken,
    },
    Aborting {
        run: RunId,
        file_id: FileId,
    },
}

/// Runs `upload_file` for one file at a time. Preemptible.
pub struct Uploader {
    store: Arc<dyn RemoteFileStore>,
    outbox: MessageSender,
    state: State,
}

impl Uploader {
    pub(crate) fn new(store: Arc<dyn RemoteFileStore>, outbox: MessageSender) -> Self {
        Self {
            store,
            outbox,
            state: State::Idle,
        }
    }

    pub fn is_running(&self) -> bool {
        !matches!(self.state, State::Idle)
    }

    pub fn is_aborting(&self) -> bool {
        matches!(self.state, State::Aborting { .. })
    }

    /// File of the current run, also while aborting.
    pub fn current_file(&self) -> Option<&str> {
        match &self.state {
            State::Idle => None,
            State::Running { file_id, .. } | State::Aborting { file_id, .. } => Some(file_id),
        }
    }

    /// Starts uploading `file` and returns its `Started` event.
    ///
    /// # Panics
    ///
    /// Panics if an upload is already running or aborting.
    pub fn run(&mut self, file: LocalFileHandle) -> UploaderEvent {
        assert!(!self.is_running(), "uploader is already running");

        let run = RunId::new();
        let file_id = file.name.clone();
        let cancel = CancellationToken::new();
        self.state = State::Running {
            run,
            file_id: file_id.clone(),
            cancel: cancel.clone(),
        };
        debug!(%run, file_id = %file_id, "Starting upload");

        let store = Arc::clone(&self.store);
        let outbox = self.outbox.clone();
        let task_file_id = file_id.clone();
        tokio::spawn(async move {
            let file_id = task_file_id;
            let progress_outbox = outbox.clone();
            let progress_file_id = file_id.clone();
            let reporter = ProgressReporter::new(move |progress| {
                let _ = progress_outbox.send(RunnerMessage::Uploader {
                    run,
                    event: UploaderEvent::Progress {
                        file_id: progress_file_id.clone(),
                        progress,
                    },
                });
            });

            let token = cancel.clone();
            let upload = async move { store.upload_file(&file, reporter, token).await };
            // Only `accept` decides whether a failure is an abort.
            let event = match supervise(upload).await {
                Ok(()) => UploaderEvent::Succeeded {
                    file_id: file_id.clone(),
                },
                Err(error) => {
                    if error.is_aborted() && !cancel.is_cancelled() {
                        warn!(%run, file_id = %file_id, "Store aborted an upload nobody cancelled");
                    }
                    UploaderEvent::Failed {
                        file_id: file_id.clone(),
                        error,
                    }
                }
            };
            let _ = outbox.send(RunnerMessage::Uploader { run, event });
            let _ = outbox.send(RunnerMessage::Uploader {
                run,
                event: UploaderEvent::Stopped { file_id },
            });
        });

        UploaderEvent::Started { file_id }
    }

    /// Requests cancellation of the running upload.
    ///
    /// The run still ends with its own terminal event and `Stopped`. Returns
    /// `false` when idle or already aborting.
    pub fn abort(&mut self) -> bool {
        match std::mem::replace(&mut self.state, State::Idle) {
            State::Running {
                run,
                file_id,
                cancel,
            } => {
                debug!(%run, file_id = %file_id, "Aborting upload");
                cancel.cancel();
                self.state = State::Aborting { run, file_id };
                true
            }
            other => {
                self.state = other;
                false
            }
        }
    }

    /// Filters an incoming event. Returns `None` for events of a stale run.
    ///
    /// While aborting, a failure is reported as `Aborted`.
    pub fn accept(&mut self, run: RunId, event: UploaderEvent) -> Option<UploaderEvent> {
        let (current, aborting) = match &self.state {
            State::Idle => (None, false),
            State::Running { run, .. } => (Some(*run), false),
            State::Aborting { run, .. } => (Some(*run), true),
        };
        if current != Some(run) {
            debug!(%run, file_id = event.file_id(), "Dropping stale upload event");
            return None;
        }

        match event {
            UploaderEvent::Failed { file_id, .. } if aborting => {
                Some(UploaderEvent::Aborted { file_id })
            }
            UploaderEvent::Stopped { .. } => {
                self.state = State::Idle;
                Some(event)
            }
            other => Some(other),
        }
    }
}

impl Drop for Uploader {
    fn drop(&mut self) {
        if let State::Running { cancel, .. } = &self.state {
            cancel.cancel();
        }
    }
}
