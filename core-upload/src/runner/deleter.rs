use super::{supervise, MessageSender, RunId, RunnerMessage};
use crate::record::FileId;
use bridge_traits::{BridgeError, RemoteFileInfo, RemoteFileStore};
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleterEvent {
    Started { file_id: FileId },
    Succeeded { file_id: FileId },
    Failed { file_id: FileId, error: BridgeError },
    Stopped { file_id: FileId },
}

impl DeleterEvent {
    pub fn file_id(&self) -> &str {
        match self {
            DeleterEvent::Started { file_id }
            | DeleterEvent::Succeeded { file_id }
            | DeleterEvent::Failed { file_id, .. }
            | DeleterEvent::Stopped { file_id } => file_id,
        }
    }
}

/// Runs `delete_file` for one remote file at a time. Never preempted.
pub struct Deleter {
    store: Arc<dyn RemoteFileStore>,
    outbox: MessageSender,
    current: Option<(RunId, FileId)>,
}

impl Deleter {
    pub(crate) fn new(store: Arc<dyn RemoteFileStore>, outbox: MessageSender) -> Self {
        Self {
            store,
            outbox,
            current: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.current.is_some()
    }

    pub fn current_file(&self) -> Option<&str> {
        self.current.as_ref().map(|(_, file_id)| file_id.as_str())
    }

    /// Starts deleting `info` and returns its `Started` event.
    ///
    /// # Panics
    ///
    /// Panics if a delete is already running.
    pub fn run(&mut self, info: RemoteFileInfo) -> DeleterEvent {
        assert!(!self.is_running(), "deleter is already running");

        let run = RunId::new();
        let file_id = info.name.clone();
        self.current = Some((run, file_id.clone()));
        debug!(%run, file_id = %file_id, "Starting delete");

        let store = Arc::clone(&self.store);
        let outbox = self.outbox.clone();
        let task_file_id = file_id.clone();
        tokio::spawn(async move {
            let file_id = task_file_id;
            let event = match supervise(async move { store.delete_file(&info).await }).await {
                Ok(()) => DeleterEvent::Succeeded {
                    file_id: file_id.clone(),
                },
                Err(error) => DeleterEvent::Failed {
                    file_id: file_id.clone(),
                    error,
                },
            };
            let _ = outbox.send(RunnerMessage::Deleter { run, event });
            let _ = outbox.send(RunnerMessage::Deleter {
                run,
                event: DeleterEvent::Stopped { file_id },
            });
        });

        DeleterEvent::Started { file_id }
    }

    /// Filters an incoming event. Returns `None` for events of a stale run.
    pub fn accept(&mut self, run: RunId, event: DeleterEvent) -> Option<DeleterEvent> {
        if self.current.as_ref().map(|(current, _)| *current) != Some(run) {
            debug!(%run, file_id = event.file_id(), "Dropping stale delete event");
            return None;
        }
        if matches!(event, DeleterEvent::Stopped { .. }) {
            self.current = None;
        }
        Some(event)
    }
}
