use super::{supervise, MessageSender, RunId, RunnerMessage};
use bridge_traits::{BridgeError, ProgressReporter, RemoteFileInfo, RemoteFileStore, TransferProgress};
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListerEvent {
    Started,
    Progress(TransferProgress),
    Succeeded(Vec<RemoteFileInfo>),
    Failed(BridgeError),
    /// Always the last event of a run
    Stopped,
}

/// Runs `list_files` on the remote store.
pub struct Lister {
    store: Arc<dyn RemoteFileStore>,
    outbox: MessageSender,
    current: Option<RunId>,
}

impl Lister {
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

    /// Starts a listing and returns its `Started` event.
    ///
    /// # Panics
    ///
    /// Panics if a listing is already running.
    pub fn run(&mut self) -> ListerEvent {
        assert!(!self.is_running(), "lister is already running");

        let run = RunId::new();
        self.current = Some(run);
        debug!(%run, "Starting remote listing");

        let store = Arc::clone(&self.store);
        let outbox = self.outbox.clone();
        tokio::spawn(async move {
            let progress_outbox = outbox.clone();
            let reporter = ProgressReporter::new(move |progress| {
                let _ = progress_outbox.send(RunnerMessage::Lister {
                    run,
                    event: ListerEvent::Progress(progress),
                });
            });

            let event = match supervise(async move { store.list_files(reporter).await }).await {
                Ok(files) => ListerEvent::Succeeded(files),
                Err(err) => ListerEvent::Failed(err),
            };
            let _ = outbox.send(RunnerMessage::Lister { run, event });
            let _ = outbox.send(RunnerMessage::Lister {
                run,
                event: ListerEvent::Stopped,
            });
        });

        ListerEvent::Started
    }

    /// Filters an incoming event. Returns `None` for events of a stale run.
    pub fn accept(&mut self, run: RunId, event: ListerEvent) -> Option<ListerEvent> {
        if self.current != Some(run) {
            debug!(%run, "Dropping stale lister event");
            return None;
        }
        if event == ListerEvent::Stopped {
            self.current = None;
        }
        Some(event)
    }
}
