//! # Runners
//!
//! Each runner wraps one [`RemoteFileStore`](bridge_traits::RemoteFileStore)
//! operation. A run executes on a spawned tokio task and reports back through
//! a shared unbounded channel as [`RunnerMessage`]s tagged with the [`RunId`]
//! of the run that produced them.
//!
//! The owner feeds every message back into the runner's `accept`, which
//! drops events from runs that are no longer current and returns the rest.
//! Per run, events arrive as start, progress*, one terminal event, stop.
//! The store call runs on a supervised inner task, so a panicking store
//! still ends its run with a failure and a stop.

mod deleter;
mod lister;
mod uploader;

pub use deleter::{Deleter, DeleterEvent};
pub use lister::{Lister, ListerEvent};
pub use uploader::{Uploader, UploaderEvent};

use bridge_traits::BridgeError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use tokio::sync::mpsc;
use tracing::warn;
use uuid::Uuid;

/// Identifies one run of a runner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(Uuid);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A runner event as it travels from a spawned task to the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunnerMessage {
    Lister { run: RunId, event: ListerEvent },
    Uploader { run: RunId, event: UploaderEvent },
    Deleter { run: RunId, event: DeleterEvent },
}

impl RunnerMessage {
    pub fn run_id(&self) -> RunId {
        match self {
            RunnerMessage::Lister { run, .. }
            | RunnerMessage::Uploader { run, .. }
            | RunnerMessage::Deleter { run, .. } => *run,
        }
    }
}

pub(crate) type MessageSender = mpsc::UnboundedSender<RunnerMessage>;
pub(crate) type MessageReceiver = mpsc::UnboundedReceiver<RunnerMessage>;

pub(crate) fn channel() -> (MessageSender, MessageReceiver) {
    mpsc::unbounded_channel()
}

/// Awaits `operation` on its own task. A panic or cancellation of that task
/// becomes an `OperationFailed` error.
pub(crate) async fn supervise<T, F>(operation: F) -> bridge_traits::Result<T>
where
    F: Future<Output = bridge_traits::Result<T>> + Send + 'static,
    T: Send + 'static,
{
    match tokio::spawn(operation).await {
        Ok(result) => result,
        Err(join_error) => {
            warn!(error = %join_error, "Remote store task did not complete");
            Err(BridgeError::OperationFailed(format!(
                "Remote store task did not complete: {}",
                join_error
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_ids_are_unique() {
        let a = RunId::new();
        let b = RunId::new();
        assert_ne!(a, b);
        assert_eq!(a.to_string().len(), 36);
    }

    #[test]
    fn test_message_run_id() {
        let run = RunId::new();
        let message = RunnerMessage::Lister {
            run,
            event: ListerEvent::Started,
        };
        assert_eq!(message.run_id(), run);
    }

    #[tokio::test]
    async fn test_supervise_passes_results_through() {
        let result = supervise(async { Err::<u8, _>(BridgeError::Aborted) }).await;
        assert_eq!(result, Err(BridgeError::Aborted));
    }

    #[tokio::test]
    async fn test_supervise_reports_panics() {
        let panics = true;
        let result = supervise(async move {
            if panics {
                panic!("store bug");
            }
            Ok::<u8, BridgeError>(1)
        })
        .await;
        assert!(matches!(result, Err(BridgeError::OperationFailed(_))));
    }
}
