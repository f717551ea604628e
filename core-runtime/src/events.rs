//! # Event Bus System
//!
//! Broadcasts the upload orchestrator's state changes using `tokio::sync::broadcast`.
//!
//! ## Overview
//!
//! The orchestrator mutates its state on a single task. Anything that wants to
//! follow along (a UI layer, a progress bar, a log shipper) subscribes to the
//! [`EventBus`] and receives a [`CoreEvent`] for every observable change:
//!
//! ```text
//! ┌──────────────┐     emit      ┌───────────┐     subscribe    ┌────────────┐
//! │ Orchestrator ├──────────────>│ EventBus  ├─────────────────>│ Subscriber │
//! └──────────────┘               │ (broadcast│                  └────────────┘
//!                                │  channel) │     subscribe    ┌────────────┐
//!                                │           ├─────────────────>│ Subscriber │
//!                                └───────────┘                  └────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{CoreEvent, EventBus, StateEvent};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let event_bus = EventBus::new(100);
//! let mut stream = event_bus.subscribe();
//!
//! event_bus
//!     .emit(CoreEvent::State(StateEvent::ProgressChanged { loaded: 5, total: 10 }))
//!     .ok();
//!
//! let event = stream.recv().await.unwrap();
//! assert_eq!(event.description(), "Aggregate progress changed");
//! # }
//! ```
//!
//! ## Event Types
//!
//! - [`StateEvent`]: orchestrator status, aggregate progress, error count
//! - [`ListingEvent`]: remote listing lifecycle
//! - [`TransferEvent`]: per-file upload and delete lifecycle
//! - [`FileEvent`]: record set membership and field changes
//!
//! ## Error Handling
//!
//! Subscribers that fall behind by more than the buffer size receive
//! `RecvError::Lagged(n)` and can keep reading; `RecvError::Closed` means the
//! orchestrator was dropped. Emitting with no subscribers returns an error that
//! publishers are expected to ignore.

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;

// Re-export commonly used types
pub use tokio::sync::broadcast::error::{RecvError, SendError};
pub use tokio::sync::broadcast::Receiver;

/// Default buffer size for the event bus channel.
///
/// Upload progress is chatty; subscribers that can't keep up receive
/// `RecvError::Lagged`.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;

// ============================================================================
// Core Event Types
// ============================================================================

/// Top-level event enum published through the event bus.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    /// Orchestrator-wide state
    State(StateEvent),
    /// Remote listing lifecycle
    Listing(ListingEvent),
    /// Per-file transfer lifecycle
    Transfer(TransferEvent),
    /// Record set changes
    File(FileEvent),
}

impl CoreEvent {
    /// Returns a human-readable description of the event.
    pub fn description(&self) -> &str {
        match self {
            CoreEvent::State(e) => e.description(),
            CoreEvent::Listing(e) => e.description(),
            CoreEvent::Transfer(e) => e.description(),
            CoreEvent::File(e) => e.description(),
        }
    }

    /// Returns the severity level of the event.
    pub fn severity(&self) -> EventSeverity {
        match self {
            CoreEvent::Listing(ListingEvent::Failed { .. }) => EventSeverity::Error,
            CoreEvent::Transfer(TransferEvent::UploadFailed { .. }) => EventSeverity::Error,
            CoreEvent::Transfer(TransferEvent::DeleteFailed { .. }) => EventSeverity::Error,
            CoreEvent::Transfer(TransferEvent::UploadAborted { .. }) => EventSeverity::Warning,
            CoreEvent::Listing(ListingEvent::Completed { .. }) => EventSeverity::Info,
            CoreEvent::Transfer(TransferEvent::UploadCompleted { .. }) => EventSeverity::Info,
            CoreEvent::Transfer(TransferEvent::DeleteCompleted { .. }) => EventSeverity::Info,
            CoreEvent::State(StateEvent::StatusChanged { .. }) => EventSeverity::Info,
            _ => EventSeverity::Debug,
        }
    }

    /// The file this event is about, if any.
    pub fn file_id(&self) -> Option<&str> {
        match self {
            CoreEvent::Transfer(e) => Some(e.file_id()),
            CoreEvent::File(FileEvent::Changed { file_id, .. })
            | CoreEvent::File(FileEvent::Removed { file_id }) => Some(file_id),
            _ => None,
        }
    }
}

/// Event severity levels for filtering and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    /// Debug-level events (verbose)
    Debug,
    /// Informational events
    Info,
    /// Warning events
    Warning,
    /// Error events
    Error,
}

// ============================================================================
// State Events
// ============================================================================

/// Orchestrator-wide observable state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum StateEvent {
    /// Top-level status moved, e.g. from `waiting` to `uploading`.
    StatusChanged {
        from: String,
        to: String,
    },
    /// Aggregate bytes across every record changed.
    ProgressChanged {
        loaded: u64,
        total: u64,
    },
    /// Number of records carrying an error changed.
    ErrorsChanged {
        count: usize,
    },
}

impl StateEvent {
    fn description(&self) -> &str {
        match self {
            StateEvent::StatusChanged { .. } => "Upload status changed",
            StateEvent::ProgressChanged { .. } => "Aggregate progress changed",
            StateEvent::ErrorsChanged { .. } => "Upload error list changed",
        }
    }
}

// ============================================================================
// Listing Events
// ============================================================================

/// Events of the remote listing run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum ListingEvent {
    Started,
    Progress {
        loaded: u64,
        total: u64,
    },
    Completed {
        /// Number of remote files returned
        file_count: usize,
    },
    Failed {
        message: String,
    },
}

impl ListingEvent {
    fn description(&self) -> &str {
        match self {
            ListingEvent::Started => "Listing remote files",
            ListingEvent::Progress { .. } => "Listing in progress",
            ListingEvent::Completed { .. } => "Remote listing completed",
            ListingEvent::Failed { .. } => "Remote listing failed",
        }
    }
}

// ============================================================================
// Transfer Events
// ============================================================================

/// Events of individual upload and delete runs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum TransferEvent {
    UploadStarted {
        file_id: String,
    },
    UploadProgress {
        file_id: String,
        loaded: u64,
        total: u64,
    },
    UploadCompleted {
        file_id: String,
    },
    UploadFailed {
        file_id: String,
        message: String,
    },
    /// The upload stopped because it was preempted or torn down.
    UploadAborted {
        file_id: String,
    },
    DeleteStarted {
        file_id: String,
    },
    DeleteCompleted {
        file_id: String,
    },
    DeleteFailed {
        file_id: String,
        message: String,
    },
}

impl TransferEvent {
    fn description(&self) -> &str {
        match self {
            TransferEvent::UploadStarted { .. } => "Upload started",
            TransferEvent::UploadProgress { .. } => "Upload in progress",
            TransferEvent::UploadCompleted { .. } => "Upload completed",
            TransferEvent::UploadFailed { .. } => "Upload failed",
            TransferEvent::UploadAborted { .. } => "Upload aborted",
            TransferEvent::DeleteStarted { .. } => "Delete started",
            TransferEvent::DeleteCompleted { .. } => "Delete completed",
            TransferEvent::DeleteFailed { .. } => "Delete failed",
        }
    }

    pub fn file_id(&self) -> &str {
        match self {
            TransferEvent::UploadStarted { file_id }
            | TransferEvent::UploadProgress { file_id, .. }
            | TransferEvent::UploadCompleted { file_id }
            | TransferEvent::UploadFailed { file_id, .. }
            | TransferEvent::UploadAborted { file_id }
            | TransferEvent::DeleteStarted { file_id }
            | TransferEvent::DeleteCompleted { file_id }
            | TransferEvent::DeleteFailed { file_id, .. } => file_id,
        }
    }
}

// ============================================================================
// File Events
// ============================================================================

/// Field of a file record that changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordField {
    LocalHandle,
    RemoteInfo,
    Error,
    Uploading,
    Deleting,
}

impl RecordField {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordField::LocalHandle => "local_handle",
            RecordField::RemoteInfo => "remote_info",
            RecordField::Error => "error",
            RecordField::Uploading => "uploading",
            RecordField::Deleting => "deleting",
        }
    }
}

/// Membership and field changes of the record set.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum FileEvent {
    /// A batch of new records was inserted.
    Added { file_ids: Vec<String> },
    /// One field of an existing record changed.
    Changed { file_id: String, field: RecordField },
    /// A record left the set.
    Removed { file_id: String },
    /// The whole set was replaced.
    Reset { count: usize },
}

impl FileEvent {
    fn description(&self) -> &str {
        match self {
            FileEvent::Added { .. } => "Files added",
            FileEvent::Changed { .. } => "File updated",
            FileEvent::Removed { .. } => "File removed",
            FileEvent::Reset { .. } => "File list replaced",
        }
    }
}

// ============================================================================
// Event Bus
// ============================================================================

/// Central event bus for publishing and subscribing to events.
///
/// Uses `tokio::sync::broadcast` internally:
/// - Multiple producers (clone the `EventBus`)
/// - Multiple consumers (each `subscribe()` creates a new receiver)
/// - Non-blocking sends (events are cloned for each subscriber)
/// - Lagging detection (slow subscribers get `RecvError::Lagged`)
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    /// Creates a new event bus with the specified buffer size.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero; `UploadConfig` validation rejects that
    /// value before it gets here.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns the number of subscribers that received the event, or an
    /// error if there are none.
    pub fn emit(&self, event: CoreEvent) -> Result<usize, SendError<CoreEvent>> {
        self.sender.send(event)
    }

    /// Creates a new subscriber. Past events are not replayed.
    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.sender.subscribe()
    }

    /// Returns the number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

// ============================================================================
// Event Stream Wrapper
// ============================================================================

/// Type alias for event filter functions.
type EventFilter = Box<dyn Fn(&CoreEvent) -> bool + Send + Sync>;

/// A wrapper around `broadcast::Receiver` with optional filtering.
///
/// ```rust
/// use core_runtime::events::{CoreEvent, EventBus, EventStream};
///
/// let event_bus = EventBus::new(100);
/// let transfers = EventStream::new(event_bus.subscribe())
///     .filter(|event| matches!(event, CoreEvent::Transfer(_)));
/// ```
pub struct EventStream {
    receiver: Receiver<CoreEvent>,
    filter: Option<EventFilter>,
}

impl EventStream {
    pub fn new(receiver: Receiver<CoreEvent>) -> Self {
        Self {
            receiver,
            filter: None,
        }
    }

    /// Only events matching `predicate` will be returned by `recv()`.
    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&CoreEvent) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(predicate));
        self
    }

    /// Receives the next event that passes the filter.
    ///
    /// # Errors
    ///
    /// Returns `RecvError::Lagged(n)` if the subscriber fell behind by `n` events.
    /// Returns `RecvError::Closed` if all senders have been dropped.
    pub async fn recv(&mut self) -> Result<CoreEvent, RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            if self.matches(&event) {
                return Ok(event);
            }
        }
    }

    /// Attempts to receive an event without blocking.
    ///
    /// Returns `None` if no matching event is currently available.
    pub fn try_recv(&mut self) -> Option<Result<CoreEvent, RecvError>> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    if self.matches(&event) {
                        return Some(Ok(event));
                    }
                }
                Err(broadcast::error::TryRecvError::Empty) => return None,
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    return Some(Err(RecvError::Lagged(n)))
                }
                Err(broadcast::error::TryRecvError::Closed) => return Some(Err(RecvError::Closed)),
            }
        }
    }

    fn matches(&self, event: &CoreEvent) -> bool {
        self.filter.as_ref().map_or(true, |filter| filter(event))
    }
}

impl fmt::Debug for EventStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("has_filter", &self.filter.is_some())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn upload_started(file_id: &str) -> CoreEvent {
        CoreEvent::Transfer(TransferEvent::UploadStarted {
            file_id: file_id.to_string(),
        })
    }

    #[tokio::test]
    async fn test_event_bus_subscription() {
        let bus = EventBus::new(10);
        assert_eq!(bus.subscriber_count(), 0);

        let _sub1 = bus.subscribe();
        let _sub2 = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);
    }

    #[tokio::test]
    async fn test_event_emission_no_subscribers() {
        let bus = EventBus::new(10);
        assert!(bus.emit(upload_started("a.txt")).is_err());
    }

    #[tokio::test]
    async fn test_multiple_subscribers_receive_same_event() {
        let bus = EventBus::new(10);
        let mut sub1 = bus.subscribe();
        let mut sub2 = bus.subscribe();

        let event = CoreEvent::State(StateEvent::StatusChanged {
            from: "waiting".to_string(),
            to: "uploading".to_string(),
        });
        assert_eq!(bus.emit(event.clone()).unwrap(), 2);

        assert_eq!(sub1.recv().await.unwrap(), event);
        assert_eq!(sub2.recv().await.unwrap(), event);
    }

    #[tokio::test]
    async fn test_event_stream_filter() {
        let bus = EventBus::new(10);
        let mut stream = EventStream::new(bus.subscribe())
            .filter(|event| matches!(event, CoreEvent::Transfer(_)));

        bus.emit(CoreEvent::Listing(ListingEvent::Started)).unwrap();
        bus.emit(upload_started("b.txt")).unwrap();

        let event = stream.recv().await.unwrap();
        assert_eq!(event.file_id(), Some("b.txt"));
    }

    #[tokio::test]
    async fn test_try_recv_skips_filtered_events() {
        let bus = EventBus::new(10);
        let mut stream = EventStream::new(bus.subscribe())
            .filter(|event| event.severity() >= EventSeverity::Error);

        bus.emit(upload_started("a.txt")).unwrap();
        assert!(stream.try_recv().is_none());

        bus.emit(CoreEvent::Transfer(TransferEvent::UploadFailed {
            file_id: "a.txt".to_string(),
            message: "timeout".to_string(),
        }))
        .unwrap();
        assert!(matches!(stream.try_recv(), Some(Ok(_))));
    }

    #[tokio::test]
    async fn test_lagged_subscriber() {
        let bus = EventBus::new(2);
        let mut sub = bus.subscribe();

        for i in 0..5 {
            bus.emit(CoreEvent::State(StateEvent::ErrorsChanged { count: i }))
                .unwrap();
        }

        assert!(matches!(sub.recv().await, Err(RecvError::Lagged(_))));
    }

    #[test]
    fn test_event_severity() {
        let failed = CoreEvent::Listing(ListingEvent::Failed {
            message: "503".to_string(),
        });
        let aborted = CoreEvent::Transfer(TransferEvent::UploadAborted {
            file_id: "a.txt".to_string(),
        });
        let progress = CoreEvent::State(StateEvent::ProgressChanged {
            loaded: 1,
            total: 2,
        });

        assert_eq!(failed.severity(), EventSeverity::Error);
        assert_eq!(aborted.severity(), EventSeverity::Warning);
        assert_eq!(progress.severity(), EventSeverity::Debug);
    }

    #[test]
    fn test_event_serialization() {
        let event = CoreEvent::File(FileEvent::Changed {
            file_id: "a.txt".to_string(),
            field: RecordField::RemoteInfo,
        });

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"File\""));
        assert!(json.contains("\"field\":\"remote_info\""));

        let back: CoreEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }
}
