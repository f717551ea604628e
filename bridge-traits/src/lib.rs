//! # Host Bridge Traits
//!
//! Abstractions the host application implements so the upload core can reach
//! the outside world.
//!
//! ## Overview
//!
//! The upload core never talks to a network or a disk itself. Everything it
//! needs is injected through the traits in this crate:
//!
//! - [`RemoteFileStore`](storage::RemoteFileStore) - list remote files, upload
//!   one file, delete one remote file
//! - [`LoggerSink`](logging::LoggerSink) - mirror structured logs into the host
//!
//! The value types exchanged across the boundary live here too:
//! [`LocalFileHandle`], [`RemoteFileInfo`] and [`TransferProgress`].
//!
//! ## Error Handling
//!
//! Every bridge operation reports failures as [`BridgeError`]. The core never
//! propagates these up the call stack: a listing failure becomes global
//! listing state and a transfer failure is attached to the affected file.
//! Implementations should therefore produce actionable messages.
//!
//! ## Thread Safety
//!
//! Bridge traits require `Send + Sync`; the core runs each operation on a
//! spawned task and shares the implementation through an `Arc`.
//!
//! ## Example
//!
//! ```ignore
//! use async_trait::async_trait;
//! use bridge_traits::{
//!     BridgeError, LocalFileHandle, ProgressReporter, RemoteFileInfo, RemoteFileStore,
//! };
//! use tokio_util::sync::CancellationToken;
//!
//! struct ReadOnlyStore;
//!
//! #[async_trait]
//! impl RemoteFileStore for ReadOnlyStore {
//!     async fn list_files(&self, _: ProgressReporter) -> bridge_traits::error::Result<Vec<RemoteFileInfo>> {
//!         Ok(Vec::new())
//!     }
//!
//!     async fn upload_file(
//!         &self,
//!         _: &LocalFileHandle,
//!         _: ProgressReporter,
//!         _: CancellationToken,
//!     ) -> bridge_traits::error::Result<()> {
//!         Err(BridgeError::NotAvailable("uploads".to_string()))
//!     }
//!
//!     async fn delete_file(&self, _: &RemoteFileInfo) -> bridge_traits::error::Result<()> {
//!         Err(BridgeError::NotAvailable("deletes".to_string()))
//!     }
//! }
//! ```

pub mod error;
pub mod logging;
pub mod storage;

pub use error::{BridgeError, Result};

// Re-export commonly used types
pub use logging::{ConsoleLogger, LogEntry, LogLevel, LoggerSink};
pub use storage::{
    LocalFileHandle, ProgressReporter, RemoteFileInfo, RemoteFileStore, TransferProgress,
};
