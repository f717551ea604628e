//! # Core Upload Module
//!
//! Orchestrates the upload of many files to a remote store, one transfer at
//! a time.
//!
//! ## Overview
//!
//! The user selects local files; the remote side reports what it already
//! holds. Both are merged by file name into [`FileRecord`]s. A priority
//! queue decides what runs next: deletions first, then the upload already
//! in progress, then partially uploaded files, then new ones. Records whose
//! local and remote data disagree are left alone until the user resolves
//! the conflict.
//!
//! - [`MassUpload`]: the single-owner state machine
//! - [`MassUploadService`]: runs a `MassUpload` on a task behind a
//!   cloneable [`MassUploadHandle`]
//! - [`RecordSet`], [`PriorityQueue`], [`ProgressAggregator`], [`ErrorList`]:
//!   the record model and its derived state
//! - [`runner`]: the lister, uploader and deleter wrapping the
//!   [`RemoteFileStore`](bridge_traits::RemoteFileStore) operations
//!
//! State changes are published on the
//! [`EventBus`](core_runtime::events::EventBus).

pub mod error;
pub mod error_list;
pub mod orchestrator;
pub mod priority_queue;
pub mod progress;
pub mod record;
pub mod record_set;
pub mod runner;
pub mod service;

#[cfg(test)]
mod test_support;

pub use error::{Result, UploadError};
pub use error_list::{ErrorList, UploadErrorEntry};
pub use orchestrator::{MassUpload, UploadSnapshot, UploadStatus};
pub use priority_queue::{classify, Bucket, PriorityQueue};
pub use progress::ProgressAggregator;
pub use record::{FieldChange, FileId, FileRecord, RecordChange};
pub use record_set::{RecordEvent, RecordObserver, RecordSet};
pub use runner::{RunId, RunnerMessage};
pub use service::{MassUploadHandle, MassUploadService};
