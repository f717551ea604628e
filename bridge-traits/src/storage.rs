//! Remote File Store Abstractions
//!
//! Value types exchanged between the upload core and the host, and the
//! [`RemoteFileStore`] trait bundling the three operations the host injects:
//! list remote files, upload one file, delete one remote file.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::error::Result;

/// Bytes transferred so far out of a known total.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TransferProgress {
    pub loaded: u64,
    pub total: u64,
}

impl TransferProgress {
    pub fn new(loaded: u64, total: u64) -> Self {
        Self { loaded, total }
    }

    /// Returns true when every byte has been transferred.
    pub fn is_complete(&self) -> bool {
        self.loaded == self.total
    }

    /// Integer percentage, clamped to 0-100. An empty total counts as done.
    pub fn percent(&self) -> u8 {
        if self.total == 0 {
            return 100;
        }
        ((self.loaded.min(self.total) * 100) / self.total) as u8
    }
}

/// A file selected by the user on the local side.
///
/// The handle is opaque to the upload core: only `name`, `last_modified` and
/// `size_bytes` take part in scheduling and conflict detection. `path` is
/// carried for bridges that read the content from disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalFileHandle {
    pub name: String,
    pub last_modified: DateTime<Utc>,
    pub size_bytes: u64,
    pub path: Option<PathBuf>,
}

impl LocalFileHandle {
    pub fn new(name: impl Into<String>, last_modified: DateTime<Utc>, size_bytes: u64) -> Self {
        Self {
            name: name.into(),
            last_modified,
            size_bytes,
            path: None,
        }
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }
}

/// What the remote side knows about a file, possibly partially uploaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteFileInfo {
    /// Unique file name; doubles as the record identity
    pub name: String,
    pub last_modified: DateTime<Utc>,
    pub total_bytes: u64,
    pub loaded_bytes: u64,
}

impl RemoteFileInfo {
    pub fn new(
        name: impl Into<String>,
        last_modified: DateTime<Utc>,
        total_bytes: u64,
        loaded_bytes: u64,
    ) -> Self {
        Self {
            name: name.into(),
            last_modified,
            total_bytes,
            loaded_bytes,
        }
    }

    /// Remote view of a local file before any byte has been sent.
    pub fn from_local(file: &LocalFileHandle) -> Self {
        Self::new(file.name.clone(), file.last_modified, file.size_bytes, 0)
    }

    /// Returns a copy carrying the given transfer progress.
    pub fn with_progress(&self, progress: TransferProgress) -> Self {
        Self {
            loaded_bytes: progress.loaded,
            total_bytes: progress.total,
            ..self.clone()
        }
    }

    pub fn progress(&self) -> TransferProgress {
        TransferProgress::new(self.loaded_bytes, self.total_bytes)
    }

    pub fn is_complete(&self) -> bool {
        self.loaded_bytes == self.total_bytes
    }
}

/// Callback through which a running operation reports partial progress.
#[derive(Clone)]
pub struct ProgressReporter {
    callback: Arc<dyn Fn(TransferProgress) + Send + Sync>,
}

impl ProgressReporter {
    pub fn new<F>(callback: F) -> Self
    where
        F: Fn(TransferProgress) + Send + Sync + 'static,
    {
        Self {
            callback: Arc::new(callback),
        }
    }

    /// A reporter that drops every update.
    pub fn noop() -> Self {
        Self::new(|_| {})
    }

    pub fn report(&self, loaded: u64, total: u64) {
        (self.callback)(TransferProgress::new(loaded, total));
    }
}

impl fmt::Debug for ProgressReporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgressReporter").finish_non_exhaustive()
    }
}

/// Remote file store trait
///
/// The three operations the upload core drives. Each call must eventually
/// resolve with exactly one success or error; progress reports are optional.
/// A panicking call is reported to the core as `OperationFailed`.
///
/// # Example
///
/// ```ignore
/// use bridge_traits::storage::{ProgressReporter, RemoteFileStore};
///
/// async fn count_remote(store: &dyn RemoteFileStore) -> usize {
///     store
///         .list_files(ProgressReporter::noop())
///         .await
///         .map(|files| files.len())
///         .unwrap_or(0)
/// }
/// ```
#[async_trait]
pub trait RemoteFileStore: Send + Sync {
    /// List every file the remote side knows about, including partial uploads
    async fn list_files(&self, progress: ProgressReporter) -> Result<Vec<RemoteFileInfo>>;

    /// Upload one file
    ///
    /// Implementations should stop as soon as practical once `cancel` fires
    /// and resolve with [`BridgeError::Aborted`](crate::BridgeError::Aborted).
    /// Completing normally after a cancellation request is also allowed.
    /// `Aborted` returned without a cancellation request counts as an
    /// ordinary failure and stays attached to the file until retried.
    async fn upload_file(
        &self,
        file: &LocalFileHandle,
        progress: ProgressReporter,
        cancel: CancellationToken,
    ) -> Result<()>;

    /// Delete one remote file
    async fn delete_file(&self, file: &RemoteFileInfo) -> Result<()>;
}
