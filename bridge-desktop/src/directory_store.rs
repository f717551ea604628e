//! Remote File Store backed by a local directory, using Tokio fs

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    LocalFileHandle, ProgressReporter, RemoteFileInfo, RemoteFileStore,
};
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Default copy chunk size (64 KiB)
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// Suffix of files still being written. Listing ignores them.
const PARTIAL_SUFFIX: &str = ".part";

/// A directory on disk acting as the remote side.
///
/// - `list_files` reports every regular file with its size and mtime
/// - `upload_file` copies the source in chunks into `<name>.part`, then
///   renames it into place and stamps the source's mtime on it
/// - `delete_file` removes the file
#[derive(Debug, Clone)]
pub struct DirectoryStore {
    root: PathBuf,
    chunk_size: usize,
}

impl DirectoryStore {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self {
            root: root.into(),
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    /// Sets the copy chunk size. Zero is treated as one byte.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn target_path(&self, name: &str) -> Result<PathBuf> {
        let valid = !name.is_empty()
            && name != "."
            && name != ".."
            && !name.contains(['/', '\\'])
            && !name.ends_with(PARTIAL_SUFFIX);
        if !valid {
            return Err(BridgeError::Rejected {
                status: 400,
                message: format!("Invalid remote file name: {:?}", name),
            });
        }
        Ok(self.root.join(name))
    }

    async fn copy_chunks(
        &self,
        source: &Path,
        partial: &Path,
        total: u64,
        progress: &ProgressReporter,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let mut reader = fs::File::open(source).await?;
        let mut writer = fs::File::create(partial).await?;
        let mut buffer = vec![0u8; self.chunk_size];
        let mut loaded = 0u64;

        loop {
            if cancel.is_cancelled() {
                return Err(BridgeError::Aborted);
            }

            let read = reader.read(&mut buffer).await?;
            if read == 0 {
                break;
            }

            writer.write_all(&buffer[..read]).await?;
            loaded += read as u64;
            progress.report(loaded, total.max(loaded));
        }

        writer.flush().await?;
        writer.sync_all().await?;

        if loaded != total {
            return Err(BridgeError::OperationFailed(format!(
                "Source changed during upload: expected {} bytes, copied {}",
                total, loaded
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteFileStore for DirectoryStore {
    async fn list_files(&self, progress: ProgressReporter) -> Result<Vec<RemoteFileInfo>> {
        let mut paths = Vec::new();
        let mut read_dir = fs::read_dir(&self.root).await?;
        while let Some(entry) = read_dir.next_entry().await? {
            paths.push(entry.path());
        }

        let total = paths.len() as u64;
        let mut files = Vec::with_capacity(paths.len());
        for (index, path) in paths.into_iter().enumerate() {
            progress.report(index as u64 + 1, total);

            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if name.ends_with(PARTIAL_SUFFIX) {
                continue;
            }

            let metadata = fs::metadata(&path).await?;
            if !metadata.is_file() {
                continue;
            }

            let size = metadata.len();
            files.push(RemoteFileInfo::new(
                name,
                modified_at(&metadata)?,
                size,
                size,
            ));
        }

        files.sort_by(|a, b| a.name.cmp(&b.name));
        debug!(count = files.len(), "Listed remote directory");
        Ok(files)
    }

    async fn upload_file(
        &self,
        file: &LocalFileHandle,
        progress: ProgressReporter,
        cancel: CancellationToken,
    ) -> Result<()> {
        let source = file.path.as_ref().ok_or_else(|| {
            BridgeError::NotAvailable(format!("No local path for {}", file.name))
        })?;
        let target = self.target_path(&file.name)?;
        let partial = self.root.join(format!("{}{}", file.name, PARTIAL_SUFFIX));

        fs::create_dir_all(&self.root).await?;

        if let Err(err) = self
            .copy_chunks(source, &partial, file.size_bytes, &progress, &cancel)
            .await
        {
            if let Err(cleanup) = fs::remove_file(&partial).await {
                warn!(name = %file.name, error = %cleanup, "Failed to remove partial upload");
            }
            return Err(err);
        }

        fs::rename(&partial, &target).await?;
        set_modified(target.clone(), file.last_modified).await?;

        debug!(name = %file.name, size = file.size_bytes, "Uploaded file");
        Ok(())
    }

    async fn delete_file(&self, file: &RemoteFileInfo) -> Result<()> {
        let target = self.target_path(&file.name)?;
        fs::remove_file(&target).await?;
        debug!(name = %file.name, "Deleted remote file");
        Ok(())
    }
}

/// Builds a [`LocalFileHandle`] from a file on disk.
///
/// # Errors
///
/// Fails if the path cannot be read, is not a regular file, or has no
/// UTF-8 file name.
pub async fn local_file_handle(path: impl AsRef<Path>) -> Result<LocalFileHandle> {
    let path = path.as_ref();
    let metadata = fs::metadata(path).await?;
    if !metadata.is_file() {
        return Err(BridgeError::OperationFailed(format!(
            "Not a regular file: {}",
            path.display()
        )));
    }

    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| {
            BridgeError::OperationFailed(format!("Unsupported file name: {}", path.display()))
        })?;

    Ok(LocalFileHandle::new(name, modified_at(&metadata)?, metadata.len()).with_path(path))
}

/// Builds handles for every regular file directly inside `dir`, sorted by name.
pub async fn local_file_handles(dir: impl AsRef<Path>) -> Result<Vec<LocalFileHandle>> {
    let mut handles = Vec::new();
    let mut read_dir = fs::read_dir(dir.as_ref()).await?;
    while let Some(entry) = read_dir.next_entry().await? {
        if !entry.file_type().await?.is_file() {
            continue;
        }
        match local_file_handle(entry.path()).await {
            Ok(handle) => handles.push(handle),
            Err(err) => warn!(name = ?entry.file_name(), error = %err, "Skipping local file"),
        }
    }
    handles.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(handles)
}

fn modified_at(metadata: &std::fs::Metadata) -> Result<DateTime<Utc>> {
    Ok(DateTime::<Utc>::from(metadata.modified()?))
}

async fn set_modified(path: PathBuf, modified: DateTime<Utc>) -> Result<()> {
    let time = SystemTime::from(modified);
    tokio::task::spawn_blocking(move || {
        std::fs::File::options()
            .write(true)
            .open(&path)?
            .set_modified(time)
    })
    .await
    .map_err(|e| BridgeError::OperationFailed(format!("Timestamp task failed: {}", e)))?
    .map_err(BridgeError::from)
}
