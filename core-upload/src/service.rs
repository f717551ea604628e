//! # Upload Service
//!
//! Runs a [`MassUpload`] on its own tokio task and exposes it through a
//! cloneable [`MassUploadHandle`]. Commands travel over a bounded mpsc
//! channel; after every command or runner message the task publishes a
//! fresh [`UploadSnapshot`] on a watch channel.
//!
//! ```ignore
//! let config = UploadConfig::builder().remote_directory("/srv/uploads").build()?;
//! let handle = MassUploadService::spawn(config)?;
//! handle.add_files(files).await?;
//!
//! let mut snapshots = handle.watch();
//! while !snapshots.borrow_and_update().is_complete() {
//!     snapshots.changed().await?;
//! }
//! ```

use crate::error::{Result, UploadError};
use crate::orchestrator::{MassUpload, UploadSnapshot};
use crate::record::FileId;
use bridge_traits::{LocalFileHandle, RemoteFileInfo};
use core_runtime::config::UploadConfig;
use core_runtime::events::{EventBus, EventStream};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};

enum Command {
    AddFiles(Vec<LocalFileHandle>, oneshot::Sender<()>),
    AddFileInfos(Vec<RemoteFileInfo>, oneshot::Sender<()>),
    RetryUpload(FileId, oneshot::Sender<Result<()>>),
    RetryAllUploads,
    RemoveUpload(FileId, oneshot::Sender<Result<()>>),
    Abort,
    ListFiles,
    Shutdown,
}

pub struct MassUploadService;

impl MassUploadService {
    /// Validates `config` and starts the service task.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(config: UploadConfig) -> Result<MassUploadHandle> {
        let (handle, _task) = Self::spawn_with_task(config)?;
        Ok(handle)
    }

    /// Like [`spawn`](Self::spawn), also returning the task's join handle.
    pub fn spawn_with_task(config: UploadConfig) -> Result<(MassUploadHandle, JoinHandle<()>)> {
        let mut upload = MassUpload::from_config(&config)?;
        let events = upload.event_bus().clone();
        let (commands_tx, commands_rx) = mpsc::channel(config.command_buffer_size);
        let (snapshots_tx, snapshots_rx) = watch::channel(upload.snapshot());

        if config.list_on_start {
            upload.fetch_file_infos_from_server();
            snapshots_tx.send_replace(upload.snapshot());
        }

        info!(list_on_start = config.list_on_start, "Starting mass upload service");
        let task = tokio::spawn(run_service(upload, commands_rx, snapshots_tx));

        Ok((
            MassUploadHandle {
                commands: commands_tx,
                snapshots: snapshots_rx,
                events,
            },
            task,
        ))
    }
}

async fn run_service(
    mut upload: MassUpload,
    mut commands: mpsc::Receiver<Command>,
    snapshots: watch::Sender<UploadSnapshot>,
) {
    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(Command::Shutdown) | None => {
                    upload.abort();
                    snapshots.send_replace(upload.snapshot());
                    break;
                }
                Some(command) => execute(&mut upload, command, &snapshots),
            },
            Some(message) = upload.recv_message() => upload.handle_message(message),
        }
        snapshots.send_replace(upload.snapshot());
    }
    debug!("Mass upload service stopped");
}

fn execute(upload: &mut MassUpload, command: Command, snapshots: &watch::Sender<UploadSnapshot>) {
    match command {
        // Publish before acknowledging so callers observe the merged records.
        Command::AddFiles(handles, done) => {
            upload.add_files(handles);
            snapshots.send_replace(upload.snapshot());
            let _ = done.send(());
        }
        Command::AddFileInfos(infos, done) => {
            upload.add_file_infos(infos);
            snapshots.send_replace(upload.snapshot());
            let _ = done.send(());
        }
        Command::RetryUpload(file_id, reply) => {
            let _ = reply.send(upload.retry_upload(&file_id));
        }
        Command::RetryAllUploads => upload.retry_all_uploads(),
        Command::RemoveUpload(file_id, reply) => {
            let _ = reply.send(upload.remove_upload(&file_id));
        }
        Command::Abort => upload.abort(),
        Command::ListFiles => upload.fetch_file_infos_from_server(),
        Command::Shutdown => {}
    }
}

/// Cloneable handle to a running [`MassUploadService`].
#[derive(Debug, Clone)]
pub struct MassUploadHandle {
    commands: mpsc::Sender<Command>,
    snapshots: watch::Receiver<UploadSnapshot>,
    events: EventBus,
}

impl MassUploadHandle {
    /// Adds local files. Returns once they are merged and the resulting
    /// snapshot is published.
    pub async fn add_files(&self, handles: Vec<LocalFileHandle>) -> Result<()> {
        let (done, merged) = oneshot::channel();
        self.send(Command::AddFiles(handles, done)).await?;
        merged.await.map_err(|_| UploadError::ServiceClosed)
    }

    pub async fn add_file_infos(&self, infos: Vec<RemoteFileInfo>) -> Result<()> {
        let (done, merged) = oneshot::channel();
        self.send(Command::AddFileInfos(infos, done)).await?;
        merged.await.map_err(|_| UploadError::ServiceClosed)
    }

    pub async fn retry_upload(&self, file_id: impl Into<FileId>) -> Result<()> {
        let (reply, response) = oneshot::channel();
        self.send(Command::RetryUpload(file_id.into(), reply)).await?;
        response.await.map_err(|_| UploadError::ServiceClosed)?
    }

    pub async fn retry_all_uploads(&self) -> Result<()> {
        self.send(Command::RetryAllUploads).await
    }

    pub async fn remove_upload(&self, file_id: impl Into<FileId>) -> Result<()> {
        let (reply, response) = oneshot::channel();
        self.send(Command::RemoveUpload(file_id.into(), reply)).await?;
        response.await.map_err(|_| UploadError::ServiceClosed)?
    }

    pub async fn abort(&self) -> Result<()> {
        self.send(Command::Abort).await
    }

    pub async fn fetch_file_infos_from_server(&self) -> Result<()> {
        self.send(Command::ListFiles).await
    }

    pub async fn retry_list_files(&self) -> Result<()> {
        self.fetch_file_infos_from_server().await
    }

    /// Stops the service after aborting any running upload.
    pub async fn shutdown(&self) -> Result<()> {
        self.send(Command::Shutdown).await
    }

    /// Latest published snapshot.
    pub fn snapshot(&self) -> UploadSnapshot {
        self.snapshots.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<UploadSnapshot> {
        self.snapshots.clone()
    }

    pub fn subscribe(&self) -> EventStream {
        EventStream::new(self.events.subscribe())
    }

    /// Waits until a snapshot satisfies `predicate` and returns it.
    pub async fn wait_for<F>(&self, mut predicate: F) -> Result<UploadSnapshot>
    where
        F: FnMut(&UploadSnapshot) -> bool,
    {
        let mut snapshots = self.snapshots.clone();
        let snapshot = snapshots
            .wait_for(|snapshot| predicate(snapshot))
            .await
            .map_err(|_| UploadError::ServiceClosed)?;
        Ok(snapshot.clone())
    }

    async fn send(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| UploadError::ServiceClosed)
    }
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Command::AddFiles(..) => "AddFiles",
            Command::AddFileInfos(..) => "AddFileInfos",
            Command::RetryUpload(..) => "RetryUpload",
            Command::RetryAllUploads => "RetryAllUploads",
            Command::RemoveUpload(..) => "RemoveUpload",
            Command::Abort => "Abort",
            Command::ListFiles => "ListFiles",
            Command::Shutdown => "Shutdown",
        };
        f.write_str(name)
    }
}
