//! Integration tests for the mass upload orchestrator
//!
//! These tests drive `MassUpload` against a scripted remote store whose
//! operations stay pending until the test answers them:
//! - Merging local selections with remote listings
//! - Scheduling order and preemption
//! - Aggregate progress and error bookkeeping
//! - End-to-end uploads into a directory on disk

use async_trait::async_trait;
use bridge_desktop::{local_file_handles, DirectoryStore};
use bridge_traits::{
    BridgeError, LocalFileHandle, ProgressReporter, RemoteFileInfo, RemoteFileStore,
    TransferProgress,
};
use chrono::{DateTime, Utc};
use core_runtime::events::{CoreEvent, TransferEvent};
use core_upload::{classify, Bucket, FileRecord, MassUpload, RecordSet, UploadStatus};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

// ============================================================================
// Scripted Store
// ============================================================================

type Reply<T> = oneshot::Sender<bridge_traits::Result<T>>;

/// One pending store operation, answered by the test.
enum Call {
    List {
        progress: ProgressReporter,
        reply: Reply<Vec<RemoteFileInfo>>,
    },
    Upload {
        file: LocalFileHandle,
        progress: ProgressReporter,
        reply: Reply<()>,
    },
    Delete {
        file: RemoteFileInfo,
        reply: Reply<()>,
    },
}

impl Call {
    fn describe(&self) -> String {
        match self {
            Call::List { .. } => "list".to_string(),
            Call::Upload { file, .. } => format!("upload {}", file.name),
            Call::Delete { file, .. } => format!("delete {}", file.name),
        }
    }
}

struct ScriptedStore {
    calls: mpsc::UnboundedSender<Call>,
}

impl ScriptedStore {
    fn new() -> (Self, mpsc::UnboundedReceiver<Call>) {
        let (calls, rx) = mpsc::unbounded_channel();
        (Self { calls }, rx)
    }

    fn submit<T>(
        &self,
        call: impl FnOnce(Reply<T>) -> Call,
    ) -> bridge_traits::Result<oneshot::Receiver<bridge_traits::Result<T>>> {
        let (reply, response) = oneshot::channel();
        self.calls
            .send(call(reply))
            .map_err(|_| BridgeError::NotAvailable("test finished".to_string()))?;
        Ok(response)
    }
}

#[async_trait]
impl RemoteFileStore for ScriptedStore {
    async fn list_files(
        &self,
        progress: ProgressReporter,
    ) -> bridge_traits::Result<Vec<RemoteFileInfo>> {
        let response = self.submit(|reply| Call::List { progress, reply })?;
        response.await.unwrap_or(Err(BridgeError::Aborted))
    }

    async fn upload_file(
        &self,
        file: &LocalFileHandle,
        progress: ProgressReporter,
        cancel: CancellationToken,
    ) -> bridge_traits::Result<()> {
        let file = file.clone();
        let response = self.submit(|reply| Call::Upload {
            file,
            progress,
            reply,
        })?;
        tokio::select! {
            result = response => result.unwrap_or(Err(BridgeError::Aborted)),
            _ = cancel.cancelled() => Err(BridgeError::Aborted),
        }
    }

    async fn delete_file(&self, file: &RemoteFileInfo) -> bridge_traits::Result<()> {
        let file = file.clone();
        let response = self.submit(|reply| Call::Delete { file, reply })?;
        response.await.unwrap_or(Err(BridgeError::Aborted))
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn timestamp() -> DateTime<Utc> {
    DateTime::from_timestamp(1_700_000_000, 0).unwrap()
}

fn local(name: &str, size: u64) -> LocalFileHandle {
    LocalFileHandle::new(name, timestamp(), size)
}

fn remote(name: &str, total: u64, loaded: u64) -> RemoteFileInfo {
    RemoteFileInfo::new(name, timestamp(), total, loaded)
}

fn scripted() -> (MassUpload, mpsc::UnboundedReceiver<Call>) {
    let (store, calls) = ScriptedStore::new();
    (MassUpload::new(Arc::new(store)), calls)
}

/// Pumps runner messages until the store receives its next call.
async fn next_call(upload: &mut MassUpload, calls: &mut mpsc::UnboundedReceiver<Call>) -> Call {
    loop {
        tokio::select! {
            Some(call) = calls.recv() => return call,
            Some(message) = upload.recv_message() => upload.handle_message(message),
        }
    }
}

/// Lets spawned runs make progress and handles everything they report.
async fn settle(upload: &mut MassUpload) {
    for _ in 0..16 {
        tokio::task::yield_now().await;
        upload.process_pending_events();
    }
}

fn recomputed_progress(records: &RecordSet) -> TransferProgress {
    records
        .iter()
        .filter_map(FileRecord::progress)
        .fold(TransferProgress::default(), |acc, p| {
            TransferProgress::new(acc.loaded + p.loaded, acc.total + p.total)
        })
}

fn bucket_rank(bucket: Bucket) -> usize {
    Bucket::SCHEDULED
        .iter()
        .position(|b| *b == bucket)
        .unwrap_or(Bucket::SCHEDULED.len())
}

/// `next()` comes from the highest-priority non-empty bucket.
fn assert_priority_invariant(records: &RecordSet) {
    let best = records.iter().map(|r| bucket_rank(classify(r))).min();
    let next = records.next().map(|r| bucket_rank(classify(r)));
    match (best, next) {
        (Some(best), Some(next)) => assert_eq!(best, next),
        (Some(best), None) => assert_eq!(best, Bucket::SCHEDULED.len()),
        (None, next) => assert!(next.is_none()),
    }
}

// ============================================================================
// Record merging
// ============================================================================

#[tokio::test]
async fn test_adding_same_file_twice_keeps_one_record() {
    let (mut upload, mut calls) = scripted();

    upload.add_files(vec![local("a.txt", 10)]);
    let first = next_call(&mut upload, &mut calls).await;
    assert_eq!(first.describe(), "upload a.txt");

    upload.add_files(vec![local("a.txt", 10)]);
    settle(&mut upload).await;

    assert_eq!(upload.records().len(), 1);
    assert_eq!(upload.upload_progress(), TransferProgress::new(0, 10));
    // Same file again is not a better action; the running upload continues.
    assert!(calls.try_recv().is_err());
    assert!(upload.record("a.txt").unwrap().is_uploading());
}

// ============================================================================
// Scenarios
// ============================================================================

#[tokio::test]
async fn test_single_upload_to_completion() {
    let (mut upload, mut calls) = scripted();
    upload.add_files(vec![local("a.txt", 10)]);
    assert_eq!(upload.status(), UploadStatus::Uploading);

    let Call::Upload {
        file,
        progress,
        reply,
    } = next_call(&mut upload, &mut calls).await
    else {
        panic!("expected an upload");
    };
    assert_eq!(file.name, "a.txt");

    progress.report(4, 10);
    settle(&mut upload).await;
    assert_eq!(upload.upload_progress(), TransferProgress::new(4, 10));
    assert_eq!(upload.records().bucket_of("a.txt"), Bucket::Uploading);

    reply.send(Ok(())).unwrap();
    settle(&mut upload).await;

    assert_eq!(upload.upload_progress(), TransferProgress::new(10, 10));
    assert_eq!(upload.status(), UploadStatus::Waiting);
    assert!(upload.record("a.txt").unwrap().is_fully_uploaded());
    assert!(upload.snapshot().is_complete());
}

#[tokio::test]
async fn test_conflicting_listing_blocks_upload() {
    let (mut upload, mut calls) = scripted();
    upload.fetch_file_infos_from_server();
    assert_eq!(upload.status(), UploadStatus::ListingFiles);

    let Call::List { progress, reply } = next_call(&mut upload, &mut calls).await else {
        panic!("expected a listing");
    };
    progress.report(1, 1);
    settle(&mut upload).await;
    assert_eq!(upload.list_files_progress(), Some(TransferProgress::new(1, 1)));

    reply.send(Ok(vec![remote("a.txt", 99, 0)])).unwrap();
    settle(&mut upload).await;
    assert_eq!(upload.status(), UploadStatus::Waiting);

    upload.add_files(vec![local("a.txt", 10)]);
    settle(&mut upload).await;

    let record = upload.record("a.txt").unwrap();
    assert!(record.has_conflict());
    assert!(upload.records().next().is_none());
    assert_eq!(upload.status(), UploadStatus::WaitingConflict);
    assert_eq!(upload.conflicted_ids(), vec!["a.txt".to_string()]);
    assert!(calls.try_recv().is_err());
}

#[tokio::test]
async fn test_conflicting_listing_preempts_running_upload() {
    let (mut upload, mut calls) = scripted();
    upload.add_files(vec![local("a.txt", 10)]);
    let Call::Upload { reply: _pending, .. } = next_call(&mut upload, &mut calls).await else {
        panic!("expected an upload");
    };

    upload.add_file_infos(vec![remote("a.txt", 99, 0)]);
    settle(&mut upload).await;

    assert!(!upload.is_busy());
    assert!(upload.upload_errors().is_empty());
    assert_eq!(upload.status(), UploadStatus::WaitingConflict);
}

#[tokio::test]
async fn test_removal_preempts_upload() {
    let (mut upload, mut calls) = scripted();
    let mut events = upload.subscribe();

    upload.add_file_infos(vec![remote("two.txt", 5, 5)]);
    upload.add_files(vec![local("one.txt", 10), local("two.txt", 5)]);
    assert_eq!(upload.records().bucket_of("two.txt"), Bucket::Unscheduled);

    let Call::Upload {
        file,
        progress,
        reply: _pending,
    } = next_call(&mut upload, &mut calls).await
    else {
        panic!("expected an upload");
    };
    assert_eq!(file.name, "one.txt");
    progress.report(3, 10);
    settle(&mut upload).await;

    upload.remove_upload("two.txt").unwrap();

    let Call::Delete { file, reply } = next_call(&mut upload, &mut calls).await else {
        panic!("expected a delete");
    };
    assert_eq!(file.name, "two.txt");

    let one = upload.record("one.txt").unwrap();
    assert!(!one.is_uploading());
    assert!(one.last_error().is_none());
    assert_eq!(upload.records().bucket_of("one.txt"), Bucket::Unfinished);
    assert_eq!(upload.status(), UploadStatus::Uploading);

    reply.send(Ok(())).unwrap();
    let resumed = next_call(&mut upload, &mut calls).await;
    assert_eq!(resumed.describe(), "upload one.txt");
    assert!(upload.record("two.txt").is_none());

    let mut aborted = false;
    while let Some(Ok(event)) = events.try_recv() {
        if event
            == CoreEvent::Transfer(TransferEvent::UploadAborted {
                file_id: "one.txt".to_string(),
            })
        {
            aborted = true;
        }
    }
    assert!(aborted);
}

#[tokio::test]
async fn test_deletion_is_not_preempted() {
    let (mut upload, mut calls) = scripted();
    upload.add_file_infos(vec![remote("old.txt", 5, 5)]);
    upload.remove_upload("old.txt").unwrap();
    let Call::Delete { reply, .. } = next_call(&mut upload, &mut calls).await else {
        panic!("expected a delete");
    };

    upload.add_files(vec![local("new.txt", 1)]);
    settle(&mut upload).await;
    assert!(calls.try_recv().is_err());

    reply.send(Ok(())).unwrap();
    let next = next_call(&mut upload, &mut calls).await;
    assert_eq!(next.describe(), "upload new.txt");
}

#[tokio::test]
async fn test_removing_uploading_local_file_drops_it_after_abort() {
    let (mut upload, mut calls) = scripted();
    upload.add_files(vec![local("a.txt", 10)]);
    let _pending = next_call(&mut upload, &mut calls).await;

    upload.remove_upload("a.txt").unwrap();
    settle(&mut upload).await;

    assert!(upload.records().is_empty());
    assert!(!upload.is_busy());
    assert!(calls.try_recv().is_err());
}

// ============================================================================
// Derived state
// ============================================================================

#[tokio::test]
async fn test_priority_and_progress_hold_across_operations() {
    let (mut upload, mut calls) = scripted();

    upload.add_file_infos(vec![remote("b.txt", 20, 5), remote("c.txt", 4, 4)]);
    assert_priority_invariant(upload.records());
    upload.add_files(vec![local("a.txt", 10), local("b.txt", 20), local("d.txt", 7)]);
    assert_priority_invariant(upload.records());
    assert_eq!(upload.upload_progress(), recomputed_progress(upload.records()));

    // The partial upload outranks the fresh one.
    let Call::Upload { file, progress, reply } = next_call(&mut upload, &mut calls).await else {
        panic!("expected an upload");
    };
    assert_eq!(file.name, "b.txt");

    progress.report(12, 20);
    settle(&mut upload).await;
    assert_priority_invariant(upload.records());
    assert_eq!(upload.upload_progress(), recomputed_progress(upload.records()));
    assert_eq!(upload.upload_progress(), TransferProgress::new(16, 41));

    reply.send(Err(BridgeError::Io("disk full".to_string()))).unwrap();
    let Call::Upload { file, reply, .. } = next_call(&mut upload, &mut calls).await else {
        panic!("expected an upload");
    };
    assert_eq!(file.name, "a.txt");
    assert_eq!(upload.status(), UploadStatus::UploadingError);
    assert_priority_invariant(upload.records());

    upload.remove_upload("c.txt").unwrap();
    assert_priority_invariant(upload.records());
    assert_eq!(upload.upload_progress(), recomputed_progress(upload.records()));

    drop(reply);
    settle(&mut upload).await;
    assert_eq!(upload.upload_progress(), recomputed_progress(upload.records()));
}

#[tokio::test]
async fn test_errors_sorted_and_cleared_by_retry() {
    let (mut upload, mut calls) = scripted();
    upload.add_files(vec![local("b.txt", 1), local("a.txt", 1)]);

    for _ in 0..2 {
        let Call::Upload { reply, .. } = next_call(&mut upload, &mut calls).await else {
            panic!("expected an upload");
        };
        reply
            .send(Err(BridgeError::Rejected {
                status: 500,
                message: "server error".to_string(),
            }))
            .unwrap();
    }
    settle(&mut upload).await;

    let ids: Vec<_> = upload
        .upload_errors()
        .iter()
        .map(|entry| entry.file_id.as_str())
        .collect();
    assert_eq!(ids, vec!["a.txt", "b.txt"]);
    assert_eq!(upload.status(), UploadStatus::WaitingError);

    upload.retry_all_uploads();
    assert!(upload.upload_errors().is_empty());

    let first = next_call(&mut upload, &mut calls).await;
    assert_eq!(first.describe(), "upload b.txt");
}

// ============================================================================
// Directory store
// ============================================================================

struct TempDirs {
    base: PathBuf,
    local: PathBuf,
    remote: PathBuf,
}

impl TempDirs {
    fn new() -> Self {
        let base = std::env::temp_dir().join(format!("core-upload-test-{}", uuid::Uuid::new_v4()));
        let local = base.join("local");
        let remote = base.join("remote");
        std::fs::create_dir_all(&local).unwrap();
        std::fs::create_dir_all(&remote).unwrap();
        Self {
            base,
            local,
            remote,
        }
    }
}

impl Drop for TempDirs {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.base);
    }
}

#[tokio::test]
async fn test_uploads_directory_and_relists_without_conflicts() {
    let dirs = TempDirs::new();
    std::fs::write(dirs.local.join("a.txt"), vec![b'a'; 300]).unwrap();
    std::fs::write(dirs.local.join("b.txt"), vec![b'b'; 70]).unwrap();

    let store = Arc::new(DirectoryStore::new(&dirs.remote).with_chunk_size(64));
    let mut upload = MassUpload::new(store.clone());
    upload.fetch_file_infos_from_server();
    upload.add_files(local_file_handles(&dirs.local).await.unwrap());
    upload.run_until_idle().await;

    assert!(upload.snapshot().is_complete());
    assert_eq!(upload.upload_progress(), TransferProgress::new(370, 370));
    assert_eq!(std::fs::read(dirs.remote.join("a.txt")).unwrap().len(), 300);

    // A fresh session sees the copies as already uploaded.
    let mut second = MassUpload::new(store);
    second.fetch_file_infos_from_server();
    second.run_until_idle().await;
    second.add_files(local_file_handles(&dirs.local).await.unwrap());
    second.run_until_idle().await;

    assert!(second.conflicted_ids().is_empty());
    assert!(second.snapshot().is_complete());
    assert_eq!(second.records().len(), 2);
}
