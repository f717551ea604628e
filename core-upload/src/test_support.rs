use async_trait::async_trait;
use bridge_traits::{LocalFileHandle, ProgressReporter, RemoteFileInfo, RemoteFileStore};
use chrono::{DateTime, Utc};
use mockall::mock;
use tokio_util::sync::CancellationToken;

mock! {
    pub Store {}

    #[async_trait]
    impl RemoteFileStore for Store {
        async fn list_files(&self, progress: ProgressReporter) -> bridge_traits::Result<Vec<RemoteFileInfo>>;
        async fn upload_file(
            &self,
            file: &LocalFileHandle,
            progress: ProgressReporter,
            cancel: CancellationToken,
        ) -> bridge_traits::Result<()>;
        async fn delete_file(&self, file: &RemoteFileInfo) -> bridge_traits::Result<()>;
    }
}

pub fn timestamp() -> DateTime<Utc> {
    DateTime::from_timestamp(1_700_000_000, 0).unwrap()
}

pub fn local(name: &str, size: u64) -> LocalFileHandle {
    LocalFileHandle::new(name, timestamp(), size)
}

pub fn remote(name: &str, total: u64, loaded: u64) -> RemoteFileInfo {
    RemoteFileInfo::new(name, timestamp(), total, loaded)
}
