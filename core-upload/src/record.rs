//! # File Records
//!
//! A [`FileRecord`] is one candidate file of a mass upload. It merges what the
//! user selected locally with what the remote side reports for the same name.
//!
//! Every setter returns `Option<RecordChange>`: `None` when the value did not
//! change, otherwise the field's before and after values. The record set
//! turns these into change events for observers.

use bridge_traits::{BridgeError, LocalFileHandle, RemoteFileInfo, TransferProgress};
use core_runtime::events::RecordField;

/// Record identity: the file name shared by local and remote sides.
pub type FileId = String;

/// One candidate file.
///
/// At least one of `local_handle` and `remote_info` is always present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    id: FileId,
    local_handle: Option<LocalFileHandle>,
    remote_info: Option<RemoteFileInfo>,
    last_error: Option<BridgeError>,
    is_uploading: bool,
    is_deleting: bool,
}

/// A field of a record moved from `old` to `new`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldChange {
    LocalHandle {
        old: Option<LocalFileHandle>,
        new: Option<LocalFileHandle>,
    },
    RemoteInfo {
        old: Option<RemoteFileInfo>,
        new: Option<RemoteFileInfo>,
    },
    Error {
        old: Option<BridgeError>,
        new: Option<BridgeError>,
    },
    Uploading {
        old: bool,
        new: bool,
    },
    Deleting {
        old: bool,
        new: bool,
    },
}

/// A tagged change of one record field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordChange {
    pub id: FileId,
    pub change: FieldChange,
}

impl RecordChange {
    pub fn field(&self) -> RecordField {
        match self.change {
            FieldChange::LocalHandle { .. } => RecordField::LocalHandle,
            FieldChange::RemoteInfo { .. } => RecordField::RemoteInfo,
            FieldChange::Error { .. } => RecordField::Error,
            FieldChange::Uploading { .. } => RecordField::Uploading,
            FieldChange::Deleting { .. } => RecordField::Deleting,
        }
    }
}

impl FileRecord {
    /// A record for a file the user selected, not yet known remotely.
    pub fn from_local(handle: LocalFileHandle) -> Self {
        Self {
            id: handle.name.clone(),
            local_handle: Some(handle),
            remote_info: None,
            last_error: None,
            is_uploading: false,
            is_deleting: false,
        }
    }

    /// A record for a file the remote side reported.
    pub fn from_remote(info: RemoteFileInfo) -> Self {
        Self {
            id: info.name.clone(),
            local_handle: None,
            remote_info: Some(info),
            last_error: None,
            is_uploading: false,
            is_deleting: false,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn local_handle(&self) -> Option<&LocalFileHandle> {
        self.local_handle.as_ref()
    }

    pub fn remote_info(&self) -> Option<&RemoteFileInfo> {
        self.remote_info.as_ref()
    }

    pub fn last_error(&self) -> Option<&BridgeError> {
        self.last_error.as_ref()
    }

    pub fn is_uploading(&self) -> bool {
        self.is_uploading
    }

    pub fn is_deleting(&self) -> bool {
        self.is_deleting
    }

    /// Local and remote data both exist and disagree on name, size or
    /// modification time.
    pub fn has_conflict(&self) -> bool {
        match (&self.local_handle, &self.remote_info) {
            (Some(local), Some(remote)) => {
                local.name != remote.name
                    || local.size_bytes != remote.total_bytes
                    || local.last_modified != remote.last_modified
            }
            _ => false,
        }
    }

    pub fn is_fully_uploaded(&self) -> bool {
        !self.is_uploading
            && !self.is_deleting
            && self.last_error.is_none()
            && self
                .remote_info
                .as_ref()
                .map_or(false, RemoteFileInfo::is_complete)
    }

    /// Bytes this record contributes to the aggregate.
    ///
    /// Remote progress counts only while it agrees with the local selection;
    /// a conflicted record counts as not started.
    pub fn progress(&self) -> Option<TransferProgress> {
        match (&self.remote_info, &self.local_handle) {
            (Some(remote), _) if !self.has_conflict() => Some(remote.progress()),
            (_, Some(local)) => Some(TransferProgress::new(0, local.size_bytes)),
            _ => None,
        }
    }

    pub fn set_local_handle(&mut self, handle: LocalFileHandle) -> Option<RecordChange> {
        if self.local_handle.as_ref() == Some(&handle) {
            return None;
        }
        let old = self.local_handle.replace(handle.clone());
        self.changed(FieldChange::LocalHandle {
            old,
            new: Some(handle),
        })
    }

    pub fn update_with_remote_info(&mut self, info: RemoteFileInfo) -> Option<RecordChange> {
        if self.remote_info.as_ref() == Some(&info) {
            return None;
        }
        let old = self.remote_info.replace(info.clone());
        self.changed(FieldChange::RemoteInfo {
            old,
            new: Some(info),
        })
    }

    /// Records upload progress as a remote view of the local file.
    ///
    /// Ignored for records without a local handle.
    pub fn update_with_progress(&mut self, progress: TransferProgress) -> Option<RecordChange> {
        let info = RemoteFileInfo::from_local(self.local_handle.as_ref()?).with_progress(progress);
        self.update_with_remote_info(info)
    }

    /// Marks every byte of the local file as stored remotely.
    pub fn complete_upload(&mut self) -> Option<RecordChange> {
        let size = self.local_handle.as_ref()?.size_bytes;
        self.update_with_progress(TransferProgress::new(size, size))
    }

    pub fn with_error(&mut self, error: BridgeError) -> Option<RecordChange> {
        if self.last_error.as_ref() == Some(&error) {
            return None;
        }
        let old = self.last_error.replace(error.clone());
        self.changed(FieldChange::Error {
            old,
            new: Some(error),
        })
    }

    pub fn without_error(&mut self) -> Option<RecordChange> {
        let old = self.last_error.take()?;
        self.changed(FieldChange::Error {
            old: Some(old),
            new: None,
        })
    }

    pub fn set_uploading(&mut self, uploading: bool) -> Option<RecordChange> {
        if self.is_uploading == uploading {
            return None;
        }
        self.is_uploading = uploading;
        self.changed(FieldChange::Uploading {
            old: !uploading,
            new: uploading,
        })
    }

    pub fn set_deleting(&mut self, deleting: bool) -> Option<RecordChange> {
        if self.is_deleting == deleting {
            return None;
        }
        self.is_deleting = deleting;
        self.changed(FieldChange::Deleting {
            old: !deleting,
            new: deleting,
        })
    }

    fn changed(&self, change: FieldChange) -> Option<RecordChange> {
        Some(RecordChange {
            id: self.id.clone(),
            change,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};

    fn timestamp() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    fn local(name: &str, size: u64) -> LocalFileHandle {
        LocalFileHandle::new(name, timestamp(), size)
    }

    fn remote(name: &str, total: u64, loaded: u64) -> RemoteFileInfo {
        RemoteFileInfo::new(name, timestamp(), total, loaded)
    }

    #[test]
    fn test_local_record_progress() {
        let record = FileRecord::from_local(local("a.txt", 10));
        assert_eq!(record.id(), "a.txt");
        assert_eq!(record.progress(), Some(TransferProgress::new(0, 10)));
        assert!(!record.has_conflict());
        assert!(!record.is_fully_uploaded());
    }

    #[test]
    fn test_remote_record_progress() {
        let record = FileRecord::from_remote(remote("a.txt", 10, 4));
        assert_eq!(record.progress(), Some(TransferProgress::new(4, 10)));

        let done = FileRecord::from_remote(remote("b.txt", 10, 10));
        assert!(done.is_fully_uploaded());
    }

    #[test]
    fn test_conflict_on_size_or_mtime() {
        let mut record = FileRecord::from_local(local("a.txt", 10));
        record.update_with_remote_info(remote("a.txt", 99, 0));
        assert!(record.has_conflict());
        assert_eq!(record.progress(), Some(TransferProgress::new(0, 10)));

        let later = timestamp() + chrono::Duration::seconds(1);
        record.update_with_remote_info(RemoteFileInfo::new("a.txt", later, 10, 0));
        assert!(record.has_conflict());

        record.update_with_remote_info(remote("a.txt", 10, 3));
        assert!(!record.has_conflict());
        assert_eq!(record.progress(), Some(TransferProgress::new(3, 10)));
    }

    #[test]
    fn test_setters_report_changes_once() {
        let mut record = FileRecord::from_local(local("a.txt", 10));

        let change = record.set_uploading(true).unwrap();
        assert_eq!(change.id, "a.txt");
        assert_eq!(
            change.change,
            FieldChange::Uploading {
                old: false,
                new: true
            }
        );
        assert_eq!(change.field(), RecordField::Uploading);
        assert!(record.set_uploading(true).is_none());

        assert!(record.set_local_handle(local("a.txt", 10)).is_none());
        assert!(record.set_local_handle(local("a.txt", 11)).is_some());
    }

    #[test]
    fn test_error_round_trip() {
        let mut record = FileRecord::from_local(local("a.txt", 10));
        assert!(record.without_error().is_none());

        let err = BridgeError::OperationFailed("timeout".to_string());
        let set = record.with_error(err.clone()).unwrap();
        assert_eq!(
            set.change,
            FieldChange::Error {
                old: None,
                new: Some(err.clone())
            }
        );
        assert!(record.with_error(err.clone()).is_none());

        let cleared = record.without_error().unwrap();
        assert_eq!(
            cleared.change,
            FieldChange::Error {
                old: Some(err),
                new: None
            }
        );
        assert!(record.last_error().is_none());
    }

    #[test]
    fn test_update_with_progress_uses_local_identity() {
        let mut record = FileRecord::from_local(local("a.txt", 10));
        record.update_with_progress(TransferProgress::new(6, 10));

        let info = record.remote_info().unwrap();
        assert_eq!(info.name, "a.txt");
        assert_eq!(info.last_modified, timestamp());
        assert_eq!(info.loaded_bytes, 6);
        assert!(!record.has_conflict());

        record.complete_upload();
        assert!(record.is_fully_uploaded());
    }

    #[test]
    fn test_progress_ignored_without_local_handle() {
        let mut record = FileRecord::from_remote(remote("a.txt", 10, 2));
        assert!(record
            .update_with_progress(TransferProgress::new(5, 10))
            .is_none());
        assert!(record.complete_upload().is_none());
    }
}
