//! Per-record transfer errors, kept sorted by file id.

use crate::record::{FieldChange, FileId};
use crate::record_set::{RecordEvent, RecordObserver, RecordSet};
use bridge_traits::BridgeError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadErrorEntry {
    pub file_id: FileId,
    pub error: BridgeError,
}

#[derive(Debug, Default)]
pub struct ErrorList {
    entries: Vec<UploadErrorEntry>,
}

impl ErrorList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> &[UploadErrorEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn ids(&self) -> Vec<FileId> {
        self.entries.iter().map(|e| e.file_id.clone()).collect()
    }

    pub fn set(&mut self, file_id: &str, error: BridgeError) {
        match self.position(file_id) {
            Ok(index) => self.entries[index].error = error,
            Err(index) => self.entries.insert(
                index,
                UploadErrorEntry {
                    file_id: file_id.to_string(),
                    error,
                },
            ),
        }
    }

    pub fn clear(&mut self, file_id: &str) {
        if let Ok(index) = self.position(file_id) {
            self.entries.remove(index);
        }
    }

    pub fn reset(&mut self, records: &RecordSet) {
        self.entries = records
            .iter()
            .filter_map(|record| {
                record.last_error().map(|error| UploadErrorEntry {
                    file_id: record.id().to_string(),
                    error: error.clone(),
                })
            })
            .collect();
        self.entries.sort_by(|a, b| a.file_id.cmp(&b.file_id));
    }

    fn position(&self, file_id: &str) -> Result<usize, usize> {
        self.entries
            .binary_search_by(|entry| entry.file_id.as_str().cmp(file_id))
    }
}

impl RecordObserver for ErrorList {
    fn on_record_event(&mut self, event: &RecordEvent, records: &RecordSet) {
        match event {
            RecordEvent::Changed(change) => {
                if let FieldChange::Error { new, .. } = &change.change {
                    match new {
                        Some(error) => self.set(&change.id, error.clone()),
                        None => self.clear(&change.id),
                    }
                }
            }
            RecordEvent::Removed(record) => self.clear(record.id()),
            RecordEvent::Reset => self.reset(records),
            RecordEvent::Added(_) => {}
        }
    }
}
