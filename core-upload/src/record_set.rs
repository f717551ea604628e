//! # Record Set
//!
//! All file records of one mass upload, keyed by id and iterated in
//! insertion order. The set owns the [`PriorityQueue`] and the set of
//! conflicted ids, and keeps both in lockstep with every mutation.
//!
//! Mutations return the [`RecordEvent`]s they caused; the orchestrator fans
//! them out to its observers and to the event bus.

use crate::priority_queue::{Bucket, PriorityQueue};
use crate::record::{FileId, FileRecord, RecordChange};
use bridge_traits::{LocalFileHandle, RemoteFileInfo};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

/// A change to the record set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordEvent {
    /// New records, in insertion order
    Added(Vec<FileId>),
    Changed(RecordChange),
    Removed(FileRecord),
    /// The whole set was replaced
    Reset,
}

/// Something that keeps derived state in step with a [`RecordSet`].
///
/// Observers receive each event after the set has applied it, so `records`
/// already reflects the change.
pub trait RecordObserver {
    fn on_record_event(&mut self, event: &RecordEvent, records: &RecordSet);
}

#[derive(Debug)]
struct Entry {
    seq: u64,
    record: FileRecord,
}

#[derive(Debug, Default)]
pub struct RecordSet {
    records: HashMap<FileId, Entry>,
    order: BTreeMap<u64, FileId>,
    next_seq: u64,
    conflicted: BTreeSet<FileId>,
    queue: PriorityQueue,
}

impl RecordSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&FileRecord> {
        self.records.get(id).map(|entry| &entry.record)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.records.contains_key(id)
    }

    /// Records in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &FileRecord> {
        self.order
            .values()
            .filter_map(|id| self.records.get(id).map(|entry| &entry.record))
    }

    pub fn ids(&self) -> Vec<FileId> {
        self.order.values().cloned().collect()
    }

    /// Highest-priority schedulable record.
    pub fn next(&self) -> Option<&FileRecord> {
        self.queue.next().and_then(|id| self.get(id))
    }

    pub fn bucket_of(&self, id: &str) -> Bucket {
        self.queue.bucket_of(id)
    }

    pub fn queue(&self) -> &PriorityQueue {
        &self.queue
    }

    pub fn has_conflicts(&self) -> bool {
        !self.conflicted.is_empty()
    }

    /// Ids of records whose local and remote data disagree, sorted.
    pub fn conflicted_ids(&self) -> impl Iterator<Item = &FileId> {
        self.conflicted.iter()
    }

    /// Merges local selections. Existing ids take the new handle; new ids
    /// become records reported in one `Added` event.
    pub fn add_local_files<I>(&mut self, handles: I) -> Vec<RecordEvent>
    where
        I: IntoIterator<Item = LocalFileHandle>,
    {
        self.add_with_merge(
            handles.into_iter().map(FileRecord::from_local).collect(),
            |existing, incoming| {
                incoming
                    .local_handle()
                    .cloned()
                    .and_then(|handle| existing.set_local_handle(handle))
            },
        )
    }

    /// Merges remote listings, same rules as [`add_local_files`](Self::add_local_files).
    pub fn add_remote_infos<I>(&mut self, infos: I) -> Vec<RecordEvent>
    where
        I: IntoIterator<Item = RemoteFileInfo>,
    {
        self.add_with_merge(
            infos.into_iter().map(FileRecord::from_remote).collect(),
            |existing, incoming| {
                incoming
                    .remote_info()
                    .cloned()
                    .and_then(|info| existing.update_with_remote_info(info))
            },
        )
    }

    fn add_with_merge<F>(&mut self, incoming: Vec<FileRecord>, merge: F) -> Vec<RecordEvent>
    where
        F: Fn(&mut FileRecord, &FileRecord) -> Option<RecordChange>,
    {
        let mut events = Vec::new();
        let mut added = Vec::new();
        let mut added_ids = HashSet::new();

        for record in incoming {
            let id = record.id().to_string();
            if self.records.contains_key(&id) {
                let change = self.mutate(&id, |existing| merge(existing, &record)).flatten();
                // Records created earlier in this batch are announced by `Added`.
                if !added_ids.contains(&id) {
                    events.extend(change.into_iter().map(RecordEvent::Changed));
                }
            } else {
                self.insert(record);
                added_ids.insert(id.clone());
                added.push(id);
            }
        }

        if !added.is_empty() {
            events.push(RecordEvent::Added(added));
        }
        events
    }

    /// Applies `f` to the record and re-files it.
    ///
    /// Returns `None` if the id is unknown.
    pub fn update<F, R>(&mut self, id: &str, f: F) -> Option<Vec<RecordEvent>>
    where
        F: FnOnce(&mut FileRecord) -> R,
        R: IntoIterator<Item = RecordChange>,
    {
        let changes = self.mutate(id, |record| f(record).into_iter().collect::<Vec<_>>())?;
        Some(changes.into_iter().map(RecordEvent::Changed).collect())
    }

    pub fn remove(&mut self, id: &str) -> Option<RecordEvent> {
        let entry = self.records.remove(id)?;
        self.order.remove(&entry.seq);
        self.queue.remove(id);
        self.conflicted.remove(id);
        Some(RecordEvent::Removed(entry.record))
    }

    /// Replaces every record. Later duplicates of an id win.
    pub fn reset<I>(&mut self, records: I) -> RecordEvent
    where
        I: IntoIterator<Item = FileRecord>,
    {
        self.records.clear();
        self.order.clear();
        self.conflicted.clear();
        self.queue.clear();

        for record in records {
            self.remove(&record.id().to_string());
            self.insert(record);
        }
        RecordEvent::Reset
    }

    fn insert(&mut self, record: FileRecord) {
        let seq = self.next_seq;
        self.next_seq += 1;

        let id = record.id().to_string();
        self.queue.refile(seq, &record);
        if record.has_conflict() {
            self.conflicted.insert(id.clone());
        }
        self.order.insert(seq, id.clone());
        self.records.insert(id, Entry { seq, record });
    }

    fn mutate<T>(&mut self, id: &str, f: impl FnOnce(&mut FileRecord) -> T) -> Option<T> {
        let entry = self.records.get_mut(id)?;
        let result = f(&mut entry.record);

        self.queue.refile(entry.seq, &entry.record);
        if entry.record.has_conflict() {
            self.conflicted.insert(id.to_string());
        } else {
            self.conflicted.remove(id);
        }
        Some(result)
    }
}
