//! # Priority Queue
//!
//! Secondary index over the record set answering "what should run next".
//!
//! ## Classification
//!
//! Each record lands in exactly one [`Bucket`], first matching rule wins:
//!
//! ```text
//! last_error present          → Unscheduled
//! is_deleting                 → Deleting
//! has_conflict                → Unscheduled
//! is_uploading                → Uploading
//! local + remote, loaded<total → Unfinished
//! local only                  → Unstarted
//! otherwise                   → Unscheduled
//! ```
//!
//! Buckets are drained in the order Deleting, Uploading, Unfinished,
//! Unstarted. Within a bucket records keep insertion order.

use crate::record::{FileId, FileRecord};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Bucket {
    Deleting,
    Uploading,
    Unfinished,
    Unstarted,
    /// Errored, conflicted, or nothing left to do
    Unscheduled,
}

impl Bucket {
    /// Schedulable buckets, highest priority first.
    pub const SCHEDULED: [Bucket; 4] = [
        Bucket::Deleting,
        Bucket::Uploading,
        Bucket::Unfinished,
        Bucket::Unstarted,
    ];

    fn slot(self) -> Option<usize> {
        Self::SCHEDULED.iter().position(|bucket| *bucket == self)
    }
}

/// Pure classification of one record.
pub fn classify(record: &FileRecord) -> Bucket {
    if record.last_error().is_some() {
        return Bucket::Unscheduled;
    }
    if record.is_deleting() {
        return Bucket::Deleting;
    }
    if record.has_conflict() {
        return Bucket::Unscheduled;
    }
    if record.is_uploading() {
        return Bucket::Uploading;
    }
    match (record.local_handle(), record.remote_info()) {
        (Some(_), Some(remote)) if remote.loaded_bytes < remote.total_bytes => Bucket::Unfinished,
        (Some(_), None) => Bucket::Unstarted,
        _ => Bucket::Unscheduled,
    }
}

/// Buckets of record ids keyed by insertion sequence.
#[derive(Debug, Default)]
pub struct PriorityQueue {
    buckets: [BTreeMap<u64, FileId>; 4],
    placement: HashMap<FileId, (usize, u64)>,
}

impl PriorityQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Moves the record into the bucket matching its current state.
    ///
    /// `seq` is the record's insertion sequence in the owning set.
    pub fn refile(&mut self, seq: u64, record: &FileRecord) -> Bucket {
        let bucket = classify(record);
        let target = bucket.slot();

        if let Some(&(slot, old_seq)) = self.placement.get(record.id()) {
            if Some(slot) == target && old_seq == seq {
                return bucket;
            }
            self.buckets[slot].remove(&old_seq);
            self.placement.remove(record.id());
        }

        if let Some(slot) = target {
            self.buckets[slot].insert(seq, record.id().to_string());
            self.placement.insert(record.id().to_string(), (slot, seq));
        }
        bucket
    }

    pub fn remove(&mut self, id: &str) {
        if let Some((slot, seq)) = self.placement.remove(id) {
            self.buckets[slot].remove(&seq);
        }
    }

    pub fn clear(&mut self) {
        self.buckets.iter_mut().for_each(BTreeMap::clear);
        self.placement.clear();
    }

    /// Head of the highest-priority non-empty bucket.
    pub fn next(&self) -> Option<&FileId> {
        self.buckets
            .iter()
            .find_map(|bucket| bucket.values().next())
    }

    pub fn bucket_of(&self, id: &str) -> Bucket {
        self.placement
            .get(id)
            .map_or(Bucket::Unscheduled, |&(slot, _)| Bucket::SCHEDULED[slot])
    }

    /// Ids in `bucket`, in insertion order. Empty for `Unscheduled`.
    pub fn ids_in(&self, bucket: Bucket) -> impl Iterator<Item = &FileId> {
        bucket
            .slot()
            .map(|slot| &self.buckets[slot])
            .into_iter()
            .flat_map(|ids| ids.values())
    }

    /// Number of scheduled records.
    pub fn len(&self) -> usize {
        self.placement.len()
    }

    pub fn is_empty(&self) -> bool {
        self.placement.is_empty()
    }
}
