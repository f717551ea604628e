//! Running byte totals across every record, maintained incrementally.

use crate::record::{FileId, FileRecord};
use crate::record_set::{RecordEvent, RecordObserver, RecordSet};
use bridge_traits::TransferProgress;
use std::collections::HashMap;

/// Sum of `progress()` over all records.
///
/// Each record's last contribution is remembered so a change only costs
/// the difference. Records without progress contribute `{0, 0}`.
#[derive(Debug, Default)]
pub struct ProgressAggregator {
    loaded: u64,
    total: u64,
    contributions: HashMap<FileId, TransferProgress>,
}

impl ProgressAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn progress(&self) -> TransferProgress {
        TransferProgress::new(self.loaded, self.total)
    }

    /// Starts tracking a record. A known id is treated as a change.
    pub fn add(&mut self, record: &FileRecord) {
        if self.contributions.contains_key(record.id()) {
            self.change(record);
            return;
        }
        let progress = record.progress().unwrap_or_default();
        self.adjust(TransferProgress::default(), progress);
        self.contributions.insert(record.id().to_string(), progress);
    }

    pub fn remove(&mut self, id: &str) {
        if let Some(old) = self.contributions.remove(id) {
            self.adjust(old, TransferProgress::default());
        }
    }

    pub fn change(&mut self, record: &FileRecord) {
        let new = record.progress().unwrap_or_default();
        let old = self
            .contributions
            .insert(record.id().to_string(), new)
            .unwrap_or_default();
        self.adjust(old, new);
    }

    /// Full recompute.
    pub fn reset<'a, I>(&mut self, records: I)
    where
        I: IntoIterator<Item = &'a FileRecord>,
    {
        self.loaded = 0;
        self.total = 0;
        self.contributions.clear();
        for record in records {
            self.add(record);
        }
    }

    /// Runs a bulk mutation of `records`, then recomputes once.
    ///
    /// Events produced by `f` may still be fanned out afterwards; they are
    /// idempotent against the recomputed state.
    pub fn run_in_batch<F, R>(&mut self, records: &mut RecordSet, f: F) -> R
    where
        F: FnOnce(&mut RecordSet) -> R,
    {
        let result = f(records);
        self.reset(records.iter());
        result
    }

    fn adjust(&mut self, old: TransferProgress, new: TransferProgress) {
        self.loaded = self.loaded.saturating_sub(old.loaded) + new.loaded;
        self.total = self.total.saturating_sub(old.total) + new.total;
    }
}

impl RecordObserver for ProgressAggregator {
    fn on_record_event(&mut self, event: &RecordEvent, records: &RecordSet) {
        match event {
            RecordEvent::Added(ids) => {
                for record in ids.iter().filter_map(|id| records.get(id)) {
                    self.add(record);
                }
            }
            RecordEvent::Changed(change) => {
                if let Some(record) = records.get(&change.id) {
                    self.change(record);
                }
            }
            RecordEvent::Removed(record) => self.remove(record.id()),
            RecordEvent::Reset => self.reset(records.iter()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::{LocalFileHandle, RemoteFileInfo};
    use chrono::{DateTime, Utc};

    fn timestamp() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    fn local(name: &str, size: u64) -> LocalFileHandle {
        LocalFileHandle::new(name, timestamp(), size)
    }

    fn recomputed(records: &RecordSet) -> TransferProgress {
        records
            .iter()
            .filter_map(FileRecord::progress)
            .fold(TransferProgress::default(), |acc, p| {
                TransferProgress::new(acc.loaded + p.loaded, acc.total + p.total)
            })
    }

    fn apply(aggregator: &mut ProgressAggregator, records: &RecordSet, events: Vec<RecordEvent>) {
        for event in &events {
            aggregator.on_record_event(event, records);
        }
    }

    #[test]
    fn test_tracks_add_change_remove() {
        let mut records = RecordSet::new();
        let mut aggregator = ProgressAggregator::new();

        let events = records.add_local_files(vec![local("a.txt", 10), local("b.txt", 5)]);
        apply(&mut aggregator, &records, events);
        assert_eq!(aggregator.progress(), TransferProgress::new(0, 15));

        let events = records
            .update("a.txt", |r| r.update_with_progress(TransferProgress::new(4, 10)))
            .unwrap();
        apply(&mut aggregator, &records, events);
        assert_eq!(aggregator.progress(), TransferProgress::new(4, 15));

        let events = records.remove("a.txt").into_iter().collect();
        apply(&mut aggregator, &records, events);
        assert_eq!(aggregator.progress(), TransferProgress::new(0, 5));
    }

    #[test]
    fn test_matches_recompute_after_mixed_operations() {
        let mut records = RecordSet::new();
        let mut aggregator = ProgressAggregator::new();

        let mut events = records.add_local_files(vec![local("a.txt", 10), local("b.txt", 20)]);
        events.extend(records.add_remote_infos(vec![
            RemoteFileInfo::new("b.txt", timestamp(), 20, 7),
            RemoteFileInfo::new("c.txt", timestamp(), 3, 3),
            RemoteFileInfo::new("a.txt", timestamp(), 99, 0),
        ]));
        events.extend(
            records
                .update("b.txt", |r| r.update_with_progress(TransferProgress::new(15, 20)))
                .unwrap(),
        );
        events.extend(records.remove("c.txt"));
        apply(&mut aggregator, &records, events);

        assert_eq!(aggregator.progress(), recomputed(&records));
        assert_eq!(aggregator.progress(), TransferProgress::new(15, 30));
    }

    #[test]
    fn test_add_is_idempotent() {
        let record = FileRecord::from_local(local("a.txt", 10));
        let mut aggregator = ProgressAggregator::new();

        aggregator.add(&record);
        aggregator.add(&record);
        assert_eq!(aggregator.progress(), TransferProgress::new(0, 10));

        aggregator.remove("a.txt");
        aggregator.remove("a.txt");
        assert_eq!(aggregator.progress(), TransferProgress::default());
    }

    #[test]
    fn test_run_in_batch_recomputes_once() {
        let mut records = RecordSet::new();
        let mut aggregator = ProgressAggregator::new();

        let events = aggregator.run_in_batch(&mut records, |records| {
            records.add_local_files((0..50).map(|i| local(&format!("{i}.bin"), 2)))
        });
        assert_eq!(aggregator.progress(), TransferProgress::new(0, 100));

        // Replaying the batch's events must not double count.
        apply(&mut aggregator, &records, events);
        assert_eq!(aggregator.progress(), TransferProgress::new(0, 100));
    }

    #[test]
    fn test_reset_event_recomputes() {
        let mut records = RecordSet::new();
        let mut aggregator = ProgressAggregator::new();
        let events = records.add_local_files(vec![local("a.txt", 10)]);
        apply(&mut aggregator, &records, events);

        let event = records.reset(Vec::new());
        aggregator.on_record_event(&event, &records);
        assert_eq!(aggregator.progress(), TransferProgress::default());
    }
}
