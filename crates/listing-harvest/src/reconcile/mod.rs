//! Reconciliation store: the deduplicated accumulated set.
//!
//! Incoming records are matched on their [`IdentityKey`]. New keys are
//! inserted; existing keys go through [`policy::should_replace`] and, if it
//! says so, [`policy::merge_into`]. The merged set is sorted by name and
//! persisted as a whole before it replaces the in-memory set, so a failed
//! save leaves the store unchanged.

pub mod policy;
pub mod stats;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde::Serialize;
use url::Url;

pub use stats::{ListingStats, UNKNOWN_BUCKET};

use crate::identity::IdentityKey;
use crate::orchestrator::RecordSink;
use crate::storage::{MemoryStorage, RecordStorage};
use crate::types::{AccumulatedRecord, CandidateRecord, HarvestResult};

/// Store shared between the background runner and readers.
pub type SharedStore = Arc<Mutex<ReconciliationStore>>;

/// Source names of seeded demo data.
const SAMPLE_SOURCES: &[&str] = &["sample", "seed"];

/// Website hosts reserved for examples.
const SAMPLE_HOSTS: &[&str] = &["example.com", "example.jp"];

/// What one merge did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MergeSummary {
    pub inserted: usize,
    pub replaced: usize,
    pub skipped: usize,
}

/// Owner of the accumulated set and sole writer to its storage.
pub struct ReconciliationStore {
    records: Vec<AccumulatedRecord>,
    storage: Box<dyn RecordStorage>,
}

impl ReconciliationStore {
    /// Open a store over `storage`, loading whatever it holds.
    pub fn open(storage: impl RecordStorage + 'static) -> HarvestResult<Self> {
        let records = storage.load()?;
        tracing::debug!("loaded {} accumulated record(s)", records.len());
        Ok(Self {
            records,
            storage: Box::new(storage),
        })
    }

    /// Empty store over fresh in-memory storage.
    pub fn in_memory() -> Self {
        Self {
            records: Vec::new(),
            storage: Box::new(MemoryStorage::new()),
        }
    }

    pub fn into_shared(self) -> SharedStore {
        Arc::new(Mutex::new(self))
    }

    /// Snapshot of the accumulated set.
    pub fn records(&self) -> Vec<AccumulatedRecord> {
        self.records.clone()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Merge candidates and return the full accumulated set.
    pub fn merge(&mut self, incoming: &[CandidateRecord]) -> HarvestResult<Vec<AccumulatedRecord>> {
        self.merge_with_summary(incoming)?;
        Ok(self.records())
    }

    /// Merge candidates, reporting what happened.
    pub fn merge_with_summary(&mut self, incoming: &[CandidateRecord]) -> HarvestResult<MergeSummary> {
        self.merge_records(incoming.iter().cloned().map(AccumulatedRecord::from))
    }

    /// Merge already-analyzed records (timestamps and scores attached).
    pub fn merge_records(
        &mut self,
        incoming: impl IntoIterator<Item = AccumulatedRecord>,
    ) -> HarvestResult<MergeSummary> {
        let mut merged = self.records.clone();
        let mut index: HashMap<IdentityKey, usize> = merged
            .iter()
            .enumerate()
            .map(|(i, r)| (IdentityKey::of(&r.record), i))
            .collect();

        let mut summary = MergeSummary::default();
        for record in incoming {
            let key = IdentityKey::of(&record.record);
            match index.get(&key).copied() {
                None => {
                    index.insert(key, merged.len());
                    merged.push(record);
                    summary.inserted += 1;
                }
                Some(i) if policy::should_replace(&merged[i], &record) => {
                    policy::merge_into(&mut merged[i], record);
                    summary.replaced += 1;
                }
                Some(_) => summary.skipped += 1,
            }
        }

        if summary.inserted == 0 && summary.replaced == 0 {
            tracing::debug!("merge changed nothing ({} skipped)", summary.skipped);
            return Ok(summary);
        }

        merged.sort_by(|a, b| a.name().cmp(b.name()));
        self.storage.save(&merged)?;
        self.records = merged;

        tracing::info!(
            "merged: {} inserted, {} replaced, {} skipped ({} total)",
            summary.inserted,
            summary.replaced,
            summary.skipped,
            self.records.len()
        );
        Ok(summary)
    }

    pub fn stats(&self) -> ListingStats {
        ListingStats::from_records(&self.records)
    }

    /// Empty the set and its storage.
    pub fn clear(&mut self) -> HarvestResult<()> {
        self.storage.clear()?;
        self.records.clear();
        Ok(())
    }

    /// Delete records matching `predicate` and return the remainder.
    pub fn remove_where(
        &mut self,
        predicate: impl Fn(&AccumulatedRecord) -> bool,
    ) -> HarvestResult<Vec<AccumulatedRecord>> {
        let remaining: Vec<_> = self
            .records
            .iter()
            .filter(|r| !predicate(r))
            .cloned()
            .collect();
        let removed = self.records.len() - remaining.len();
        if removed > 0 {
            self.storage.save(&remaining)?;
            self.records = remaining;
            tracing::info!("removed {removed} record(s)");
        }
        Ok(self.records())
    }

    /// Delete seeded demo records.
    pub fn remove_sample_records(&mut self) -> HarvestResult<Vec<AccumulatedRecord>> {
        self.remove_where(is_sample_record)
    }
}

/// Demo data: a sample/seed source, or a website on an example domain.
pub fn is_sample_record(record: &AccumulatedRecord) -> bool {
    let r = &record.record;
    if SAMPLE_SOURCES
        .iter()
        .any(|s| r.source_name.eq_ignore_ascii_case(s))
    {
        return true;
    }
    let host = r
        .website
        .as_deref()
        .and_then(|w| Url::parse(w).ok())
        .and_then(|u| u.host_str().map(|h| h.to_ascii_lowercase()));
    host.is_some_and(|h| {
        SAMPLE_HOSTS
            .iter()
            .any(|s| h == *s || h.ends_with(&format!(".{s}")))
    })
}

/// Merges each finished source's batch into the store.
impl RecordSink for Mutex<ReconciliationStore> {
    fn accept(&self, source: &str, records: &[CandidateRecord]) -> HarvestResult<()> {
        let mut store = self.lock().unwrap_or_else(|p| p.into_inner());
        let summary = store.merge_with_summary(records)?;
        tracing::debug!(
            "{source}: {} new, {} updated",
            summary.inserted,
            summary.replaced
        );
        Ok(())
    }
}
