use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use perfdb_core::{
    Fingerprint, HistoryLookup, HistoryRecord, MachineIdentity, OrderKey, StoreError, StoreResult, Submission,
};

use crate::traits::{FingerprintClaim, RecordWrite, Store, StoreTransaction};

type SeriesKey = (MachineIdentity, String, String);

/// In-memory store for tests and dry runs. Not durable.
#[derive(Default)]
pub struct InMemoryStore {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    series: HashMap<SeriesKey, BTreeMap<OrderKey, HistoryRecord>>,
    submissions: HashMap<Fingerprint, Submission>,
}

/// Full copy of the store contents in a stable order, for equality checks.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MemorySnapshot {
    pub records: Vec<HistoryRecord>,
    pub submissions: Vec<Submission>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|_| StoreError::Unavailable("in-memory store lock poisoned".into()))
    }

    pub fn snapshot(&self) -> StoreResult<MemorySnapshot> {
        let inner = self.lock()?;
        let mut records: Vec<HistoryRecord> = inner.series.values().flat_map(|s| s.values().cloned()).collect();
        records.sort_by(|a, b| {
            (&a.machine, &a.test, &a.metric, &a.order).cmp(&(&b.machine, &b.test, &b.metric, &b.order))
        });
        let mut submissions: Vec<Submission> = inner.submissions.values().cloned().collect();
        submissions.sort_by(|a, b| a.fingerprint.as_str().cmp(b.fingerprint.as_str()));
        Ok(MemorySnapshot { records, submissions })
    }

    pub fn record_count(&self) -> StoreResult<usize> {
        Ok(self.lock()?.series.values().map(|s| s.len()).sum())
    }
}

impl HistoryLookup for InMemoryStore {
    fn lookup_history(&self, machine: &MachineIdentity, test: &str, metric: &str) -> StoreResult<Vec<HistoryRecord>> {
        let inner = self.lock()?;
        let key = (machine.clone(), test.to_string(), metric.to_string());
        Ok(inner
            .series
            .get(&key)
            .map(|s| s.values().cloned().collect())
            .unwrap_or_default())
    }
}

impl Store for InMemoryStore {
    fn lookup_fingerprint(&self, fingerprint: &Fingerprint) -> StoreResult<Option<Submission>> {
        Ok(self.lock()?.submissions.get(fingerprint).cloned())
    }

    fn begin(&self) -> StoreResult<Box<dyn StoreTransaction + '_>> {
        Ok(Box::new(MemoryTransaction {
            inner: self.lock()?,
            submission: None,
            records: vec![],
        }))
    }
}

/// Holds the store lock for its whole lifetime; writes are staged and only
/// applied on commit.
struct MemoryTransaction<'a> {
    inner: MutexGuard<'a, Inner>,
    submission: Option<Submission>,
    records: Vec<HistoryRecord>,
}

impl StoreTransaction for MemoryTransaction<'_> {
    fn claim_fingerprint(&mut self, submission: &Submission) -> StoreResult<FingerprintClaim> {
        let staged = self
            .submission
            .as_ref()
            .is_some_and(|s| s.fingerprint == submission.fingerprint);
        if staged || self.inner.submissions.contains_key(&submission.fingerprint) {
            return Ok(FingerprintClaim::AlreadyPresent);
        }
        self.submission = Some(submission.clone());
        Ok(FingerprintClaim::Claimed)
    }

    fn write_record(&mut self, record: &HistoryRecord) -> StoreResult<RecordWrite> {
        let same_key = |r: &HistoryRecord| {
            r.machine == record.machine && r.test == record.test && r.metric == record.metric && r.order == record.order
        };
        if let Some(staged) = self.records.iter().find(|r| same_key(r)) {
            return Ok(RecordWrite::Kept(staged.clone()));
        }
        let key = (record.machine.clone(), record.test.clone(), record.metric.clone());
        if let Some(existing) = self.inner.series.get(&key).and_then(|s| s.get(&record.order)) {
            return Ok(RecordWrite::Kept(existing.clone()));
        }
        self.records.push(record.clone());
        Ok(RecordWrite::Inserted)
    }

    fn commit(mut self: Box<Self>) -> StoreResult<()> {
        let records = std::mem::take(&mut self.records);
        for record in records {
            let key = (record.machine.clone(), record.test.clone(), record.metric.clone());
            self.inner
                .series
                .entry(key)
                .or_default()
                .entry(record.order.clone())
                .or_insert(record);
        }
        if let Some(submission) = self.submission.take() {
            self.inner.submissions.insert(submission.fingerprint.clone(), submission);
        }
        Ok(())
    }

    fn rollback(self: Box<Self>) -> StoreResult<()> {
        tracing::debug!(staged = self.records.len(), "discarding in-memory transaction");
        Ok(())
    }
}
