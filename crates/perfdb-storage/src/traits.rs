use perfdb_core::{Fingerprint, HistoryLookup, HistoryRecord, StoreResult, Submission};

/// Outcome of claiming a report fingerprint inside a transaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FingerprintClaim {
    Claimed,
    /// Another report with this fingerprint is already committed.
    AlreadyPresent,
}

/// Outcome of writing one history record inside a transaction.
#[derive(Clone, Debug, PartialEq)]
pub enum RecordWrite {
    Inserted,
    /// A record already sits at the same key; it is returned as stored.
    Kept(HistoryRecord),
}

pub trait Store: HistoryLookup + Send + Sync {
    fn lookup_fingerprint(&self, fingerprint: &Fingerprint) -> StoreResult<Option<Submission>>;

    /// Start an atomic unit of work.
    ///
    /// Writers are serialized: a second `begin` waits (or fails with
    /// `StoreError::Conflict` once the backend gives up) until the open
    /// transaction is committed, rolled back or dropped. This holds for
    /// commits with different fingerprints too.
    fn begin(&self) -> StoreResult<Box<dyn StoreTransaction + '_>>;
}

/// Dropping a transaction without calling `commit` discards its writes.
pub trait StoreTransaction {
    fn claim_fingerprint(&mut self, submission: &Submission) -> StoreResult<FingerprintClaim>;

    /// Insert one history record. An existing record at the same
    /// (machine, test, metric, order) key is left untouched and returned.
    fn write_record(&mut self, record: &HistoryRecord) -> StoreResult<RecordWrite>;

    fn commit(self: Box<Self>) -> StoreResult<()>;
    fn rollback(self: Box<Self>) -> StoreResult<()>;
}
