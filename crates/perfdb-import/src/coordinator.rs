use chrono::Utc;

use perfdb_core::{
    classify, CommitOutcome, CommitStatus, ErrorKind, HistoryRecord, ImportError, ReconcilePolicy,
    ReconciliationEntry, Report, StoreError, StoreResult, Submission,
};
use perfdb_format::fingerprint;
use perfdb_storage::{FingerprintClaim, RecordWrite, Store, StoreTransaction};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CommitMode {
    #[default]
    Commit,
    /// Duplicate check only; nothing is written.
    DryRun,
}

/// Records at an already occupied key, by sample index.
type Kept = Vec<(usize, HistoryRecord)>;

enum Written {
    Committed(Kept),
    Duplicate,
}

/// Persist a reconciled report atomically.
///
/// A record that another report committed at the same order key after
/// `entries` were computed is kept, and its entry is reclassified against it.
///
/// Duplicate, rejected and simulated results are returned as outcomes. `Err`
/// is reserved for store faults that prevent any decision: unavailable or
/// corrupt storage, failed lookups, and transactions that cannot be opened.
pub fn commit(
    report: &Report,
    entries: Vec<ReconciliationEntry>,
    store: &dyn Store,
    mode: CommitMode,
    policy: &ReconcilePolicy,
) -> StoreResult<CommitOutcome> {
    let report_id = fingerprint(report);
    let order = report.run.order_key();
    let mut outcome = CommitOutcome {
        report_id: report_id.clone(),
        machine: Some(report.machine.name.clone()),
        order: order.clone(),
        status: CommitStatus::Committed,
        entries,
        errors: vec![],
        warnings: vec![],
    };

    if let Some(prior) = store.lookup_fingerprint(&report_id)? {
        tracing::info!(report = %report_id.short(), imported_at = %prior.imported_at, "report already imported");
        outcome.status = CommitStatus::Duplicate;
        return Ok(outcome);
    }

    if mode == CommitMode::DryRun {
        outcome.status = CommitStatus::Simulated;
        return Ok(outcome);
    }

    let Some(order) = order else {
        outcome.status = CommitStatus::Rejected;
        outcome.errors.push(ImportError::new(
            ErrorKind::Validation,
            Some("run.order".into()),
            "run has no order key",
        ));
        return Ok(outcome);
    };

    let records: Vec<(usize, HistoryRecord)> = report
        .samples
        .iter()
        .zip(&outcome.entries)
        .enumerate()
        .filter(|(_, (_, entry))| !entry.same_order)
        .map(|(i, (sample, _))| (i, HistoryRecord::from_sample(&report.machine, &order, sample)))
        .collect();
    let submission = Submission {
        fingerprint: report_id.clone(),
        machine: report.machine.clone(),
        order: Some(order),
        sample_count: report.samples.len(),
        imported_at: Utc::now(),
    };

    let mut result = write_once(store, &submission, &records);
    if let Err(StoreError::Conflict(msg)) = &result {
        tracing::warn!(report = %report_id.short(), error = %msg, "store busy; retrying commit once");
        result = write_once(store, &submission, &records);
    }

    match result {
        Ok(Written::Committed(kept)) => {
            tracing::info!(
                report = %report_id.short(),
                records = records.len() - kept.len(),
                "report committed"
            );
            for (i, existing) in kept {
                let (Some(sample), Some(entry)) = (report.samples.get(i), outcome.entries.get_mut(i)) else {
                    continue;
                };
                tracing::debug!(test = %sample.test, metric = %sample.metric, "kept record committed concurrently");
                *entry = classify(sample, Some(&existing), true, policy);
            }
        }
        Ok(Written::Duplicate) => {
            tracing::info!(report = %report_id.short(), "report committed concurrently by another importer");
            outcome.status = CommitStatus::Duplicate;
        }
        Err(e) if e.is_fatal() => return Err(e),
        Err(e) => {
            tracing::warn!(report = %report_id.short(), error = %e, "commit rolled back");
            outcome.status = CommitStatus::Rejected;
            outcome.errors.push(ImportError::new(ErrorKind::Store, None, e.to_string()));
        }
    }
    Ok(outcome)
}

fn write_once(store: &dyn Store, submission: &Submission, records: &[(usize, HistoryRecord)]) -> StoreResult<Written> {
    let mut tx = store.begin().map_err(|e| match e {
        StoreError::Write(msg) => StoreError::Unavailable(format!("begin transaction: {msg}")),
        other => other,
    })?;

    let staged = match stage(&mut *tx, submission, records) {
        Ok(staged) => staged,
        Err(e) => {
            if let Err(rb) = tx.rollback() {
                tracing::warn!(error = %rb, "rollback failed");
            }
            return Err(e);
        }
    };

    let Some(kept) = staged else {
        tx.rollback()?;
        return Ok(Written::Duplicate);
    };
    tx.commit()?;
    Ok(Written::Committed(kept))
}

/// Claim first so a concurrent loser writes nothing. `None` means the
/// fingerprint was already present.
fn stage(
    tx: &mut dyn StoreTransaction,
    submission: &Submission,
    records: &[(usize, HistoryRecord)],
) -> StoreResult<Option<Kept>> {
    if tx.claim_fingerprint(submission)? == FingerprintClaim::AlreadyPresent {
        return Ok(None);
    }
    let mut kept = vec![];
    for (i, record) in records {
        if let RecordWrite::Kept(existing) = tx.write_record(record)? {
            kept.push((*i, existing));
        }
    }
    Ok(Some(kept))
}
