use std::path::Path;

use anyhow::{Context, Result};

use perfdb_core::{reconcile, CommitOutcome, ErrorKind, FormatTag, ImportError, ReconcilePolicy};
use perfdb_format::{fingerprint, fingerprint_bytes, guess_format, FormatRegistry};
use perfdb_storage::Store;
use perfdb_validate::{validate, Finding};

use crate::coordinator::{commit, CommitMode};
use crate::util::read_input;

fn finding_to_error(f: &Finding) -> ImportError {
    ImportError::new(ErrorKind::Validation, Some(f.field.clone()), f.message.clone())
}

/// Decode, validate, reconcile and commit one report.
///
/// Malformed or invalid input comes back as a REJECTED outcome; `Err` means
/// the store itself failed and nothing was written.
pub fn import_and_report(
    store: &dyn Store,
    registry: &FormatRegistry,
    payload: &[u8],
    format: &FormatTag,
    mode: CommitMode,
    policy: &ReconcilePolicy,
) -> Result<CommitOutcome> {
    let report = match registry.decode(payload, format) {
        Ok(report) => report,
        Err(e) => {
            tracing::info!(format = %format, error = %e, "report did not decode");
            return Ok(CommitOutcome::rejected(
                fingerprint_bytes(payload),
                vec![ImportError::new(ErrorKind::Decode, e.field(), e.to_string())],
            ));
        }
    };
    tracing::debug!(
        machine = %report.machine.name,
        format = %report.format,
        samples = report.samples.len(),
        "decoded report"
    );

    let validation = validate(&report);
    let warnings: Vec<ImportError> = validation.warnings().map(finding_to_error).collect();
    if validation.is_rejected() {
        let mut outcome = CommitOutcome::rejected(
            fingerprint(&report),
            validation.failures().map(finding_to_error).collect(),
        );
        outcome.machine = Some(report.machine.name.clone());
        outcome.order = report.run.order_key();
        outcome.warnings = warnings;
        tracing::info!(errors = outcome.errors.len(), "report failed validation");
        return Ok(outcome);
    }

    let entries = reconcile(&report, store, policy).context("look up sample history")?;
    tracing::debug!(entries = entries.len(), "reconciled against history");

    let mut outcome = commit(&report, entries, store, mode, policy).context("commit report")?;
    outcome.warnings.extend(warnings);
    Ok(outcome)
}

/// `format` of `auto` picks by file extension, then tries every decoder.
pub fn import_file(
    store: &dyn Store,
    registry: &FormatRegistry,
    path: &Path,
    format: &FormatTag,
    mode: CommitMode,
    policy: &ReconcilePolicy,
) -> Result<CommitOutcome> {
    let payload = read_input(path)?;
    let format = if format.is_auto() { guess_format(path) } else { format.clone() };
    tracing::info!(file = %path.display(), format = %format, "importing report");
    import_and_report(store, registry, &payload, &format, mode, policy)
}
