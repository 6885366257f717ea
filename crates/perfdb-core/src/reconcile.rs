use crate::errors::StoreResult;
use crate::ids::OrderKey;
use crate::model::{HistoryRecord, MachineIdentity, Report, Sample, SampleStatus};
use crate::outcomes::{Classification, ReconciliationEntry};
use crate::policy::{Direction, ReconcilePolicy};

/// Read side of the store, all reconciliation needs.
pub trait HistoryLookup {
    /// Records for one (machine, test, metric) triple, ordered by order key.
    fn lookup_history(
        &self,
        machine: &MachineIdentity,
        test: &str,
        metric: &str,
    ) -> StoreResult<Vec<HistoryRecord>>;
}

/// Classify every sample of `report` against stored history. Never writes.
pub fn reconcile<H: HistoryLookup + ?Sized>(
    report: &Report,
    history: &H,
    policy: &ReconcilePolicy,
) -> StoreResult<Vec<ReconciliationEntry>> {
    let order = report.run.order_key();
    let mut entries = Vec::with_capacity(report.samples.len());
    for sample in &report.samples {
        let records = history.lookup_history(&report.machine, &sample.test, &sample.metric)?;
        let (prior, same_order) = select_prior(&records, order.as_ref());
        entries.push(classify(sample, prior, same_order, policy));
    }
    Ok(entries)
}

/// Pick the record the incoming sample is compared with: an existing record at
/// the same order key wins, otherwise the latest strictly earlier one.
pub fn select_prior<'a>(
    records: &'a [HistoryRecord],
    order: Option<&OrderKey>,
) -> (Option<&'a HistoryRecord>, bool) {
    if let Some(order) = order {
        if let Some(same) = records.iter().find(|r| &r.order == order) {
            return (Some(same), true);
        }
    }
    let prior = records
        .iter()
        .filter(|r| order.map_or(true, |o| r.order < *o))
        .max_by(|a, b| a.order.cmp(&b.order));
    (prior, false)
}

pub fn classify(
    sample: &Sample,
    prior: Option<&HistoryRecord>,
    same_order: bool,
    policy: &ReconcilePolicy,
) -> ReconciliationEntry {
    let direction = policy.direction_for(&sample.metric);
    let new_value = sample.value.as_ref().and_then(|v| v.best(direction));
    let old_value = prior
        .and_then(|p| p.value.as_ref())
        .and_then(|v| v.best(direction));

    let classification = match prior {
        _ if sample.status != SampleStatus::Pass => Classification::Error,
        None => Classification::New,
        Some(_) if same_order => Classification::Unchanged,
        Some(p) => match (&sample.value, new_value) {
            (None, _) if p.status.is_pass() => Classification::Unchanged,
            (None, _) => Classification::Improved,
            // A present but empty list carries nothing to compare.
            (Some(_), None) => Classification::Error,
            (Some(_), Some(new)) => match old_value {
                Some(old) if p.status.is_pass() => compare(old, new, direction, policy, &sample.metric),
                _ => Classification::Improved,
            },
        },
    };

    ReconciliationEntry {
        test: sample.test.clone(),
        metric: sample.metric.clone(),
        classification,
        old_value,
        new_value,
        prior_order: prior.map(|p| p.order.clone()),
        same_order,
    }
}

fn compare(
    old: f64,
    new: f64,
    direction: Direction,
    policy: &ReconcilePolicy,
    metric: &str,
) -> Classification {
    if policy.tolerance_for(metric).is_within(old, new) {
        return Classification::Unchanged;
    }
    let worse = match direction {
        Direction::LowerIsBetter => new > old,
        Direction::HigherIsBetter => new < old,
    };
    if worse {
        Classification::Regressed
    } else {
        Classification::Improved
    }
}
