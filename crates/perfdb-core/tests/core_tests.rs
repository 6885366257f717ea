use std::collections::BTreeMap;

use perfdb_core::{
    reconcile, Classification, CommitOutcome, CommitStatus, ErrorKind, Fingerprint, FormatTag, HistoryLookup,
    HistoryRecord, ImportError, MachineIdentity, OrderKey, ReconcilePolicy, Report, RunInfo, Sample, SampleStatus,
    SampleValue, StoreError, StoreResult,
};

struct FixedHistory(Vec<HistoryRecord>);

impl HistoryLookup for FixedHistory {
    fn lookup_history(&self, machine: &MachineIdentity, test: &str, metric: &str) -> StoreResult<Vec<HistoryRecord>> {
        Ok(self
            .0
            .iter()
            .filter(|r| &r.machine == machine && r.test == test && r.metric == metric)
            .cloned()
            .collect())
    }
}

struct BrokenHistory;

impl HistoryLookup for BrokenHistory {
    fn lookup_history(&self, _: &MachineIdentity, _: &str, _: &str) -> StoreResult<Vec<HistoryRecord>> {
        Err(StoreError::Unavailable("disk gone".into()))
    }
}

fn report(order: &str, samples: Vec<(&str, &str, f64)>) -> Report {
    Report {
        format: FormatTag::json(),
        machine: MachineIdentity::new("M1").with_parameter("os", "linux"),
        run: RunInfo {
            order: Some(OrderKey::from_str(order)),
            ..RunInfo::default()
        },
        samples: samples
            .into_iter()
            .map(|(test, metric, v)| Sample {
                test: test.into(),
                metric: metric.into(),
                value: Some(SampleValue::Scalar(v)),
                status: SampleStatus::Pass,
            })
            .collect(),
    }
}

fn stored(machine: MachineIdentity, test: &str, metric: &str, order: &str, v: f64) -> HistoryRecord {
    HistoryRecord {
        machine,
        test: test.into(),
        metric: metric.into(),
        order: OrderKey::from_str(order),
        status: SampleStatus::Pass,
        value: Some(SampleValue::Scalar(v)),
    }
}

#[test]
fn test_reconcile_empty_history_is_all_new() {
    let r = report("1", vec![("t1", "exec_time", 10.0), ("t2", "exec_time", 3.0)]);
    let entries = reconcile(&r, &FixedHistory(vec![]), &ReconcilePolicy::default()).unwrap();
    assert_eq!(entries.len(), 2);
    assert!(entries.iter().all(|e| e.classification == Classification::New));
}

#[test]
fn test_reconcile_uses_latest_earlier_record() {
    let m = MachineIdentity::new("M1").with_parameter("os", "linux");
    let history = FixedHistory(vec![
        stored(m.clone(), "t1", "exec_time", "1", 20.0),
        stored(m.clone(), "t1", "exec_time", "2", 10.0),
        stored(m, "t1", "exec_time", "9", 1.0),
    ]);
    let r = report("3", vec![("t1", "exec_time", 12.0)]);
    let entries = reconcile(&r, &history, &ReconcilePolicy::default()).unwrap();
    assert_eq!(entries[0].classification, Classification::Regressed);
    assert_eq!(entries[0].old_value, Some(10.0));
    assert_eq!(entries[0].prior_order, Some(OrderKey::from_str("2")));
}

#[test]
fn test_reconcile_other_machine_parameters_do_not_match() {
    let other = MachineIdentity::new("M1").with_parameter("os", "darwin");
    let history = FixedHistory(vec![stored(other, "t1", "exec_time", "1", 10.0)]);
    let r = report("2", vec![("t1", "exec_time", 12.0)]);
    let entries = reconcile(&r, &history, &ReconcilePolicy::default()).unwrap();
    assert_eq!(entries[0].classification, Classification::New);
}

#[test]
fn test_reconcile_propagates_store_errors() {
    let r = report("1", vec![("t1", "exec_time", 10.0)]);
    let err = reconcile(&r, &BrokenHistory, &ReconcilePolicy::default()).unwrap_err();
    assert!(err.is_fatal());
}

#[test]
fn test_reconcile_preserves_sample_order() {
    let r = report("1", vec![("b", "m", 1.0), ("a", "m", 1.0), ("c", "m", 1.0)]);
    let entries = reconcile(&r, &FixedHistory(vec![]), &ReconcilePolicy::default()).unwrap();
    let tests: Vec<_> = entries.iter().map(|e| e.test.as_str()).collect();
    assert_eq!(tests, vec!["b", "a", "c"]);
}

#[test]
fn test_outcome_counts() {
    let r = report("1", vec![("t1", "exec_time", 10.0)]);
    let entries = reconcile(&r, &FixedHistory(vec![]), &ReconcilePolicy::default()).unwrap();
    let outcome = CommitOutcome {
        report_id: Fingerprint::from_str("ab"),
        machine: Some("M1".into()),
        order: Some(OrderKey::from_str("1")),
        status: CommitStatus::Committed,
        entries,
        errors: vec![],
        warnings: vec![],
    };
    assert_eq!(outcome.count(Classification::New), 1);
    assert_eq!(outcome.count(Classification::Regressed), 0);
    assert!(!outcome.is_rejected());
}

#[test]
fn test_rejected_outcome_carries_errors() {
    let outcome = CommitOutcome::rejected(
        Fingerprint::from_str("ab"),
        vec![ImportError::new(ErrorKind::Decode, Some("machine".into()), "missing key")],
    );
    assert!(outcome.is_rejected());
    assert!(outcome.entries.is_empty());
    assert_eq!(outcome.errors[0].field.as_deref(), Some("machine"));
}

#[test]
fn test_metric_entry_without_overrides_uses_defaults() {
    let mut metrics = BTreeMap::new();
    metrics.insert("exec_time".to_string(), perfdb_core::MetricPolicy::default());
    let policy = ReconcilePolicy {
        metrics,
        ..ReconcilePolicy::default()
    };
    assert_eq!(policy.direction_for("exec_time"), perfdb_core::Direction::LowerIsBetter);
    assert_eq!(policy.tolerance_for("exec_time"), policy.default_tolerance);
}
