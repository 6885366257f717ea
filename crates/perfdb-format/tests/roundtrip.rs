use std::collections::BTreeMap;

use chrono::{TimeZone, Utc};
use proptest::prelude::*;

use perfdb_core::{
    FormatTag, MachineIdentity, OrderKey, Report, RunInfo, Sample, SampleStatus, SampleValue, STATUS_METRIC,
};
use perfdb_format::{decode, encode, fingerprint, DecodeError};

fn name() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_.-]{0,11}"
}

fn status() -> impl Strategy<Value = SampleStatus> {
    prop_oneof![
        Just(SampleStatus::Pass),
        Just(SampleStatus::Fail),
        Just(SampleStatus::Unsupported),
    ]
}

fn value() -> impl Strategy<Value = SampleValue> {
    prop_oneof![
        (-1.0e9f64..1.0e9).prop_map(SampleValue::Scalar),
        prop::collection::vec(-1.0e9f64..1.0e9, 1..5).prop_map(SampleValue::Multi),
    ]
}

/// One test entry: either status-only or a set of distinct metrics.
fn test_entry() -> impl Strategy<Value = Vec<Sample>> {
    let metrics = prop::collection::btree_map(name(), value(), 0..4);
    (name(), status(), metrics).prop_map(|(test, status, metrics)| {
        if metrics.is_empty() {
            return vec![Sample {
                test,
                metric: STATUS_METRIC.to_string(),
                value: None,
                status,
            }];
        }
        metrics
            .into_iter()
            .map(|(metric, v)| Sample {
                test: test.clone(),
                metric,
                value: Some(v),
                status,
            })
            .collect()
    })
}

fn report(format: FormatTag) -> impl Strategy<Value = Report> {
    let params = prop::collection::btree_map(name(), "[ -~]{0,8}", 0..4);
    let times = prop::option::of((0i64..2_000_000_000, 0i64..100_000));
    (
        name(),
        params,
        times,
        prop::option::of("[0-9]{1,6}"),
        prop::option::of("[a-f0-9]{7}"),
        prop::collection::vec(test_entry(), 0..5),
    )
        .prop_map(move |(machine, parameters, times, order, revision, tests)| Report {
            format: format.clone(),
            machine: MachineIdentity { name: machine, parameters },
            run: RunInfo {
                start_time: times.and_then(|(s, _)| Utc.timestamp_opt(s, 0).single()),
                end_time: times.and_then(|(s, d)| Utc.timestamp_opt(s + d, 0).single()),
                order: order.map(OrderKey::from_str),
                revision,
            },
            samples: tests.into_iter().flatten().collect(),
        })
}

proptest! {
    #[test]
    fn json_round_trip(r in report(FormatTag::json())) {
        let bytes = encode(&r, &FormatTag::json()).unwrap();
        let back = decode(&bytes, &FormatTag::json()).unwrap();
        prop_assert_eq!(back, r);
    }

    #[test]
    fn yaml_round_trip(r in report(FormatTag::yaml())) {
        let bytes = encode(&r, &FormatTag::yaml()).unwrap();
        let back = decode(&bytes, &FormatTag::yaml()).unwrap();
        prop_assert_eq!(back, r);
    }

    #[test]
    fn fingerprint_survives_format_change(r in report(FormatTag::json())) {
        let yaml = encode(&r, &FormatTag::yaml()).unwrap();
        let back = decode(&yaml, &FormatTag::yaml()).unwrap();
        prop_assert_eq!(fingerprint(&back), fingerprint(&r));
    }
}

#[test]
fn unknown_format_tag_is_rejected() {
    let err = decode(b"{}", &FormatTag::from_str("xml")).unwrap_err();
    assert_eq!(err, DecodeError::UnknownFormat("xml".into()));
}

#[test]
fn parameters_without_entries_round_trip() {
    let r = Report {
        format: FormatTag::json(),
        machine: MachineIdentity { name: "m".into(), parameters: BTreeMap::new() },
        run: RunInfo::default(),
        samples: vec![],
    };
    let back = decode(&encode(&r, &FormatTag::json()).unwrap(), &FormatTag::json()).unwrap();
    assert_eq!(back, r);
}

#[test]
fn json_keeps_every_bit_of_a_float() {
    let r = Report {
        format: FormatTag::json(),
        machine: MachineIdentity::new("M1"),
        run: RunInfo {
            order: Some(OrderKey::from_str("1")),
            ..RunInfo::default()
        },
        samples: vec![Sample {
            test: "t1".into(),
            metric: "exec_time".into(),
            value: Some(SampleValue::Scalar(-1375510.1832079845)),
            status: SampleStatus::Pass,
        }],
    };
    let back = decode(&encode(&r, &FormatTag::json()).unwrap(), &FormatTag::json()).unwrap();
    assert_eq!(back.samples[0].value, Some(SampleValue::Scalar(-1375510.1832079845)));
    assert_eq!(back, r);
}
