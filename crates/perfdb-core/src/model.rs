use std::collections::BTreeMap;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{Fingerprint, FormatTag, OrderKey};
use crate::policy::Direction;

/// Metric name used for tests that report a status but no measurements.
pub const STATUS_METRIC: &str = "status";

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum SampleStatus {
    Pass,
    Fail,
    Unsupported,
}

impl SampleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SampleStatus::Pass => "pass",
            SampleStatus::Fail => "fail",
            SampleStatus::Unsupported => "unsupported",
        }
    }

    pub fn from_name(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pass" => Some(SampleStatus::Pass),
            "fail" => Some(SampleStatus::Fail),
            "unsupported" => Some(SampleStatus::Unsupported),
            _ => None,
        }
    }

    pub fn is_pass(&self) -> bool {
        matches!(self, SampleStatus::Pass)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum SampleValue {
    Scalar(f64),
    Multi(Vec<f64>),
}

impl SampleValue {
    pub fn values(&self) -> &[f64] {
        match self {
            SampleValue::Scalar(v) => std::slice::from_ref(v),
            SampleValue::Multi(vs) => vs,
        }
    }

    /// Best observation for the metric's direction; `None` for an empty list.
    pub fn best(&self, direction: Direction) -> Option<f64> {
        let mut it = self.values().iter().copied();
        let first = it.next()?;
        Some(it.fold(first, |acc, v| match direction {
            Direction::LowerIsBetter => acc.min(v),
            Direction::HigherIsBetter => acc.max(v),
        }))
    }
}

/// Two identities are equal iff the name and every parameter match.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MachineIdentity {
    pub name: String,
    #[serde(default)]
    pub parameters: BTreeMap<String, String>,
}

impl MachineIdentity {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parameters: BTreeMap::new(),
        }
    }

    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct RunInfo {
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub order: Option<OrderKey>,
    pub revision: Option<String>,
}

impl RunInfo {
    /// Explicit order key, falling back to the start time.
    pub fn order_key(&self) -> Option<OrderKey> {
        self.order.clone().or_else(|| {
            self.start_time
                .map(|t| OrderKey::from_str(t.to_rfc3339_opts(SecondsFormat::Secs, true)))
        })
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Sample {
    pub test: String,
    pub metric: String,
    pub value: Option<SampleValue>,
    pub status: SampleStatus,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Report {
    pub format: FormatTag,
    pub machine: MachineIdentity,
    pub run: RunInfo,
    pub samples: Vec<Sample>,
}

/// A persisted prior measurement for one (machine, test, metric) triple.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct HistoryRecord {
    pub machine: MachineIdentity,
    pub test: String,
    pub metric: String,
    pub order: OrderKey,
    pub status: SampleStatus,
    pub value: Option<SampleValue>,
}

impl HistoryRecord {
    pub fn from_sample(machine: &MachineIdentity, order: &OrderKey, sample: &Sample) -> Self {
        Self {
            machine: machine.clone(),
            test: sample.test.clone(),
            metric: sample.metric.clone(),
            order: order.clone(),
            status: sample.status,
            value: sample.value.clone(),
        }
    }
}

/// The persisted marker of a committed report, keyed by its fingerprint.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Submission {
    pub fingerprint: Fingerprint,
    pub machine: MachineIdentity,
    pub order: Option<OrderKey>,
    pub sample_count: usize,
    pub imported_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn best_value_follows_direction() {
        let v = SampleValue::Multi(vec![3.0, 1.0, 2.0]);
        assert_eq!(v.best(Direction::LowerIsBetter), Some(1.0));
        assert_eq!(v.best(Direction::HigherIsBetter), Some(3.0));
        assert_eq!(SampleValue::Multi(vec![]).best(Direction::LowerIsBetter), None);
        assert_eq!(SampleValue::Scalar(4.5).best(Direction::HigherIsBetter), Some(4.5));
    }

    #[test]
    fn machine_identity_ignores_parameter_insertion_order() {
        let a = MachineIdentity::new("m").with_parameter("os", "linux").with_parameter("cpu", "x86");
        let b = MachineIdentity::new("m").with_parameter("cpu", "x86").with_parameter("os", "linux");
        assert_eq!(a, b);
        assert_ne!(a, MachineIdentity::new("m").with_parameter("os", "linux"));
    }

    #[test]
    fn order_key_falls_back_to_start_time() {
        let run = RunInfo {
            start_time: Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).single(),
            ..RunInfo::default()
        };
        assert_eq!(run.order_key(), Some(OrderKey::from_str("2026-03-01T12:00:00Z")));

        let run = RunInfo {
            order: Some(OrderKey::from_str("42")),
            ..run
        };
        assert_eq!(run.order_key(), Some(OrderKey::from_str("42")));
    }

    #[test]
    fn status_names() {
        assert_eq!(SampleStatus::from_name("PASS"), Some(SampleStatus::Pass));
        assert_eq!(SampleStatus::from_name("unsupported"), Some(SampleStatus::Unsupported));
        assert_eq!(SampleStatus::from_name("flaky"), None);
    }
}
