use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    LowerIsBetter,
    HigherIsBetter,
}

/// Name tokens marking a metric where larger numbers are better.
/// Anything else (times, sizes, memory, counts) is lower-is-better.
const HIGHER_IS_BETTER_TOKENS: &[&str] = &[
    "score",
    "throughput",
    "bandwidth",
    "rate",
    "speedup",
    "hit",
    "hits",
    "ops",
];

impl Direction {
    pub fn from_metric_name(metric: &str) -> Self {
        let lower = metric.to_ascii_lowercase();
        let tokens: Vec<&str> = lower
            .split(|c: char| !c.is_ascii_alphanumeric())
            .filter(|t| !t.is_empty())
            .collect();
        let per_unit_time = tokens
            .windows(2)
            .any(|w| w[0] == "per" && matches!(w[1], "sec" | "second" | "s" | "ms"));
        if per_unit_time || tokens.iter().any(|t| HIGHER_IS_BETTER_TOKENS.contains(t)) {
            Direction::HigherIsBetter
        } else {
            Direction::LowerIsBetter
        }
    }
}

/// A change is noise when `|new - old| <= max(absolute, relative * |old|)`.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Tolerance {
    pub relative: f64,
    pub absolute: f64,
}

impl Default for Tolerance {
    fn default() -> Self {
        Self {
            relative: 0.01,
            absolute: 0.0,
        }
    }
}

impl Tolerance {
    pub fn exact() -> Self {
        Self {
            relative: 0.0,
            absolute: 0.0,
        }
    }

    pub fn is_within(&self, old: f64, new: f64) -> bool {
        let allowed = self.absolute.max(self.relative * old.abs());
        (new - old).abs() <= allowed
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct MetricPolicy {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direction: Option<Direction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tolerance: Option<Tolerance>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct ReconcilePolicy {
    #[serde(default)]
    pub default_tolerance: Tolerance,
    #[serde(default)]
    pub metrics: BTreeMap<String, MetricPolicy>,
}

impl ReconcilePolicy {
    pub fn with_metric(mut self, metric: impl Into<String>, policy: MetricPolicy) -> Self {
        self.metrics.insert(metric.into(), policy);
        self
    }

    pub fn direction_for(&self, metric: &str) -> Direction {
        self.metrics
            .get(metric)
            .and_then(|p| p.direction)
            .unwrap_or_else(|| Direction::from_metric_name(metric))
    }

    pub fn tolerance_for(&self, metric: &str) -> Tolerance {
        self.metrics
            .get(metric)
            .and_then(|p| p.tolerance)
            .unwrap_or(self.default_tolerance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn naming_convention() {
        assert_eq!(Direction::from_metric_name("exec_time"), Direction::LowerIsBetter);
        assert_eq!(Direction::from_metric_name("code_size"), Direction::LowerIsBetter);
        assert_eq!(Direction::from_metric_name("Score"), Direction::HigherIsBetter);
        assert_eq!(Direction::from_metric_name("requests_per_sec"), Direction::HigherIsBetter);
        assert_eq!(Direction::from_metric_name("cache.hit.rate"), Direction::HigherIsBetter);
        assert_eq!(Direction::from_metric_name("iterate_time"), Direction::LowerIsBetter);
    }

    #[test]
    fn tolerance_is_max_of_relative_and_absolute() {
        let t = Tolerance { relative: 0.05, absolute: 0.2 };
        assert!(t.is_within(10.0, 10.4));
        assert!(!t.is_within(10.0, 10.6));
        assert!(t.is_within(1.0, 1.15));
        assert!(!t.is_within(1.0, 1.3));
        assert!(Tolerance::exact().is_within(3.0, 3.0));
        assert!(!Tolerance::exact().is_within(3.0, 3.0001));
    }

    #[test]
    fn per_metric_overrides() {
        let policy = ReconcilePolicy::default().with_metric(
            "exec_time",
            MetricPolicy {
                direction: Some(Direction::HigherIsBetter),
                tolerance: Some(Tolerance::exact()),
            },
        );
        assert_eq!(policy.direction_for("exec_time"), Direction::HigherIsBetter);
        assert_eq!(policy.tolerance_for("exec_time"), Tolerance::exact());
        assert_eq!(policy.direction_for("compile_time"), Direction::LowerIsBetter);
        assert_eq!(policy.tolerance_for("compile_time"), Tolerance::default());
    }
}
