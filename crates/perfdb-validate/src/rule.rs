use std::collections::HashSet;

use perfdb_core::{Report, Sample};

use crate::types::{Finding, Severity, ValidationCategory};

pub trait Rule: Send + Sync {
    fn id(&self) -> &str;
    fn category(&self) -> ValidationCategory;
    fn eval(&self, report: &Report) -> Vec<Finding>;

    fn finding(&self, severity: Severity, field: impl Into<String>, message: impl Into<String>) -> Finding
    where
        Self: Sized,
    {
        Finding {
            rule_id: self.id().to_string(),
            category: self.category(),
            severity,
            field: field.into(),
            message: message.into(),
        }
    }
}

/// `test/metric`, or the sample's position when a name is missing.
pub fn sample_field(index: usize, sample: &Sample) -> String {
    if sample.test.trim().is_empty() || sample.metric.trim().is_empty() {
        format!("samples[{index}]")
    } else {
        format!("{}/{}", sample.test, sample.metric)
    }
}

pub struct MachineNameRule;

impl Rule for MachineNameRule {
    fn id(&self) -> &str {
        "machine_name"
    }

    fn category(&self) -> ValidationCategory {
        ValidationCategory::Machine
    }

    fn eval(&self, report: &Report) -> Vec<Finding> {
        if report.machine.name.trim().is_empty() {
            return vec![self.finding(Severity::Fail, "machine.name", "machine name is empty")];
        }
        vec![]
    }
}

pub struct RunTimesRule;

impl Rule for RunTimesRule {
    fn id(&self) -> &str {
        "run_times"
    }

    fn category(&self) -> ValidationCategory {
        ValidationCategory::Run
    }

    fn eval(&self, report: &Report) -> Vec<Finding> {
        match (report.run.start_time, report.run.end_time) {
            (Some(start), Some(end)) if start > end => vec![self.finding(
                Severity::Fail,
                "run.end_time",
                format!("run ends ({end}) before it starts ({start})"),
            )],
            _ => vec![],
        }
    }
}

pub struct RunOrderRule;

impl Rule for RunOrderRule {
    fn id(&self) -> &str {
        "run_order"
    }

    fn category(&self) -> ValidationCategory {
        ValidationCategory::Run
    }

    fn eval(&self, report: &Report) -> Vec<Finding> {
        match report.run.order_key() {
            None => vec![self.finding(
                Severity::Fail,
                "run.order",
                "run has neither an order key nor a start time to order it by",
            )],
            Some(key) if key.as_str().trim().is_empty() => {
                vec![self.finding(Severity::Fail, "run.order", "run order key is empty")]
            }
            Some(_) => vec![],
        }
    }
}

pub struct SampleNamesRule;

impl Rule for SampleNamesRule {
    fn id(&self) -> &str {
        "sample_names"
    }

    fn category(&self) -> ValidationCategory {
        ValidationCategory::Sample
    }

    fn eval(&self, report: &Report) -> Vec<Finding> {
        let mut out = vec![];
        for (i, s) in report.samples.iter().enumerate() {
            if s.test.trim().is_empty() {
                out.push(self.finding(Severity::Fail, format!("samples[{i}].test"), "test name is empty"));
            }
            if s.metric.trim().is_empty() {
                out.push(self.finding(Severity::Fail, format!("samples[{i}].metric"), "metric name is empty"));
            }
        }
        out
    }
}

pub struct FiniteValuesRule;

impl Rule for FiniteValuesRule {
    fn id(&self) -> &str {
        "finite_values"
    }

    fn category(&self) -> ValidationCategory {
        ValidationCategory::Sample
    }

    fn eval(&self, report: &Report) -> Vec<Finding> {
        let mut out = vec![];
        for (i, s) in report.samples.iter().enumerate() {
            let Some(value) = &s.value else { continue };
            let bad: Vec<String> = value
                .values()
                .iter()
                .filter(|v| !v.is_finite())
                .map(|v| v.to_string())
                .collect();
            if !bad.is_empty() {
                out.push(self.finding(
                    Severity::Fail,
                    sample_field(i, s),
                    format!("value is not finite ({})", bad.join(", ")),
                ));
            }
        }
        out
    }
}

pub struct NonEmptyValuesRule;

impl Rule for NonEmptyValuesRule {
    fn id(&self) -> &str {
        "non_empty_values"
    }

    fn category(&self) -> ValidationCategory {
        ValidationCategory::Sample
    }

    fn eval(&self, report: &Report) -> Vec<Finding> {
        report
            .samples
            .iter()
            .enumerate()
            .filter(|(_, s)| s.value.as_ref().is_some_and(|v| v.values().is_empty()))
            .map(|(i, s)| self.finding(Severity::Fail, sample_field(i, s), "multi-sample value has no entries"))
            .collect()
    }
}

pub struct DuplicateSampleRule;

impl Rule for DuplicateSampleRule {
    fn id(&self) -> &str {
        "duplicate_sample"
    }

    fn category(&self) -> ValidationCategory {
        ValidationCategory::Sample
    }

    fn eval(&self, report: &Report) -> Vec<Finding> {
        let mut seen = HashSet::new();
        let mut out = vec![];
        for (i, s) in report.samples.iter().enumerate() {
            if !seen.insert((s.test.as_str(), s.metric.as_str())) {
                out.push(self.finding(
                    Severity::Fail,
                    sample_field(i, s),
                    "test/metric pair appears more than once in the report",
                ));
            }
        }
        out
    }
}

pub struct EmptyReportRule;

impl Rule for EmptyReportRule {
    fn id(&self) -> &str {
        "empty_report"
    }

    fn category(&self) -> ValidationCategory {
        ValidationCategory::Sample
    }

    fn eval(&self, report: &Report) -> Vec<Finding> {
        if report.samples.is_empty() {
            return vec![self.finding(Severity::Warn, "tests", "report contains no samples")];
        }
        vec![]
    }
}
