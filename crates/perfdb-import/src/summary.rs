use std::fmt;

use serde::{Deserialize, Serialize};

use perfdb_core::{Classification, CommitOutcome, CommitStatus, ImportError};

/// Human and machine readable result of one import. Also the body a remote
/// server answers a submission with.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ImportSummary {
    pub status: CommitStatus,
    pub report_id: String,
    #[serde(default)]
    pub machine: Option<String>,
    #[serde(default)]
    pub order: Option<String>,
    pub counts: ClassificationCounts,
    #[serde(default)]
    pub errors: Vec<ImportError>,
    #[serde(default)]
    pub warnings: Vec<ImportError>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub samples: Vec<SampleLine>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClassificationCounts {
    pub new: usize,
    pub regressed: usize,
    pub improved: usize,
    pub unchanged: usize,
    pub error: usize,
}

impl ClassificationCounts {
    pub fn get(&self, classification: Classification) -> usize {
        match classification {
            Classification::New => self.new,
            Classification::Regressed => self.regressed,
            Classification::Improved => self.improved,
            Classification::Unchanged => self.unchanged,
            Classification::Error => self.error,
        }
    }

    pub fn total(&self) -> usize {
        Classification::ALL.iter().map(|c| self.get(*c)).sum()
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct SampleLine {
    pub test: String,
    pub metric: String,
    pub classification: Classification,
    pub old_value: Option<f64>,
    pub new_value: Option<f64>,
}

impl ImportSummary {
    pub fn is_rejected(&self) -> bool {
        self.status == CommitStatus::Rejected
    }
}

pub fn render(outcome: &CommitOutcome, verbose: bool) -> ImportSummary {
    let counts = ClassificationCounts {
        new: outcome.count(Classification::New),
        regressed: outcome.count(Classification::Regressed),
        improved: outcome.count(Classification::Improved),
        unchanged: outcome.count(Classification::Unchanged),
        error: outcome.count(Classification::Error),
    };
    let samples = if verbose {
        outcome
            .entries
            .iter()
            .map(|e| SampleLine {
                test: e.test.clone(),
                metric: e.metric.clone(),
                classification: e.classification,
                old_value: e.old_value,
                new_value: e.new_value,
            })
            .collect()
    } else {
        vec![]
    };
    ImportSummary {
        status: outcome.status,
        report_id: outcome.report_id.to_string(),
        machine: outcome.machine.clone(),
        order: outcome.order.as_ref().map(|o| o.to_string()),
        counts,
        errors: outcome.errors.clone(),
        warnings: outcome.warnings.clone(),
        samples,
    }
}

fn fmt_value(v: Option<f64>) -> String {
    v.map(|v| v.to_string()).unwrap_or_else(|| "-".to_string())
}

fn fmt_problem(f: &mut fmt::Formatter<'_>, e: &ImportError) -> fmt::Result {
    match &e.field {
        Some(field) => writeln!(f, "  [{}] {}: {}", e.kind.as_str(), field, e.message),
        None => writeln!(f, "  [{}] {}", e.kind.as_str(), e.message),
    }
}

impl fmt::Display for ImportSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "--- Import Summary ---")?;
        writeln!(f, "Status : {}", self.status.as_str())?;
        writeln!(f, "Report : {}", self.report_id)?;
        if let Some(machine) = &self.machine {
            writeln!(f, "Machine: {machine}")?;
        }
        if let Some(order) = &self.order {
            writeln!(f, "Order  : {order}")?;
        }
        if self.status != CommitStatus::Rejected {
            let parts: Vec<String> = Classification::ALL
                .iter()
                .map(|c| format!("{} {}", self.counts.get(*c), c.as_str()))
                .collect();
            writeln!(f, "Samples: {} ({})", self.counts.total(), parts.join(", "))?;
        }
        if !self.errors.is_empty() {
            writeln!(f, "Errors:")?;
            for e in &self.errors {
                fmt_problem(f, e)?;
            }
        }
        if !self.warnings.is_empty() {
            writeln!(f, "Warnings:")?;
            for w in &self.warnings {
                fmt_problem(f, w)?;
            }
        }
        if !self.samples.is_empty() {
            writeln!(f, "Results:")?;
            let width = self
                .samples
                .iter()
                .map(|s| s.test.len() + s.metric.len() + 1)
                .max()
                .unwrap_or(0);
            for s in &self.samples {
                let name = format!("{}.{}", s.test, s.metric);
                writeln!(
                    f,
                    "  {name:<width$}  {:<10} {} -> {}",
                    s.classification.as_str(),
                    fmt_value(s.old_value),
                    fmt_value(s.new_value),
                )?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use perfdb_core::{ErrorKind, Fingerprint, OrderKey, ReconciliationEntry};

    fn outcome() -> CommitOutcome {
        CommitOutcome {
            report_id: Fingerprint::from_str("abc123"),
            machine: Some("M1".into()),
            order: Some(OrderKey::from_str("2")),
            status: CommitStatus::Committed,
            entries: vec![
                ReconciliationEntry {
                    test: "t1".into(),
                    metric: "exec_time".into(),
                    classification: Classification::Regressed,
                    old_value: Some(10.0),
                    new_value: Some(12.0),
                    prior_order: Some(OrderKey::from_str("1")),
                    same_order: false,
                },
                ReconciliationEntry {
                    test: "t2".into(),
                    metric: "exec_time".into(),
                    classification: Classification::New,
                    old_value: None,
                    new_value: Some(3.0),
                    prior_order: None,
                    same_order: false,
                },
            ],
            errors: vec![],
            warnings: vec![],
        }
    }

    #[test]
    fn counts_every_classification() {
        let s = render(&outcome(), false);
        assert_eq!(s.counts.regressed, 1);
        assert_eq!(s.counts.new, 1);
        assert_eq!(s.counts.total(), 2);
        assert!(s.samples.is_empty());
    }

    #[test]
    fn verbose_lists_each_sample() {
        let s = render(&outcome(), true);
        assert_eq!(s.samples.len(), 2);
        let text = s.to_string();
        assert!(text.contains("Status : COMMITTED"));
        assert!(text.contains("t1.exec_time"));
        assert!(text.contains("REGRESSED  10 -> 12"));
        assert!(text.contains("- -> 3"));
    }

    #[test]
    fn rejected_summary_names_the_field() {
        let outcome = CommitOutcome::rejected(
            Fingerprint::from_str("abc123"),
            vec![ImportError::new(
                ErrorKind::Validation,
                Some("t1/exec_time".into()),
                "value is not finite (NaN)",
            )],
        );
        let s = render(&outcome, true);
        assert!(s.is_rejected());
        let text = s.to_string();
        assert!(text.contains("[validation] t1/exec_time: value is not finite (NaN)"));
        assert!(!text.contains("Samples:"));
    }

    #[test]
    fn json_shape_round_trips() {
        let s = render(&outcome(), true);
        let json = serde_json::to_string(&s).unwrap();
        assert!(json.contains("\"status\":\"COMMITTED\""));
        let back: ImportSummary = serde_json::from_str(&json).unwrap();
        assert_eq!(back, s);
    }
}
