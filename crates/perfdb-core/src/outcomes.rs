use serde::{Deserialize, Serialize};

use crate::ids::{Fingerprint, OrderKey};

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Classification {
    New,
    Regressed,
    Improved,
    Unchanged,
    Error,
}

impl Classification {
    pub const ALL: [Classification; 5] = [
        Classification::New,
        Classification::Regressed,
        Classification::Improved,
        Classification::Unchanged,
        Classification::Error,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Classification::New => "NEW",
            Classification::Regressed => "REGRESSED",
            Classification::Improved => "IMPROVED",
            Classification::Unchanged => "UNCHANGED",
            Classification::Error => "ERROR",
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ReconciliationEntry {
    pub test: String,
    pub metric: String,
    pub classification: Classification,
    pub old_value: Option<f64>,
    pub new_value: Option<f64>,
    pub prior_order: Option<OrderKey>,
    /// An existing record already sits at the incoming order key; it wins.
    pub same_order: bool,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CommitStatus {
    Committed,
    Simulated,
    Duplicate,
    Rejected,
}

impl CommitStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommitStatus::Committed => "COMMITTED",
            CommitStatus::Simulated => "SIMULATED",
            CommitStatus::Duplicate => "DUPLICATE",
            CommitStatus::Rejected => "REJECTED",
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Decode,
    Validation,
    Store,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Decode => "decode",
            ErrorKind::Validation => "validation",
            ErrorKind::Store => "store",
        }
    }
}

/// A problem reported as data on the outcome rather than raised.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ImportError {
    pub kind: ErrorKind,
    pub field: Option<String>,
    pub message: String,
}

impl ImportError {
    pub fn new(kind: ErrorKind, field: Option<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            field,
            message: message.into(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct CommitOutcome {
    pub report_id: Fingerprint,
    pub machine: Option<String>,
    pub order: Option<OrderKey>,
    pub status: CommitStatus,
    pub entries: Vec<ReconciliationEntry>,
    pub errors: Vec<ImportError>,
    pub warnings: Vec<ImportError>,
}

impl CommitOutcome {
    pub fn rejected(report_id: Fingerprint, errors: Vec<ImportError>) -> Self {
        Self {
            report_id,
            machine: None,
            order: None,
            status: CommitStatus::Rejected,
            entries: vec![],
            errors,
            warnings: vec![],
        }
    }

    pub fn is_rejected(&self) -> bool {
        self.status == CommitStatus::Rejected
    }

    pub fn count(&self, classification: Classification) -> usize {
        self.entries
            .iter()
            .filter(|e| e.classification == classification)
            .count()
    }
}
