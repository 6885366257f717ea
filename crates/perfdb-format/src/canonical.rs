use serde_json::Value;
use sha2::{Digest, Sha256};

use perfdb_core::{Fingerprint, Report};

use crate::document::report_to_value;

/// Canonical document for a report: sorted keys, format tag excluded, so the
/// same content sent as JSON or YAML yields the same bytes.
pub fn canonical_json(report: &Report) -> Value {
    sort_json(report_to_value(report))
}

/// Recursively sort object keys for stable hashing.
fn sort_json(v: Value) -> Value {
    match v {
        Value::Object(map) => {
            let mut entries: Vec<_> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            Value::Object(entries.into_iter().map(|(k, v)| (k, sort_json(v))).collect())
        }
        Value::Array(arr) => Value::Array(arr.into_iter().map(sort_json).collect()),
        other => other,
    }
}

pub fn canonical_bytes(report: &Report) -> Vec<u8> {
    // Serializing a Value cannot fail: keys are strings and numbers are finite.
    serde_json::to_vec(&canonical_json(report)).unwrap_or_default()
}

pub fn fingerprint(report: &Report) -> Fingerprint {
    fingerprint_bytes(&canonical_bytes(report))
}

/// Used as the report id when the payload never decoded.
pub fn fingerprint_bytes(bytes: &[u8]) -> Fingerprint {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    Fingerprint::from_str(hex::encode(hasher.finalize()))
}
