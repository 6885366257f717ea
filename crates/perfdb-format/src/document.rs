//! The format-neutral report document.
//!
//! Every wire format parses into a `serde_json::Value` tree first; this module
//! turns that tree into a `Report` (and back), so the required-key and type
//! checks are shared by all formats.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use serde_json::{Map, Value};

use perfdb_core::{
    FormatTag, MachineIdentity, OrderKey, Report, RunInfo, Sample, SampleStatus, SampleValue, STATUS_METRIC,
};

use crate::error::DecodeError;

pub fn report_from_value(value: &Value, format: FormatTag) -> Result<Report, DecodeError> {
    let root = object(value, "")?;

    let machine = object(required(root, "machine", "")?, "machine")?;
    let machine = MachineIdentity {
        name: string(required(machine, "name", "machine")?, "machine.name")?,
        parameters: parameters(machine)?,
    };

    let run = object(required(root, "run", "")?, "run")?;
    let run = RunInfo {
        start_time: optional(run, "start_time")
            .map(|v| timestamp(v, "run.start_time"))
            .transpose()?,
        end_time: optional(run, "end_time")
            .map(|v| timestamp(v, "run.end_time"))
            .transpose()?,
        order: optional(run, "order")
            .map(|v| scalar_string(v, "run.order").map(OrderKey::from_str))
            .transpose()?,
        revision: optional(run, "revision")
            .map(|v| scalar_string(v, "run.revision"))
            .transpose()?,
    };

    let tests = required(root, "tests", "")?;
    let tests = tests
        .as_array()
        .ok_or_else(|| DecodeError::mismatch("tests", "array", describe(tests)))?;
    let mut samples = Vec::new();
    for (i, test) in tests.iter().enumerate() {
        let path = format!("tests[{i}]");
        samples.extend(test_samples(test, &path)?);
    }

    Ok(Report {
        format,
        machine,
        run,
        samples,
    })
}

fn parameters(machine: &Map<String, Value>) -> Result<BTreeMap<String, String>, DecodeError> {
    let mut out = BTreeMap::new();
    if let Some(params) = optional(machine, "parameters") {
        for (k, v) in object(params, "machine.parameters")? {
            out.insert(k.clone(), scalar_string(v, &format!("machine.parameters.{k}"))?);
        }
    }
    Ok(out)
}

fn test_samples(test: &Value, path: &str) -> Result<Vec<Sample>, DecodeError> {
    let entry = object(test, path)?;
    let name = string(required(entry, "name", path)?, &format!("{path}.name"))?;
    let status = match optional(entry, "status") {
        Some(v) => {
            let status_path = format!("{path}.status");
            let s = string(v, &status_path)?;
            SampleStatus::from_name(&s)
                .ok_or_else(|| DecodeError::mismatch(&status_path, "one of pass, fail, unsupported", s))?
        }
        None => SampleStatus::Pass,
    };

    let metrics = match optional(entry, "metrics") {
        Some(m) => object(m, &format!("{path}.metrics"))?.clone(),
        None => Map::new(),
    };
    if metrics.is_empty() {
        return Ok(vec![Sample {
            test: name,
            metric: STATUS_METRIC.to_string(),
            value: None,
            status,
        }]);
    }

    metrics
        .iter()
        .map(|(metric, v)| {
            Ok(Sample {
                test: name.clone(),
                metric: metric.clone(),
                value: Some(metric_value(v, &format!("{path}.metrics.{metric}"))?),
                status,
            })
        })
        .collect()
}

fn metric_value(v: &Value, path: &str) -> Result<SampleValue, DecodeError> {
    match v {
        Value::Array(items) => items
            .iter()
            .enumerate()
            .map(|(i, item)| number(item, &format!("{path}[{i}]")))
            .collect::<Result<Vec<_>, _>>()
            .map(SampleValue::Multi),
        other => number(other, path).map(SampleValue::Scalar),
    }
}

/// Numbers, or strings holding one ("12.5", "NaN", "inf"), so non-finite
/// values survive decoding and are judged by the validator.
fn number(v: &Value, path: &str) -> Result<f64, DecodeError> {
    match v {
        Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| DecodeError::mismatch(path, "number", n.to_string())),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| DecodeError::mismatch(path, "number", format!("string \"{s}\""))),
        other => Err(DecodeError::mismatch(path, "number", describe(other))),
    }
}

fn timestamp(v: &Value, path: &str) -> Result<DateTime<Utc>, DecodeError> {
    let s = string(v, path)?;
    if let Ok(t) = DateTime::parse_from_rfc3339(&s) {
        return Ok(t.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(&s, "%Y-%m-%d %H:%M:%S%.f")
        .map(|t| t.and_utc())
        .map_err(|_| DecodeError::mismatch(path, "timestamp (RFC 3339 or YYYY-MM-DD HH:MM:SS)", format!("\"{s}\"")))
}

fn object<'a>(v: &'a Value, path: &str) -> Result<&'a Map<String, Value>, DecodeError> {
    v.as_object()
        .ok_or_else(|| DecodeError::mismatch(path, "object", describe(v)))
}

fn required<'a>(map: &'a Map<String, Value>, key: &str, path: &str) -> Result<&'a Value, DecodeError> {
    optional(map, key).ok_or_else(|| DecodeError::MissingKey(join(path, key)))
}

/// Explicit nulls count as absent.
fn optional<'a>(map: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
    map.get(key).filter(|v| !v.is_null())
}

fn string(v: &Value, path: &str) -> Result<String, DecodeError> {
    v.as_str()
        .map(str::to_string)
        .ok_or_else(|| DecodeError::mismatch(path, "string", describe(v)))
}

fn scalar_string(v: &Value, path: &str) -> Result<String, DecodeError> {
    match v {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        other => Err(DecodeError::mismatch(path, "string", describe(other))),
    }
}

fn join(path: &str, key: &str) -> String {
    if path.is_empty() {
        key.to_string()
    } else {
        format!("{path}.{key}")
    }
}

fn describe(v: &Value) -> String {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
    .to_string()
}

/// Inverse of [`report_from_value`]. The format tag is not part of the document.
pub fn report_to_value(report: &Report) -> Value {
    let mut machine = Map::new();
    machine.insert("name".into(), Value::String(report.machine.name.clone()));
    let params: Map<String, Value> = report
        .machine
        .parameters
        .iter()
        .map(|(k, v)| (k.clone(), Value::String(v.clone())))
        .collect();
    machine.insert("parameters".into(), Value::Object(params));

    let mut run = Map::new();
    if let Some(t) = report.run.start_time {
        run.insert("start_time".into(), Value::String(t.to_rfc3339_opts(SecondsFormat::AutoSi, true)));
    }
    if let Some(t) = report.run.end_time {
        run.insert("end_time".into(), Value::String(t.to_rfc3339_opts(SecondsFormat::AutoSi, true)));
    }
    if let Some(order) = &report.run.order {
        run.insert("order".into(), Value::String(order.as_str().to_string()));
    }
    if let Some(rev) = &report.run.revision {
        run.insert("revision".into(), Value::String(rev.clone()));
    }

    let mut root = Map::new();
    root.insert("machine".into(), Value::Object(machine));
    root.insert("run".into(), Value::Object(run));
    root.insert("tests".into(), Value::Array(test_entries(&report.samples)));
    Value::Object(root)
}

struct TestEntry {
    test: String,
    status: SampleStatus,
    metrics: Map<String, Value>,
    /// Status-only entries never take further metrics.
    open: bool,
}

/// Consecutive samples of one test with one status share a test entry.
fn test_entries(samples: &[Sample]) -> Vec<Value> {
    let mut entries: Vec<TestEntry> = Vec::new();
    for sample in samples {
        let Some(value) = &sample.value else {
            entries.push(TestEntry {
                test: sample.test.clone(),
                status: sample.status,
                metrics: Map::new(),
                open: false,
            });
            continue;
        };
        let joins_last = entries.last().is_some_and(|e| {
            e.open && e.test == sample.test && e.status == sample.status && !e.metrics.contains_key(&sample.metric)
        });
        if !joins_last {
            entries.push(TestEntry {
                test: sample.test.clone(),
                status: sample.status,
                metrics: Map::new(),
                open: true,
            });
        }
        if let Some(last) = entries.last_mut() {
            last.metrics.insert(sample.metric.clone(), sample_value_to_json(value));
        }
    }

    entries
        .into_iter()
        .map(|e| {
            let mut entry = Map::new();
            entry.insert("name".into(), Value::String(e.test));
            entry.insert("status".into(), Value::String(e.status.as_str().to_string()));
            if !e.metrics.is_empty() {
                entry.insert("metrics".into(), Value::Object(e.metrics));
            }
            Value::Object(entry)
        })
        .collect()
}

fn sample_value_to_json(v: &SampleValue) -> Value {
    match v {
        SampleValue::Scalar(x) => number_to_json(*x),
        SampleValue::Multi(xs) => Value::Array(xs.iter().map(|x| number_to_json(*x)).collect()),
    }
}

/// JSON has no literal for NaN or infinity; spell them as strings.
pub(crate) fn number_to_json(x: f64) -> Value {
    if x.is_finite() {
        Value::from(x)
    } else if x.is_nan() {
        Value::String("NaN".into())
    } else if x > 0.0 {
        Value::String("inf".into())
    } else {
        Value::String("-inf".into())
    }
}
