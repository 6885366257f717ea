use serde_json::{Map, Value};
use serde_yaml::Value as Yaml;

use perfdb_core::{FormatTag, Report};

use crate::document::{number_to_json, report_from_value, report_to_value};
use crate::error::DecodeError;
use crate::registry::ReportDecoder;

#[derive(Clone, Copy, Debug, Default)]
pub struct YamlFormat;

impl ReportDecoder for YamlFormat {
    fn tag(&self) -> FormatTag {
        FormatTag::yaml()
    }

    fn decode(&self, payload: &[u8]) -> Result<Report, DecodeError> {
        let yaml: Yaml = serde_yaml::from_slice(payload).map_err(|e| {
            let (line, column) = e.location().map(|l| (l.line(), l.column())).unwrap_or((0, 0));
            DecodeError::Syntax {
                format: FormatTag::YAML.to_string(),
                line,
                column,
                message: e.to_string(),
            }
        })?;
        report_from_value(&to_json(yaml, "")?, self.tag())
    }

    fn encode(&self, report: &Report) -> Result<Vec<u8>, DecodeError> {
        serde_yaml::to_string(&report_to_value(report))
            .map(String::into_bytes)
            .map_err(|e| DecodeError::Encode {
                format: FormatTag::YAML.to_string(),
                message: e.to_string(),
            })
    }
}

/// YAML trees convert losslessly except for `.nan`/`.inf`, which become the
/// strings the document layer already accepts for metric values.
fn to_json(v: Yaml, path: &str) -> Result<Value, DecodeError> {
    Ok(match v {
        Yaml::Null => Value::Null,
        Yaml::Bool(b) => Value::Bool(b),
        Yaml::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::from(i)
            } else if let Some(u) = n.as_u64() {
                Value::from(u)
            } else {
                number_to_json(n.as_f64().unwrap_or(f64::NAN))
            }
        }
        Yaml::String(s) => Value::String(s),
        Yaml::Sequence(items) => Value::Array(
            items
                .into_iter()
                .enumerate()
                .map(|(i, item)| to_json(item, &format!("{path}[{i}]")))
                .collect::<Result<_, _>>()?,
        ),
        Yaml::Mapping(map) => {
            let mut out = Map::new();
            for (k, v) in map {
                let key = match k {
                    Yaml::String(s) => s,
                    Yaml::Number(n) => n.to_string(),
                    Yaml::Bool(b) => b.to_string(),
                    _ => return Err(DecodeError::mismatch(path, "mapping with scalar keys", "complex key")),
                };
                let child = if path.is_empty() { key.clone() } else { format!("{path}.{key}") };
                out.insert(key, to_json(v, &child)?);
            }
            Value::Object(out)
        }
        Yaml::Tagged(tagged) => to_json(tagged.value, path)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use perfdb_core::SampleValue;

    #[test]
    fn decodes_yaml_report_with_nan() {
        let payload = b"machine:\n  name: M1\nrun:\n  order: 3\ntests:\n  - name: t1\n    metrics:\n      exec_time: .nan\n";
        let r = YamlFormat.decode(payload).unwrap();
        assert_eq!(r.format, FormatTag::yaml());
        match &r.samples[0].value {
            Some(SampleValue::Scalar(v)) => assert!(v.is_nan()),
            other => panic!("unexpected value {other:?}"),
        }
    }

    #[test]
    fn yaml_syntax_error_has_location() {
        let err = YamlFormat.decode(b"machine: [unterminated\n").unwrap_err();
        assert!(matches!(err, DecodeError::Syntax { .. }));
    }
}
