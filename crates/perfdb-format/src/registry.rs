use std::path::Path;

use perfdb_core::{FormatTag, Report};

use crate::error::DecodeError;
use crate::json::JsonFormat;
use crate::yaml::YamlFormat;

/// One wire format: bytes to `Report` and back.
pub trait ReportDecoder: Send + Sync {
    fn tag(&self) -> FormatTag;
    fn decode(&self, payload: &[u8]) -> Result<Report, DecodeError>;
    fn encode(&self, report: &Report) -> Result<Vec<u8>, DecodeError>;
}

/// Registered formats, tried in registration order for `auto`.
pub struct FormatRegistry {
    decoders: Vec<Box<dyn ReportDecoder>>,
}

impl Default for FormatRegistry {
    fn default() -> Self {
        Self::with_builtin()
    }
}

impl FormatRegistry {
    pub fn empty() -> Self {
        Self { decoders: vec![] }
    }

    pub fn with_builtin() -> Self {
        let mut registry = Self::empty();
        registry.register(Box::new(JsonFormat));
        registry.register(Box::new(YamlFormat));
        registry
    }

    /// Adds a format, replacing any decoder already registered for its tag.
    pub fn register(&mut self, decoder: Box<dyn ReportDecoder>) {
        let tag = decoder.tag();
        match self.decoders.iter().position(|d| d.tag() == tag) {
            Some(i) => self.decoders[i] = decoder,
            None => self.decoders.push(decoder),
        }
    }

    pub fn tags(&self) -> Vec<FormatTag> {
        self.decoders.iter().map(|d| d.tag()).collect()
    }

    pub fn get(&self, tag: &FormatTag) -> Option<&dyn ReportDecoder> {
        self.decoders.iter().find(|d| &d.tag() == tag).map(|d| d.as_ref())
    }

    pub fn decode(&self, payload: &[u8], tag: &FormatTag) -> Result<Report, DecodeError> {
        if tag.is_auto() {
            return self.decode_any(payload);
        }
        self.get(tag)
            .ok_or_else(|| DecodeError::UnknownFormat(tag.to_string()))?
            .decode(payload)
    }

    pub fn encode(&self, report: &Report, tag: &FormatTag) -> Result<Vec<u8>, DecodeError> {
        self.get(tag)
            .ok_or_else(|| DecodeError::UnknownFormat(tag.to_string()))?
            .encode(report)
    }

    /// Re-encode a report in another format. `from` may be `auto`.
    pub fn convert(&self, payload: &[u8], from: &FormatTag, to: &FormatTag) -> Result<Vec<u8>, DecodeError> {
        let report = self.decode(payload, from)?;
        self.encode(&report, to)
    }

    /// First decoder that accepts the payload wins; otherwise the first
    /// decoder's error is the one reported.
    fn decode_any(&self, payload: &[u8]) -> Result<Report, DecodeError> {
        let mut first_err = None;
        for decoder in &self.decoders {
            match decoder.decode(payload) {
                Ok(report) => return Ok(report),
                Err(e) => {
                    first_err.get_or_insert(e);
                }
            }
        }
        Err(first_err.unwrap_or_else(|| DecodeError::UnknownFormat(FormatTag::AUTO.to_string())))
    }
}

/// Format implied by a file extension, `auto` when there is none we know.
pub fn guess_format(path: &Path) -> FormatTag {
    match path.extension().and_then(|e| e.to_str()).map(str::to_ascii_lowercase).as_deref() {
        Some("json") => FormatTag::json(),
        Some("yaml") | Some("yml") => FormatTag::yaml(),
        _ => FormatTag::auto(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL_JSON: &[u8] = br#"{"machine": {"name": "m"}, "run": {"order": 1}, "tests": []}"#;
    const MINIMAL_YAML: &[u8] = b"machine:\n  name: m\nrun:\n  order: 1\ntests: []\n";

    struct Upper;

    impl ReportDecoder for Upper {
        fn tag(&self) -> FormatTag {
            FormatTag::from_str("upper-json")
        }
        fn decode(&self, payload: &[u8]) -> Result<Report, DecodeError> {
            let lowered = String::from_utf8_lossy(payload).to_lowercase();
            let mut r = JsonFormat.decode(lowered.as_bytes())?;
            r.format = self.tag();
            Ok(r)
        }
        fn encode(&self, report: &Report) -> Result<Vec<u8>, DecodeError> {
            JsonFormat.encode(report)
        }
    }

    #[test]
    fn unknown_tag_is_a_decode_error() {
        let registry = FormatRegistry::default();
        let err = registry.decode(MINIMAL_JSON, &FormatTag::from_str("csv")).unwrap_err();
        assert_eq!(err, DecodeError::UnknownFormat("csv".into()));
    }

    #[test]
    fn auto_picks_the_first_format_that_accepts() {
        let registry = FormatRegistry::default();
        let r = registry.decode(MINIMAL_JSON, &FormatTag::auto()).unwrap();
        assert_eq!(r.format, FormatTag::json());
        let r = registry.decode(MINIMAL_YAML, &FormatTag::auto()).unwrap();
        assert_eq!(r.format, FormatTag::yaml());
    }

    #[test]
    fn auto_reports_first_error_when_nothing_accepts() {
        let registry = FormatRegistry::default();
        let err = registry.decode(b"{\"machine\": 1, ", &FormatTag::auto()).unwrap_err();
        assert!(matches!(err, DecodeError::Syntax { ref format, .. } if format == "json"));
    }

    #[test]
    fn new_formats_register_without_touching_the_pipeline() {
        let mut registry = FormatRegistry::default();
        registry.register(Box::new(Upper));
        assert_eq!(registry.tags().len(), 3);
        let payload = br#"{"MACHINE": {"NAME": "M"}, "RUN": {}, "TESTS": []}"#;
        let r = registry.decode(payload, &FormatTag::from_str("upper-json")).unwrap();
        assert_eq!(r.machine.name, "m");

        registry.register(Box::new(Upper));
        assert_eq!(registry.tags().len(), 3);
    }

    #[test]
    fn converts_json_to_yaml() {
        let registry = FormatRegistry::default();
        let payload = br#"{"machine": {"name": "M1"}, "run": {"order": "7"},
            "tests": [{"name": "t1", "metrics": {"exec_time": 1.5}}]}"#;
        let yaml = registry.convert(payload, &FormatTag::auto(), &FormatTag::yaml()).unwrap();
        assert!(String::from_utf8(yaml.clone()).unwrap().contains("exec_time"));

        let from_json = registry.decode(payload, &FormatTag::json()).unwrap();
        let from_yaml = registry.decode(&yaml, &FormatTag::yaml()).unwrap();
        assert_eq!(from_yaml.machine, from_json.machine);
        assert_eq!(from_yaml.run, from_json.run);
        assert_eq!(from_yaml.samples, from_json.samples);
    }

    #[test]
    fn convert_to_unknown_format_fails() {
        let registry = FormatRegistry::default();
        let err = registry
            .convert(MINIMAL_JSON, &FormatTag::json(), &FormatTag::from_str("csv"))
            .unwrap_err();
        assert_eq!(err, DecodeError::UnknownFormat("csv".into()));
    }

    #[test]
    fn guesses_format_from_extension() {
        assert_eq!(guess_format(Path::new("r.json")), FormatTag::json());
        assert_eq!(guess_format(Path::new("r.YML")), FormatTag::yaml());
        assert_eq!(guess_format(Path::new("report")), FormatTag::auto());
    }
}
