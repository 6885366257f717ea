use serde_json::Value;

use perfdb_core::{FormatTag, Report};

use crate::document::{report_from_value, report_to_value};
use crate::error::DecodeError;
use crate::registry::ReportDecoder;

#[derive(Clone, Copy, Debug, Default)]
pub struct JsonFormat;

impl ReportDecoder for JsonFormat {
    fn tag(&self) -> FormatTag {
        FormatTag::json()
    }

    fn decode(&self, payload: &[u8]) -> Result<Report, DecodeError> {
        let value: Value = serde_json::from_slice(payload).map_err(|e| DecodeError::Syntax {
            format: FormatTag::JSON.to_string(),
            line: e.line(),
            column: e.column(),
            message: e.to_string(),
        })?;
        report_from_value(&value, self.tag())
    }

    fn encode(&self, report: &Report) -> Result<Vec<u8>, DecodeError> {
        serde_json::to_vec_pretty(&report_to_value(report)).map_err(|e| DecodeError::Encode {
            format: FormatTag::JSON.to_string(),
            message: e.to_string(),
        })
    }
}
