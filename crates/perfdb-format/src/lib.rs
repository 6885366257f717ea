pub mod canonical;
pub mod document;
pub mod error;
pub mod json;
pub mod registry;
pub mod yaml;

pub use canonical::*;
pub use error::*;
pub use json::*;
pub use registry::*;
pub use yaml::*;

use perfdb_core::{FormatTag, Report};

/// Decode with the built-in formats.
pub fn decode(payload: &[u8], format: &FormatTag) -> Result<Report, DecodeError> {
    FormatRegistry::with_builtin().decode(payload, format)
}

/// Encode with the built-in formats.
pub fn encode(report: &Report, format: &FormatTag) -> Result<Vec<u8>, DecodeError> {
    FormatRegistry::with_builtin().encode(report, format)
}
