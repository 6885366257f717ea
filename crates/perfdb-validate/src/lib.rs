pub mod rule;
pub mod types;

pub use rule::*;
pub use types::*;

use perfdb_core::Report;

pub fn default_rules() -> Vec<Box<dyn Rule>> {
    vec![
        Box::new(MachineNameRule),
        Box::new(RunTimesRule),
        Box::new(RunOrderRule),
        Box::new(SampleNamesRule),
        Box::new(FiniteValuesRule),
        Box::new(NonEmptyValuesRule),
        Box::new(DuplicateSampleRule),
        Box::new(EmptyReportRule),
    ]
}

/// Run every rule and collect all findings; never stops at the first.
pub fn validate_with(report: &Report, rules: &[Box<dyn Rule>]) -> ValidationResult {
    ValidationResult {
        findings: rules.iter().flat_map(|r| r.eval(report)).collect(),
    }
}

pub fn validate(report: &Report) -> ValidationResult {
    validate_with(report, &default_rules())
}
