// Validation results

use crate::{Result, ValidationError, ValidationFailure};
use serde::Serialize;
use std::fmt;

/// Outcome of one validation call
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ValidationResult {
    /// Failures in the order they were produced
    pub failures: Vec<ValidationFailure>,

    /// Names of the rule sets whose rules were selected for this call
    pub rule_sets_executed: Vec<String>,
}

impl ValidationResult {
    /// Create an empty (valid) result
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn from_parts(failures: Vec<ValidationFailure>, rule_sets_executed: Vec<String>) -> Self {
        Self {
            failures,
            rule_sets_executed,
        }
    }

    /// True when no failure was recorded
    pub fn is_valid(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn failures(&self) -> &[ValidationFailure] {
        &self.failures
    }

    /// Add a failure
    pub fn add(&mut self, failure: ValidationFailure) {
        self.failures.push(failure);
    }

    /// Get failures for a specific property path
    pub fn errors_for(&self, property: &str) -> Vec<&ValidationFailure> {
        self.failures
            .iter()
            .filter(|failure| failure.property == property)
            .collect()
    }

    pub fn has_error_for(&self, property: &str) -> bool {
        self.failures.iter().any(|failure| failure.property == property)
    }

    /// Join all failure messages with `separator`
    pub fn to_string_with(&self, separator: &str) -> String {
        self.failures
            .iter()
            .map(|failure| failure.message.as_str())
            .collect::<Vec<_>>()
            .join(separator)
    }

    /// Convert to JSON representation
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "valid": self.is_valid(),
            "ruleSetsExecuted": self.rule_sets_executed,
            "errors": self.failures.iter().map(|f| {
                serde_json::json!({
                    "property": f.property,
                    "message": f.message,
                    "code": f.error_code,
                    "value": f.attempted_value,
                    "severity": f.severity,
                })
            }).collect::<Vec<_>>()
        })
    }

    /// Turn an invalid result into [`ValidationError::Failed`]
    pub fn ensure_valid(self) -> Result<Self> {
        if self.is_valid() {
            Ok(self)
        } else {
            Err(ValidationError::Failed {
                failures: self.failures,
            })
        }
    }
}

impl fmt::Display for ValidationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_string_with("\n"))
    }
}
