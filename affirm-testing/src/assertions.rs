// Test assertions for validation results

use affirm_validation::{
    Severity, ValidateOptions, ValidationFailure, ValidationResult, Validator,
};
use async_trait::async_trait;
use serde::Serialize;
use std::fmt::Write;

/// Run a validator and wrap its result in assertion helpers.
///
/// Engine errors (cancellation, misuse) panic, since a test expecting
/// failures never wants them.
#[async_trait]
pub trait TestValidate<T> {
    fn test_validate(&self, instance: &T) -> TestValidationResult;

    fn test_validate_with(&self, instance: &T, options: ValidateOptions) -> TestValidationResult;

    async fn test_validate_async(&self, instance: &T) -> TestValidationResult;
}

#[async_trait]
impl<T> TestValidate<T> for Validator<T>
where
    T: Send + Sync + 'static,
{
    fn test_validate(&self, instance: &T) -> TestValidationResult {
        match self.validate(instance) {
            Ok(result) => TestValidationResult::new(result),
            Err(e) => panic!("Validation returned an error: {}", e),
        }
    }

    fn test_validate_with(&self, instance: &T, options: ValidateOptions) -> TestValidationResult {
        match self.validate_with(instance, options) {
            Ok(result) => TestValidationResult::new(result),
            Err(e) => panic!("Validation returned an error: {}", e),
        }
    }

    async fn test_validate_async(&self, instance: &T) -> TestValidationResult {
        match self.validate_async(instance).await {
            Ok(result) => TestValidationResult::new(result),
            Err(e) => panic!("Validation returned an error: {}", e),
        }
    }
}

/// Validation result with assertion methods
#[derive(Debug, Clone)]
pub struct TestValidationResult {
    result: ValidationResult,
}

impl TestValidationResult {
    pub fn new(result: ValidationResult) -> Self {
        Self { result }
    }

    pub fn result(&self) -> &ValidationResult {
        &self.result
    }

    pub fn into_inner(self) -> ValidationResult {
        self.result
    }

    /// Assert that `property` has at least one failure
    pub fn should_have_error_for(&self, property: &str) -> FailureAssertions<'_> {
        let failures = self.result.errors_for(property);
        assert!(
            !failures.is_empty(),
            "Expected a validation error for property '{}'. {}",
            property,
            describe(self.result.failures())
        );
        FailureAssertions { property: property.to_string(), failures }
    }

    /// Assert that `property` has no failures
    pub fn should_not_have_error_for(&self, property: &str) {
        let failures = self.result.errors_for(property);
        assert!(
            failures.is_empty(),
            "Expected no validation errors for property '{}'. {}",
            property,
            describe(&failures.into_iter().cloned().collect::<Vec<_>>())
        );
    }

    /// Assert that the result is valid
    pub fn should_not_have_any_errors(&self) {
        assert!(
            self.result.is_valid(),
            "Expected no validation errors. {}",
            describe(self.result.failures())
        );
    }

    /// Assert the total number of failures
    pub fn should_have_error_count(&self, expected: usize) {
        assert_eq!(
            self.result.failures().len(),
            expected,
            "Expected {} validation errors. {}",
            expected,
            describe(self.result.failures())
        );
    }
}

/// Failures recorded for one property, narrowed by each chained assertion
#[derive(Debug)]
pub struct FailureAssertions<'r> {
    property: String,
    failures: Vec<&'r ValidationFailure>,
}

impl<'r> FailureAssertions<'r> {
    pub fn with_message(self, expected: &str) -> Self {
        self.narrow(&format!("message '{}'", expected), |f| f.message == expected)
    }

    pub fn with_message_containing(self, fragment: &str) -> Self {
        self.narrow(&format!("message containing '{}'", fragment), |f| {
            f.message.contains(fragment)
        })
    }

    pub fn with_error_code(self, expected: &str) -> Self {
        self.narrow(&format!("error code '{}'", expected), |f| f.error_code == expected)
    }

    pub fn with_severity(self, expected: Severity) -> Self {
        self.narrow(&format!("severity {:?}", expected), |f| f.severity == expected)
    }

    pub fn with_attempted_value<V: Serialize>(self, expected: V) -> Self {
        let expected = serde_json::to_value(expected).ok();
        self.narrow(&format!("attempted value {:?}", expected), |f| {
            f.attempted_value == expected
        })
    }

    /// Failures still matching every assertion so far
    pub fn failures(&self) -> &[&'r ValidationFailure] {
        &self.failures
    }

    pub fn count(&self) -> usize {
        self.failures.len()
    }

    fn narrow<F>(self, expectation: &str, predicate: F) -> Self
    where
        F: Fn(&ValidationFailure) -> bool,
    {
        let (matching, others): (Vec<_>, Vec<_>) =
            self.failures.into_iter().partition(|f| predicate(f));
        assert!(
            !matching.is_empty(),
            "Expected an error for property '{}' with {}. {}",
            self.property,
            expectation,
            describe(&others.into_iter().cloned().collect::<Vec<_>>())
        );
        Self {
            property: self.property,
            failures: matching,
        }
    }
}

fn describe(failures: &[ValidationFailure]) -> String {
    if failures.is_empty() {
        return "No errors were recorded".to_string();
    }

    let mut out = String::from("Recorded errors:");
    for failure in failures {
        let _ = write!(
            out,
            "\n  - [{}] {} ({})",
            failure.property, failure.message, failure.error_code
        );
    }
    out
}
