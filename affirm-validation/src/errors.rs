// Validation failures and engine errors

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Error raised by a custom or asynchronous predicate.
///
/// These never become validation failures; the engine hands them back to the
/// caller as [`ValidationError::Rule`].
pub type RuleError = Box<dyn std::error::Error + Send + Sync>;

/// Result alias used throughout the engine
pub type Result<T> = std::result::Result<T, ValidationError>;

/// How serious a failure is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[default]
    Error,
    Warning,
    Info,
}

/// A single violated constraint
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationFailure {
    /// Fully qualified property path (`MainAddress.Street`, `Books[3]`)
    pub property: String,

    /// Formatted error message
    pub message: String,

    /// Code of the constraint that failed
    pub error_code: String,

    /// Value that failed validation, captured when the failure was built
    pub attempted_value: Option<serde_json::Value>,

    /// Placeholder values used to format the message
    pub placeholders: BTreeMap<String, String>,

    pub severity: Severity,

    /// Arbitrary data attached by the rule
    pub state: Option<serde_json::Value>,
}

impl ValidationFailure {
    /// Create a new failure
    pub fn new(property: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            property: property.into(),
            message: message.into(),
            error_code: "custom".to_string(),
            attempted_value: None,
            placeholders: BTreeMap::new(),
            severity: Severity::Error,
            state: None,
        }
    }

    /// Set the error code
    pub fn with_error_code(mut self, code: impl Into<String>) -> Self {
        self.error_code = code.into();
        self
    }

    /// Set the attempted value
    pub fn with_attempted_value(mut self, value: impl Into<serde_json::Value>) -> Self {
        self.attempted_value = Some(value.into());
        self
    }

    /// Record a placeholder value
    pub fn with_placeholder(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.placeholders.insert(key.into(), value.into());
        self
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    /// Attach custom state
    pub fn with_state(mut self, state: impl Into<serde_json::Value>) -> Self {
        self.state = Some(state.into());
        self
    }
}

impl fmt::Display for ValidationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.property.is_empty() {
            write!(f, "{}", self.message)
        } else {
            write!(f, "{}: {}", self.property, self.message)
        }
    }
}

/// Errors returned by the validation entry points
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    /// Caller misuse, such as combining selectors or a missing instance
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Returned by the `validate_and_throw` family
    #[error("Validation failed:{}", summarize(.failures))]
    Failed { failures: Vec<ValidationFailure> },

    /// The call was cancelled or timed out before every rule ran
    #[error("Validation was cancelled")]
    Cancelled,

    /// A synchronous entry point reached an asynchronous rule
    #[error("Property '{property}' has asynchronous rules and must be validated with validate_async")]
    AsyncRuleInSyncCall { property: String },

    #[error("No validator registered for type {type_name}")]
    ValidatorNotRegistered { type_name: &'static str },

    /// A custom or asynchronous predicate returned an error
    #[error("Rule for '{property}' failed: {source}")]
    Rule {
        property: String,
        #[source]
        source: RuleError,
    },
}

impl ValidationError {
    /// Failures carried by [`ValidationError::Failed`]
    pub fn failures(&self) -> &[ValidationFailure] {
        match self {
            ValidationError::Failed { failures } => failures,
            _ => &[],
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, ValidationError::Cancelled)
    }
}

fn summarize(failures: &[ValidationFailure]) -> String {
    failures
        .iter()
        .map(|failure| format!("\n -- {}", failure))
        .collect()
}
