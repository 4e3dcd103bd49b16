// Engine-wide options

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Whether later components of a rule run after one of them fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CascadeMode {
    /// Run every component (default)
    #[default]
    Continue,
    /// Skip the remaining components of the same rule
    Stop,
}

impl CascadeMode {
    /// Parse a cascade mode name
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "continue" | "continue_on_failure" | "continueonfailure" => Some(CascadeMode::Continue),
            "stop" | "stop_on_first_failure" | "stoponfirstfailure" => Some(CascadeMode::Stop),
            _ => None,
        }
    }
}

/// Options shared by every validator taking part in a call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidatorOptions {
    /// Cascade mode for rules and validators that do not set one
    pub default_cascade_mode: CascadeMode,

    /// Validate property values with the registry's validator for their type
    /// even when the rule declares no child validator
    pub implicitly_validate_child_properties: bool,

    /// Maximum nesting of child validators
    pub max_depth: usize,

    /// Message templates keyed by error code, replacing the built-in defaults
    pub messages: HashMap<String, String>,
}

impl Default for ValidatorOptions {
    fn default() -> Self {
        Self {
            default_cascade_mode: CascadeMode::Continue,
            implicitly_validate_child_properties: false,
            max_depth: 32,
            messages: HashMap::new(),
        }
    }
}

impl ValidatorOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cascade_mode(mut self, mode: CascadeMode) -> Self {
        self.default_cascade_mode = mode;
        self
    }

    pub fn implicit_child_validation(mut self, enabled: bool) -> Self {
        self.implicitly_validate_child_properties = enabled;
        self
    }

    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }

    /// Override the default message for an error code
    pub fn with_message(mut self, error_code: impl Into<String>, template: impl Into<String>) -> Self {
        self.messages.insert(error_code.into(), template.into());
        self
    }

    pub fn message_for(&self, error_code: &str) -> Option<&str> {
        self.messages.get(error_code).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cascade_mode_parse() {
        assert_eq!(CascadeMode::parse("stop"), Some(CascadeMode::Stop));
        assert_eq!(
            CascadeMode::parse("StopOnFirstFailure"),
            Some(CascadeMode::Stop)
        );
        assert_eq!(CascadeMode::parse(" Continue "), Some(CascadeMode::Continue));
        assert_eq!(CascadeMode::parse("sometimes"), None);
    }

    #[test]
    fn test_defaults() {
        let options = ValidatorOptions::default();
        assert_eq!(options.default_cascade_mode, CascadeMode::Continue);
        assert!(!options.implicitly_validate_child_properties);
        assert_eq!(options.max_depth, 32);
    }

    #[test]
    fn test_deserialize_partial() {
        let options: ValidatorOptions = serde_json::from_value(serde_json::json!({
            "default_cascade_mode": "stop",
            "messages": { "notEmpty": "{PropertyName} is required" }
        }))
        .unwrap();

        assert_eq!(options.default_cascade_mode, CascadeMode::Stop);
        assert_eq!(options.max_depth, 32);
        assert_eq!(
            options.message_for("notEmpty"),
            Some("{PropertyName} is required")
        );
    }
}
