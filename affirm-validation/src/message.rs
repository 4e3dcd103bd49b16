// Message templates and placeholder substitution

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::Serialize;
use std::collections::BTreeMap;

static PLACEHOLDER_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{([A-Za-z][A-Za-z0-9]*)\}").unwrap());

/// Placeholder values for one failure message
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MessageArgs {
    values: BTreeMap<String, String>,
}

impl MessageArgs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a placeholder value
    pub fn set(&mut self, key: impl Into<String>, value: impl ToString) {
        self.values.insert(key.into(), value.to_string());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Substitute `{Name}` placeholders; unknown names are left as written
    pub fn format(&self, template: &str) -> String {
        PLACEHOLDER_REGEX
            .replace_all(template, |caps: &Captures<'_>| match self.values.get(&caps[1]) {
                Some(value) => value.clone(),
                None => caps[0].to_string(),
            })
            .into_owned()
    }

    pub(crate) fn extend(&mut self, other: MessageArgs) {
        self.values.extend(other.values);
    }

    pub(crate) fn into_placeholders(self) -> BTreeMap<String, String> {
        self.values
    }
}

/// Human readable name for a property: `first_name` and `FirstName` become `First Name`
pub fn display_name(property: &str) -> String {
    if property.contains(' ') {
        return property.to_string();
    }

    let mut words: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut prev: Option<char> = None;

    for ch in property.chars() {
        if ch == '_' || ch == '-' || ch == '.' {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
            prev = None;
            continue;
        }
        if ch.is_uppercase()
            && prev.is_some_and(|p| p.is_lowercase() || p.is_ascii_digit())
            && !current.is_empty()
        {
            words.push(std::mem::take(&mut current));
        }
        current.push(ch);
        prev = Some(ch);
    }
    if !current.is_empty() {
        words.push(current);
    }

    words
        .iter()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Capture a value for a failure: the JSON form and its rendering in messages
pub(crate) fn describe_value<V: Serialize + ?Sized>(value: &V) -> (Option<serde_json::Value>, String) {
    match serde_json::to_value(value) {
        Ok(serde_json::Value::Null) | Err(_) => (None, String::new()),
        Ok(json) => {
            let rendered = render_value(&json);
            (Some(json), rendered)
        }
    }
}

/// Render a JSON value the way it appears in messages
pub(crate) fn render_value(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Null => String::new(),
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Whether a value is absent (`None`, or anything serializing to null)
pub(crate) fn is_absent<V: Serialize + ?Sized>(value: &V) -> bool {
    matches!(serde_json::to_value(value), Ok(serde_json::Value::Null))
}

/// Render any serializable value for a placeholder
pub(crate) fn render<V: Serialize + ?Sized>(value: &V) -> String {
    describe_value(value).1
}
