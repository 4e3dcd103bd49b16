// Per-call validation state

use crate::{
    CascadeMode, MessageArgs, Result, ValidationError, ValidationFailure, ValidatorOptions,
    ValidatorRegistry,
};
use once_cell::sync::Lazy;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

static DEFAULT_OPTIONS: Lazy<ValidatorOptions> = Lazy::new(ValidatorOptions::default);

/// Out-of-band data shared by every rule of a validation call
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RootContextData {
    values: HashMap<String, Value>,
}

impl RootContextData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Get a string entry
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.values.get(key).and_then(Value::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Selection and cancellation settings for one call
#[derive(Debug, Clone, Default)]
pub struct ValidateOptions {
    /// Rule sets to run (`default` for ungrouped rules, `*` for all)
    pub rule_sets: Option<Vec<String>>,

    /// Property paths to run, e.g. `FirstName` or `MainAddress.Street`
    pub properties: Option<Vec<String>>,

    pub cancellation: Option<CancellationToken>,

    /// Deadline for the whole call
    pub timeout: Option<Duration>,
}

impl ValidateOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Select rule sets from a comma separated list (`"Names, Addresses"`)
    pub fn rule_sets(mut self, names: &str) -> Self {
        self.rule_sets
            .get_or_insert_with(Vec::new)
            .extend(split_list(names));
        self
    }

    /// Select properties from a comma separated list (`"FirstName, LastName"`)
    pub fn properties(mut self, paths: &str) -> Self {
        self.properties
            .get_or_insert_with(Vec::new)
            .extend(split_list(paths));
        self
    }

    pub fn cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

fn split_list(list: &str) -> impl Iterator<Item = String> + '_ {
    list.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
}

/// Join a parent path and a relative path (`Orders` + `[2]`, `Address` + `Street`)
pub(crate) fn join_path(prefix: &str, relative: &str) -> String {
    if prefix.is_empty() {
        relative.to_string()
    } else if relative.is_empty() {
        prefix.to_string()
    } else if relative.starts_with('[') {
        format!("{}{}", prefix, relative)
    } else {
        format!("{}.{}", prefix, relative)
    }
}

/// Which rules a validator runs, relative to its own properties
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Selector {
    Default,
    /// Lowercased set names
    RuleSets(Vec<String>),
    /// Lowercased property paths
    Properties(Vec<String>),
}

impl Selector {
    pub(crate) fn from_options(options: &ValidateOptions) -> Result<Self> {
        let rule_sets = options.rule_sets.as_deref().unwrap_or_default();
        let properties = options.properties.as_deref().unwrap_or_default();

        match (rule_sets.is_empty(), properties.is_empty()) {
            (false, false) => Err(ValidationError::InvalidArgument(
                "rule sets and properties cannot be selected in the same call".to_string(),
            )),
            (false, true) => Ok(Selector::RuleSets(
                rule_sets.iter().map(|name| name.to_lowercase()).collect(),
            )),
            (true, false) => Ok(Selector::Properties(
                properties.iter().map(|path| path.to_lowercase()).collect(),
            )),
            (true, true) => Ok(Selector::Default),
        }
    }

    /// Whether a rule targeting `path` is selected by a property selector
    pub(crate) fn selects_property(&self, path: &str) -> bool {
        match self {
            Selector::Properties(paths) => {
                let path = path.to_lowercase();
                paths.iter().any(|requested| {
                    requested == &path
                        || requested
                            .strip_prefix(path.as_str())
                            .is_some_and(|rest| rest.starts_with('.') || rest.starts_with('['))
                })
            }
            _ => true,
        }
    }

    /// Whether a property selector names one of `candidates` itself rather
    /// than only paths nested below it
    pub(crate) fn selects_own(&self, candidates: &[String]) -> bool {
        let Selector::Properties(paths) = self else {
            return true;
        };
        candidates
            .iter()
            .any(|candidate| paths.contains(&candidate.to_lowercase()))
    }

    /// Whether `element` (`Books[1]`) of the collection rule at `path` is
    /// selected. `Books`, `Books[]` and `Books[1]` all select it, as do
    /// nested requests below them.
    pub(crate) fn selects_element(&self, path: &str, element: &str) -> bool {
        let Selector::Properties(paths) = self else {
            return true;
        };

        let candidates = [
            path.to_lowercase(),
            format!("{}[]", path.to_lowercase()),
            element.to_lowercase(),
        ];
        paths.iter().any(|requested| {
            candidates.iter().any(|candidate| {
                requested == candidate
                    || requested
                        .strip_prefix(candidate.as_str())
                        .is_some_and(|rest| rest.starts_with('.'))
            })
        })
    }

    /// Selector for a child validated at `candidates` (the rule path and, for
    /// collection elements, `Name[i]` / `Name[]`). `None` skips the child.
    pub(crate) fn for_child(&self, candidates: &[String]) -> Option<Selector> {
        let Selector::Properties(paths) = self else {
            return Some(self.clone());
        };

        let candidates: Vec<String> = candidates.iter().map(|c| c.to_lowercase()).collect();
        let mut nested = Vec::new();
        for requested in paths {
            for candidate in &candidates {
                if requested == candidate {
                    return Some(Selector::Default);
                }
                if let Some(rest) = requested
                    .strip_prefix(candidate.as_str())
                    .and_then(|rest| rest.strip_prefix('.'))
                {
                    nested.push(rest.to_string());
                }
            }
        }

        if nested.is_empty() {
            None
        } else {
            Some(Selector::Properties(nested))
        }
    }
}

/// Cancellation token and deadline of a call
#[derive(Debug, Clone, Default)]
pub(crate) struct Cancellation {
    token: Option<CancellationToken>,
    deadline: Option<Instant>,
}

impl Cancellation {
    pub(crate) fn new(token: Option<CancellationToken>, timeout: Option<Duration>) -> Self {
        Self {
            token,
            deadline: timeout.map(|timeout| Instant::now() + timeout),
        }
    }

    pub(crate) fn check(&self) -> Result<()> {
        let cancelled = self.token.as_ref().is_some_and(CancellationToken::is_cancelled);
        let expired = self.deadline.is_some_and(|deadline| Instant::now() >= deadline);
        if cancelled || expired {
            Err(ValidationError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Resolves when the token fires or the deadline passes
    pub(crate) async fn cancelled(&self) {
        match (&self.token, self.deadline) {
            (Some(token), Some(deadline)) => {
                tokio::select! {
                    _ = token.cancelled() => {}
                    _ = tokio::time::sleep_until(deadline) => {}
                }
            }
            (Some(token), None) => token.cancelled().await,
            (None, Some(deadline)) => tokio::time::sleep_until(deadline).await,
            (None, None) => std::future::pending::<()>().await,
        }
    }
}

/// Call-wide state shared by reference with every nested validator
#[derive(Clone, Copy)]
pub(crate) struct Shared<'c> {
    pub root_data: &'c RootContextData,
    pub options: &'c ValidatorOptions,
    pub registry: Option<&'c ValidatorRegistry>,
    pub cancellation: &'c Cancellation,
}

/// Position of a validator inside the object graph being validated
#[derive(Debug, Clone)]
pub(crate) struct Scope {
    pub prefix: String,
    pub depth: usize,
    pub selector: Selector,
    /// Cascade mode of the validator running in this scope
    pub cascade: Option<CascadeMode>,
}

impl Scope {
    pub(crate) fn root(selector: Selector) -> Self {
        Self {
            prefix: String::new(),
            depth: 0,
            selector,
            cascade: None,
        }
    }

    pub(crate) fn path_for(&self, relative: &str) -> String {
        join_path(&self.prefix, relative)
    }

    pub(crate) fn with_cascade(&self, cascade: Option<CascadeMode>) -> Self {
        Self {
            cascade,
            ..self.clone()
        }
    }

    /// Scope for element `index` of the sequence validated in this scope
    pub(crate) fn element(&self, index: usize) -> Self {
        Self {
            prefix: format!("{}[{}]", self.prefix, index),
            ..self.clone()
        }
    }

    /// Scope for a child validator at `relative`; fails past `max_depth`
    pub(crate) fn child(&self, relative: &str, selector: Selector, max_depth: usize) -> Result<Self> {
        let prefix = self.path_for(relative);
        if self.depth + 1 > max_depth {
            return Err(ValidationError::InvalidArgument(format!(
                "maximum validation depth of {} exceeded at '{}'",
                max_depth, prefix
            )));
        }
        Ok(Self {
            prefix,
            depth: self.depth + 1,
            selector,
            cascade: None,
        })
    }
}

/// Everything a validation call needs besides the validator
///
/// ```
/// use affirm_validation::ValidationContext;
///
/// let name = String::from("Ada");
/// let context = ValidationContext::new(&name)
///     .with_root_data("CustomData", "+18")
///     .with_rule_sets("Names");
///
/// assert_eq!(context.root_data().get_str("CustomData"), Some("+18"));
/// ```
pub struct ValidationContext<'a, T> {
    instance: Option<&'a T>,
    root_data: RootContextData,
    options: ValidateOptions,
    registry: Option<ValidatorRegistry>,
    validator_options: Option<Arc<ValidatorOptions>>,
}

impl<'a, T> ValidationContext<'a, T> {
    pub fn new(instance: &'a T) -> Self {
        Self::from_option(Some(instance))
    }

    /// Context without an instance; only a pre-validation hook can handle it
    pub fn missing() -> Self {
        Self::from_option(None)
    }

    pub fn from_option(instance: Option<&'a T>) -> Self {
        Self {
            instance,
            root_data: RootContextData::new(),
            options: ValidateOptions::default(),
            registry: None,
            validator_options: None,
        }
    }

    pub fn with_root_data(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.root_data.insert(key, value);
        self
    }

    pub fn with_options(mut self, options: ValidateOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_rule_sets(mut self, names: &str) -> Self {
        self.options = self.options.rule_sets(names);
        self
    }

    pub fn with_properties(mut self, paths: &str) -> Self {
        self.options = self.options.properties(paths);
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.options.cancellation = Some(token);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.options.timeout = Some(timeout);
        self
    }

    /// Registry used for injected and implicit child validators
    pub fn with_registry(mut self, registry: ValidatorRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Override the registry's (or the default) options for this call
    pub fn with_validator_options(mut self, options: ValidatorOptions) -> Self {
        self.validator_options = Some(Arc::new(options));
        self
    }

    pub fn instance(&self) -> Option<&'a T> {
        self.instance
    }

    pub fn root_data(&self) -> &RootContextData {
        &self.root_data
    }

    pub fn root_data_mut(&mut self) -> &mut RootContextData {
        &mut self.root_data
    }

    pub fn options(&self) -> &ValidateOptions {
        &self.options
    }

    pub fn registry(&self) -> Option<&ValidatorRegistry> {
        self.registry.as_ref()
    }

    /// Options in effect: explicit ones, then the registry's, then defaults
    pub fn validator_options(&self) -> &ValidatorOptions {
        if let Some(options) = &self.validator_options {
            options
        } else if let Some(registry) = &self.registry {
            registry.options()
        } else {
            &DEFAULT_OPTIONS
        }
    }
}

/// What a pre-validation hook sees
pub struct PreValidationContext<'c, T> {
    pub(crate) instance: Option<&'c T>,
    pub(crate) root_data: &'c RootContextData,
    pub(crate) property_path: &'c str,
}

impl<'c, T> PreValidationContext<'c, T> {
    /// The instance, if one was supplied
    pub fn instance(&self) -> Option<&'c T> {
        self.instance
    }

    pub fn root_data(&self) -> &RootContextData {
        self.root_data
    }

    /// Path of the validated object; empty at the root
    pub fn property_path(&self) -> &str {
        self.property_path
    }
}

/// Where a failure is being reported
pub(crate) struct Site {
    pub path: String,
    pub display_name: String,
    pub collection_index: Option<usize>,
    pub attempted_value: Option<Value>,
    pub args: MessageArgs,
}

/// Context handed to `custom` rules
pub struct CustomContext<'c, T> {
    instance: &'c T,
    root_data: &'c RootContextData,
    parent_path: &'c str,
    site: &'c Site,
    failures: Vec<ValidationFailure>,
}

impl<'c, T> CustomContext<'c, T> {
    pub(crate) fn new(
        instance: &'c T,
        root_data: &'c RootContextData,
        parent_path: &'c str,
        site: &'c Site,
    ) -> Self {
        Self {
            instance,
            root_data,
            parent_path,
            site,
            failures: Vec::new(),
        }
    }

    /// The object the rule belongs to
    pub fn instance(&self) -> &'c T {
        self.instance
    }

    pub fn root_data(&self) -> &RootContextData {
        self.root_data
    }

    pub fn property_path(&self) -> &str {
        &self.site.path
    }

    pub fn display_name(&self) -> &str {
        &self.site.display_name
    }

    pub fn collection_index(&self) -> Option<usize> {
        self.site.collection_index
    }

    /// Record a failure for the rule's property. `{PropertyName}` and the
    /// other standard placeholders are substituted.
    pub fn add_failure(&mut self, message: impl AsRef<str>) {
        let failure = self.build(self.site.path.clone(), message.as_ref());
        self.failures.push(failure);
    }

    /// Record a failure for another property of the same object
    pub fn add_failure_for(&mut self, property: &str, message: impl AsRef<str>) {
        let failure = self.build(join_path(self.parent_path, property), message.as_ref());
        self.failures.push(failure);
    }

    /// Record a fully built failure as is
    pub fn add(&mut self, failure: ValidationFailure) {
        self.failures.push(failure);
    }

    pub(crate) fn into_failures(self) -> Vec<ValidationFailure> {
        self.failures
    }

    fn build(&self, property: String, template: &str) -> ValidationFailure {
        let mut failure = ValidationFailure::new(property, self.site.args.format(template));
        failure.attempted_value = self.site.attempted_value.clone();
        failure.placeholders = self.site.args.clone().into_placeholders();
        failure
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rule_set_list_parsing() {
        let options = ValidateOptions::new().rule_sets("Names, Addresses,,");
        assert_eq!(
            options.rule_sets,
            Some(vec!["Names".to_string(), "Addresses".to_string()])
        );
        assert_eq!(
            Selector::from_options(&options).unwrap(),
            Selector::RuleSets(vec!["names".to_string(), "addresses".to_string()])
        );
    }

    #[test]
    fn test_both_selectors_rejected() {
        let options = ValidateOptions::new()
            .rule_sets("Names")
            .properties("FirstName");
        assert!(matches!(
            Selector::from_options(&options),
            Err(ValidationError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_empty_selectors_fall_back_to_default() {
        let options = ValidateOptions::new().rule_sets(" , ");
        assert_eq!(Selector::from_options(&options).unwrap(), Selector::Default);
    }

    #[test]
    fn test_property_selection() {
        let selector = Selector::from_options(
            &ValidateOptions::new().properties("Firstname, MainAddress.Street, Orders[1]"),
        )
        .unwrap();

        assert!(selector.selects_property("FirstName"));
        assert!(selector.selects_property("MainAddress"));
        assert!(selector.selects_property("Orders"));
        assert!(!selector.selects_property("LastName"));
        assert!(!selector.selects_property("Main"));
    }

    #[test]
    fn test_child_selector() {
        let selector = Selector::Properties(vec![
            "mainaddress.street".to_string(),
            "orders[1]".to_string(),
        ]);

        assert_eq!(
            selector.for_child(&["MainAddress".to_string()]),
            Some(Selector::Properties(vec!["street".to_string()]))
        );
        assert_eq!(
            selector.for_child(&["Orders[1]".to_string(), "Orders[]".to_string()]),
            Some(Selector::Default)
        );
        assert_eq!(
            selector.for_child(&["Orders[0]".to_string(), "Orders[]".to_string()]),
            None
        );

        let sets = Selector::RuleSets(vec!["names".to_string()]);
        assert_eq!(sets.for_child(&["MainAddress".to_string()]), Some(sets.clone()));
    }

    #[test]
    fn test_element_selection() {
        let selector = Selector::Properties(vec!["books[1]".to_string()]);
        assert!(selector.selects_element("Books", "Books[1]"));
        assert!(!selector.selects_element("Books", "Books[0]"));
        assert!(!selector.selects_element("Books", "Books[10]"));

        let nested = Selector::Properties(vec!["orders[2].street".to_string()]);
        assert!(nested.selects_element("Orders", "Orders[2]"));
        assert!(!nested.selects_element("Orders", "Orders[1]"));

        let wildcard = Selector::Properties(vec!["orders[]".to_string()]);
        assert!(wildcard.selects_element("Orders", "Orders[7]"));

        let whole = Selector::Properties(vec!["orders".to_string()]);
        assert!(whole.selects_element("Orders", "Orders[0]"));

        let candidates = ["Orders[2]".to_string(), "Orders[]".to_string(), "Orders".to_string()];
        assert!(whole.selects_own(&candidates));
        assert!(!nested.selects_own(&candidates));
        assert!(Selector::Default.selects_own(&candidates));

        assert!(Selector::Default.selects_element("Orders", "Orders[0]"));
    }

    #[test]
    fn test_join_path() {
        assert_eq!(join_path("", "Street"), "Street");
        assert_eq!(join_path("MainAddress", "Street"), "MainAddress.Street");
        assert_eq!(join_path("Orders", "[2]"), "Orders[2]");
        assert_eq!(join_path("Orders[2]", ""), "Orders[2]");
    }

    #[test]
    fn test_scope_depth_limit() {
        let root = Scope::root(Selector::Default);
        let child = root.child("MainAddress", Selector::Default, 1).unwrap();
        assert_eq!(child.prefix, "MainAddress");
        assert_eq!(child.path_for("Street"), "MainAddress.Street");

        let error = child.child("Next", Selector::Default, 1).unwrap_err();
        assert!(matches!(error, ValidationError::InvalidArgument(_)));
    }

    #[test]
    fn test_cancellation_check() {
        let token = CancellationToken::new();
        let cancellation = Cancellation::new(Some(token.clone()), None);
        assert!(cancellation.check().is_ok());

        token.cancel();
        assert!(cancellation.check().unwrap_err().is_cancelled());

        let expired = Cancellation::new(None, Some(Duration::ZERO));
        assert!(expired.check().is_err());
    }

    #[test]
    fn test_root_data() {
        let data = RootContextData::new().with("CustomData", "Custom Value");
        assert_eq!(data.get_str("CustomData"), Some("Custom Value"));
        assert!(data.contains("CustomData"));
        assert!(!data.contains("Other"));
    }

    #[test]
    fn test_effective_options() {
        let value = 1u8;
        let context = ValidationContext::new(&value);
        assert_eq!(context.validator_options().max_depth, 32);

        let context = context.with_validator_options(ValidatorOptions::new().with_max_depth(3));
        assert_eq!(context.validator_options().max_depth, 3);
    }
}
