// Validators: rule composition and execution

use crate::context::{join_path, Cancellation, Scope, Selector, Shared};
use crate::rules::{Condition, RuleBuilder, RuleEntry};
use crate::{
    CascadeMode, Each, Elements, PreValidationContext, Result, ValidateOptions, ValidationContext,
    ValidationError, ValidationFailure, ValidationResult,
};
use futures::future::{try_join_all, BoxFuture};
use futures::FutureExt;
use serde::Serialize;
use std::any::type_name;
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Name reported for rules that are not part of a rule set
pub const DEFAULT_RULE_SET: &str = "default";

/// Selects every rule set
pub const ALL_RULE_SETS: &str = "*";

type PreValidateHook<T> =
    Arc<dyn Fn(&PreValidationContext<'_, T>, &mut ValidationResult) -> bool + Send + Sync>;

/// Validates instances of `T` against an ordered list of rules.
///
/// A validator is immutable once built and can be shared between threads
/// through an `Arc`. Per-call state lives in the call.
///
/// ```
/// use affirm_validation::Validator;
///
/// struct Customer {
///     name: String,
///     discount: i32,
/// }
///
/// let validator = Validator::<Customer>::builder()
///     .rule_for("Name", |c| &c.name, |rule| rule.not_empty())
///     .rule_for("Discount", |c| &c.discount, |rule| rule.inclusive_between(0, 50))
///     .build();
///
/// let result = validator
///     .validate(&Customer { name: String::new(), discount: 70 })
///     .unwrap();
///
/// assert!(!result.is_valid());
/// assert_eq!(result.failures[0].message, "'Name' must not be empty.");
/// assert_eq!(result.failures[1].message, "'Discount' must be between 0 and 50. You entered 70.");
/// ```
pub struct Validator<T> {
    rules: Vec<RuleEntry<T>>,
    pre_validate: Option<PreValidateHook<T>>,
    cascade: Option<CascadeMode>,
}

impl<T> Validator<T>
where
    T: Send + Sync + 'static,
{
    pub fn builder() -> ValidatorBuilder<T> {
        ValidatorBuilder::new()
    }

    /// Validate with the default rules
    pub fn validate(&self, instance: &T) -> Result<ValidationResult> {
        self.validate_context(&ValidationContext::new(instance))
    }

    /// Validate with rule set, property or cancellation options
    pub fn validate_with(&self, instance: &T, options: ValidateOptions) -> Result<ValidationResult> {
        self.validate_context(&ValidationContext::new(instance).with_options(options))
    }

    /// Validate a fully configured context
    pub fn validate_context(&self, context: &ValidationContext<'_, T>) -> Result<ValidationResult> {
        let selector = Selector::from_options(context.options())?;
        let cancellation = Cancellation::new(
            context.options().cancellation.clone(),
            context.options().timeout,
        );
        let shared = Shared {
            root_data: context.root_data(),
            options: context.validator_options(),
            registry: context.registry(),
            cancellation: &cancellation,
        };

        debug!("Validating {} ({:?})", type_name::<T>(), selector);
        let scope = Scope::root(selector);
        let mut failures = Vec::new();
        let executed = self
            .execute(context.instance(), shared, &scope, &mut failures)
            .inspect_err(|error| Self::log_error(error))?;

        Ok(Self::finish(failures, executed))
    }

    /// Validate and turn failures into [`ValidationError::Failed`]
    pub fn validate_and_throw(&self, instance: &T) -> Result<()> {
        self.validate(instance)?.ensure_valid().map(drop)
    }

    pub fn validate_and_throw_with(&self, instance: &T, options: ValidateOptions) -> Result<()> {
        self.validate_with(instance, options)?.ensure_valid().map(drop)
    }

    /// Validate, awaiting asynchronous rules
    ///
    /// ```
    /// use affirm_validation::Validator;
    /// use futures::FutureExt;
    ///
    /// struct Signup {
    ///     email: String,
    /// }
    ///
    /// let validator = Validator::<Signup>::builder()
    ///     .rule_for("Email", |s| &s.email, |rule| {
    ///         rule.email_address().must_async(|_, email| {
    ///             let known = email.ends_with("@example.com");
    ///             async move { Ok(!known) }.boxed()
    ///         })
    ///     })
    ///     .build();
    ///
    /// # tokio_test::block_on(async {
    /// let signup = Signup { email: "ada@example.com".to_string() };
    /// let result = validator.validate_async(&signup).await.unwrap();
    /// assert_eq!(result.failures[0].error_code, "asyncPredicate");
    /// # });
    /// ```
    pub async fn validate_async(&self, instance: &T) -> Result<ValidationResult> {
        self.validate_context_async(&ValidationContext::new(instance))
            .await
    }

    pub async fn validate_async_with(
        &self,
        instance: &T,
        options: ValidateOptions,
    ) -> Result<ValidationResult> {
        self.validate_context_async(&ValidationContext::new(instance).with_options(options))
            .await
    }

    /// Validate a context, awaiting asynchronous rules.
    ///
    /// Rules run concurrently; failures are reported in rule order.
    pub async fn validate_context_async(
        &self,
        context: &ValidationContext<'_, T>,
    ) -> Result<ValidationResult> {
        let selector = Selector::from_options(context.options())?;
        let cancellation = Cancellation::new(
            context.options().cancellation.clone(),
            context.options().timeout,
        );
        let shared = Shared {
            root_data: context.root_data(),
            options: context.validator_options(),
            registry: context.registry(),
            cancellation: &cancellation,
        };

        debug!("Validating {} asynchronously ({:?})", type_name::<T>(), selector);
        let scope = Scope::root(selector);
        let mut failures = Vec::new();
        let executed = self
            .execute_async(context.instance(), shared, &scope, &mut failures)
            .await
            .inspect_err(|error| Self::log_error(error))?;

        Ok(Self::finish(failures, executed))
    }

    pub async fn validate_and_throw_async(&self, instance: &T) -> Result<()> {
        self.validate_async(instance).await?.ensure_valid().map(drop)
    }

    /// Whether any rule needs `validate_async`
    pub fn is_async(&self) -> bool {
        self.rules.iter().any(|entry| entry.rule.is_async())
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    /// Declared rule set names in declaration order
    pub fn rule_set_names(&self) -> Vec<String> {
        let mut names = Vec::new();
        for entry in &self.rules {
            for name in &entry.rule_sets {
                record(&mut names, name);
            }
        }
        names
    }

    fn finish(failures: Vec<ValidationFailure>, executed: Vec<String>) -> ValidationResult {
        debug!(
            "Validation of {} finished with {} failure(s), rule sets {:?}",
            type_name::<T>(),
            failures.len(),
            executed
        );
        ValidationResult::from_parts(failures, executed)
    }

    fn log_error(error: &ValidationError) {
        match error {
            ValidationError::Cancelled => warn!("Validation of {} cancelled", type_name::<T>()),
            other => debug!("Validation of {} aborted: {}", type_name::<T>(), other),
        }
    }

    /// Rules selected by `selector`, in execution order, and the rule set
    /// names they belong to
    fn plan(&self, selector: &Selector) -> (Vec<&RuleEntry<T>>, Vec<String>) {
        let mut executed = Vec::new();

        let selected: Vec<&RuleEntry<T>> = match selector {
            Selector::Default => self
                .rules
                .iter()
                .filter(|entry| entry.rule_sets.is_empty())
                .collect(),
            Selector::Properties(_) => self
                .rules
                .iter()
                .filter(|entry| selector.selects_property(entry.rule.path()))
                .collect(),
            Selector::RuleSets(names) if names.iter().any(|name| name == ALL_RULE_SETS) => {
                self.rules.iter().collect()
            }
            Selector::RuleSets(names) => {
                let mut taken = vec![false; self.rules.len()];
                let mut selected = Vec::new();
                for name in names {
                    for (index, entry) in self.rules.iter().enumerate() {
                        let matched = if name == DEFAULT_RULE_SET {
                            entry.rule_sets.is_empty()
                        } else {
                            entry.rule_sets.iter().any(|set| set.to_lowercase() == *name)
                        };
                        if matched && !taken[index] {
                            taken[index] = true;
                            selected.push(entry);
                        }
                    }
                }
                selected
            }
        };

        for entry in &selected {
            if entry.rule_sets.is_empty() {
                record(&mut executed, DEFAULT_RULE_SET);
            }
            for set in &entry.rule_sets {
                let requested = match selector {
                    Selector::RuleSets(names) => names
                        .iter()
                        .any(|name| name == ALL_RULE_SETS || *name == set.to_lowercase()),
                    _ => true,
                };
                if requested {
                    record(&mut executed, set);
                }
            }
        }

        (selected, executed)
    }

    /// Run the pre-validation hook. Returns the instance when rules should run.
    fn pre_validate<'i>(
        &self,
        instance: Option<&'i T>,
        shared: Shared<'_>,
        scope: &Scope,
        failures: &mut Vec<ValidationFailure>,
    ) -> Result<Option<&'i T>> {
        if let Some(hook) = &self.pre_validate {
            let context = PreValidationContext {
                instance,
                root_data: shared.root_data,
                property_path: &scope.prefix,
            };
            let mut result = ValidationResult::new();
            let proceed = hook(&context, &mut result);

            failures.extend(result.failures.into_iter().map(|mut failure| {
                failure.property = join_path(&scope.prefix, &failure.property);
                failure
            }));
            if !proceed {
                debug!("Pre-validation of {} stopped validation", type_name::<T>());
                return Ok(None);
            }
        }

        instance.map(Some).ok_or_else(|| {
            ValidationError::InvalidArgument(format!(
                "cannot validate a missing {}; supply an instance or handle it in pre_validate",
                type_name::<T>()
            ))
        })
    }

    pub(crate) fn execute(
        &self,
        instance: Option<&T>,
        shared: Shared<'_>,
        scope: &Scope,
        failures: &mut Vec<ValidationFailure>,
    ) -> Result<Vec<String>> {
        let scope = scope.with_cascade(self.cascade);
        let Some(instance) = self.pre_validate(instance, shared, &scope, failures)? else {
            return Ok(Vec::new());
        };

        let (entries, executed) = self.plan(&scope.selector);
        if let Some(entry) = entries.iter().find(|entry| entry.rule.is_async()) {
            let property = scope.path_for(entry.rule.path());
            warn!(
                "Asynchronous rule for '{}' reached a synchronous validation call",
                property
            );
            return Err(ValidationError::AsyncRuleInSyncCall { property });
        }

        for entry in entries {
            if !entry.applies(instance) {
                trace!("Skipping rule for '{}'", scope.path_for(entry.rule.path()));
                continue;
            }
            entry.rule.validate(instance, shared, &scope, failures)?;
        }

        Ok(executed)
    }

    pub(crate) async fn execute_async(
        &self,
        instance: Option<&T>,
        shared: Shared<'_>,
        scope: &Scope,
        failures: &mut Vec<ValidationFailure>,
    ) -> Result<Vec<String>> {
        let scope = scope.with_cascade(self.cascade);
        let Some(instance) = self.pre_validate(instance, shared, &scope, failures)? else {
            return Ok(Vec::new());
        };

        let (entries, executed) = self.plan(&scope.selector);
        let scope = &scope;
        let mut runs: Vec<BoxFuture<'_, Result<Vec<ValidationFailure>>>> =
            Vec::with_capacity(entries.len());
        for entry in entries {
            runs.push(
                async move {
                    let mut local = Vec::new();
                    if entry.applies(instance) {
                        entry
                            .rule
                            .validate_async(instance, shared, scope, &mut local)
                            .await?;
                    } else {
                        trace!("Skipping rule for '{}'", scope.path_for(entry.rule.path()));
                    }
                    Ok(local)
                }
                .boxed(),
            );
        }

        for local in try_join_all(runs).await? {
            failures.extend(local);
        }

        Ok(executed)
    }
}

fn record(names: &mut Vec<String>, name: &str) {
    if !names.iter().any(|known| known.eq_ignore_ascii_case(name)) {
        names.push(name.to_string());
    }
}

fn split_names(names: &str) -> Vec<String> {
    names
        .split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect()
}

/// Declares the rules of a [`Validator`]
pub struct ValidatorBuilder<T> {
    rules: Vec<RuleEntry<T>>,
    pre_validate: Option<PreValidateHook<T>>,
    cascade: Option<CascadeMode>,
}

impl<T> Default for ValidatorBuilder<T>
where
    T: Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ValidatorBuilder<T>
where
    T: Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            rules: Vec::new(),
            pre_validate: None,
            cascade: None,
        }
    }

    /// Cascade mode for rules that do not set their own
    pub fn cascade_mode(mut self, mode: CascadeMode) -> Self {
        self.cascade = Some(mode);
        self
    }

    /// Add a rule for the property `name`, read through `accessor`
    pub fn rule_for<P, A, F>(mut self, name: impl Into<String>, accessor: A, configure: F) -> Self
    where
        P: Serialize + Send + Sync + 'static,
        A: Fn(&T) -> &P + Send + Sync + 'static,
        F: FnOnce(RuleBuilder<T, P>) -> RuleBuilder<T, P>,
    {
        let rule = configure(RuleBuilder::new(name)).into_property_rule(Box::new(accessor));
        self.rules.push(RuleEntry::new(Arc::new(rule)));
        self
    }

    /// Add a rule applied to each element of the collection `name`
    pub fn rule_for_each<C, A, F>(mut self, name: impl Into<String>, accessor: A, configure: F) -> Self
    where
        C: Elements + Send + Sync + 'static,
        C::Item: Serialize + Send + Sync + 'static,
        A: Fn(&T) -> &C + Send + Sync + 'static,
        F: FnOnce(RuleBuilder<T, C::Item, Each>) -> RuleBuilder<T, C::Item, Each>,
    {
        let rule = configure(RuleBuilder::new(name)).into_collection_rule(Box::new(accessor));
        self.rules.push(RuleEntry::new(Arc::new(rule)));
        self
    }

    /// Put the rules declared in `define` into the comma separated rule sets
    /// `names`. Rules already placed in a nested set keep it.
    pub fn rule_set<F>(mut self, names: &str, define: F) -> Self
    where
        F: FnOnce(ValidatorBuilder<T>) -> ValidatorBuilder<T>,
    {
        let names = split_names(names);
        for mut entry in define(ValidatorBuilder::new()).rules {
            if entry.rule_sets.is_empty() {
                entry.rule_sets = names.clone();
            }
            self.rules.push(entry);
        }
        self
    }

    /// Rules declared in `define` only run when `condition` holds
    pub fn when<C, F>(self, condition: C, define: F) -> ConditionalBuilder<T>
    where
        C: Fn(&T) -> bool + Send + Sync + 'static,
        F: FnOnce(ValidatorBuilder<T>) -> ValidatorBuilder<T>,
    {
        self.conditional(Arc::new(condition), define)
    }

    pub fn unless<C, F>(self, condition: C, define: F) -> ConditionalBuilder<T>
    where
        C: Fn(&T) -> bool + Send + Sync + 'static,
        F: FnOnce(ValidatorBuilder<T>) -> ValidatorBuilder<T>,
    {
        self.conditional(Arc::new(move |instance: &T| !condition(instance)), define)
    }

    fn conditional<F>(mut self, condition: Condition<T>, define: F) -> ConditionalBuilder<T>
    where
        F: FnOnce(ValidatorBuilder<T>) -> ValidatorBuilder<T>,
    {
        for mut entry in define(ValidatorBuilder::new()).rules {
            entry.conditions.insert(0, Arc::clone(&condition));
            self.rules.push(entry);
        }
        ConditionalBuilder {
            parent: self,
            condition,
        }
    }

    /// Append the rules of another validator for the same type
    pub fn include(mut self, validator: Arc<Validator<T>>) -> Self {
        self.rules.extend(validator.rules.iter().cloned());
        self
    }

    /// Hook that runs before any rule. Returning `false` stops validation
    /// with the failures the hook added.
    pub fn pre_validate<F>(mut self, hook: F) -> Self
    where
        F: Fn(&PreValidationContext<'_, T>, &mut ValidationResult) -> bool + Send + Sync + 'static,
    {
        self.pre_validate = Some(Arc::new(hook));
        self
    }

    pub fn build(self) -> Validator<T> {
        Validator {
            rules: self.rules,
            pre_validate: self.pre_validate,
            cascade: self.cascade,
        }
    }

    pub(crate) fn into_entries(self) -> Vec<RuleEntry<T>> {
        self.rules
    }
}

/// Returned by [`ValidatorBuilder::when`] and [`ValidatorBuilder::unless`]
pub struct ConditionalBuilder<T> {
    parent: ValidatorBuilder<T>,
    condition: Condition<T>,
}

impl<T> ConditionalBuilder<T>
where
    T: Send + Sync + 'static,
{
    /// Rules that run when the condition does not hold
    pub fn otherwise<F>(self, define: F) -> ValidatorBuilder<T>
    where
        F: FnOnce(ValidatorBuilder<T>) -> ValidatorBuilder<T>,
    {
        let condition = self.condition;
        self.parent
            .conditional(Arc::new(move |instance: &T| !condition(instance)), define)
            .end()
    }

    pub fn end(self) -> ValidatorBuilder<T> {
        self.parent
    }
}
