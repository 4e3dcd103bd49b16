// Rule model and the fluent rule builder

use crate::context::{CustomContext, Scope, Selector, Shared, Site};
use crate::message::{describe_value, display_name as derive_display_name};
use crate::registry::ImplicitValidator;
use crate::validators::{
    AsyncPredicate, Between, Comparison, CreditCard, EmailAddress, Empty, Equality, Length,
    Matches, NotEmpty, NotNull, Null, Comparator, PrecisionScale, Predicate, ValueSource,
};
use crate::{
    AsChild, AsyncPropertyValidator, CascadeMode, DecimalValue, Elements, Emptiness, MessageArgs,
    Nullable, PropertyValidator, Result, RuleError, Severity, TextValue, ValidationError,
    ValidationFailure, Validator, ValidatorBuilder, ValidatorOptions,
};
use async_trait::async_trait;
use futures::future::BoxFuture;
use regex::Regex;
use serde::Serialize;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::trace;

pub(crate) type Condition<T> = Arc<dyn Fn(&T) -> bool + Send + Sync>;
type FailureCallback<T> = Arc<dyn Fn(&T, &ValidationFailure) + Send + Sync>;
type FailuresCallback<T> = Arc<dyn Fn(&T, &[ValidationFailure]) + Send + Sync>;
type CustomCheck<T, V> =
    Box<dyn Fn(&V, &mut CustomContext<'_, T>) -> std::result::Result<(), RuleError> + Send + Sync>;
type ElementFilter<V> = Box<dyn Fn(&V) -> bool + Send + Sync>;

/// A rule as stored by a validator
#[async_trait]
pub(crate) trait Rule<T>: Send + Sync {
    /// Property path relative to the validator
    fn path(&self) -> &str;

    /// Whether any component has to be awaited
    fn is_async(&self) -> bool;

    fn validate(
        &self,
        instance: &T,
        shared: Shared<'_>,
        scope: &Scope,
        failures: &mut Vec<ValidationFailure>,
    ) -> Result<()>;

    async fn validate_async(
        &self,
        instance: &T,
        shared: Shared<'_>,
        scope: &Scope,
        failures: &mut Vec<ValidationFailure>,
    ) -> Result<()>;
}

/// A rule together with its set membership and block conditions
pub(crate) struct RuleEntry<T> {
    pub rule: Arc<dyn Rule<T>>,
    pub rule_sets: Vec<String>,
    pub conditions: Vec<Condition<T>>,
}

impl<T> Clone for RuleEntry<T> {
    fn clone(&self) -> Self {
        Self {
            rule: Arc::clone(&self.rule),
            rule_sets: self.rule_sets.clone(),
            conditions: self.conditions.clone(),
        }
    }
}

impl<T> RuleEntry<T> {
    pub(crate) fn new(rule: Arc<dyn Rule<T>>) -> Self {
        Self {
            rule,
            rule_sets: Vec::new(),
            conditions: Vec::new(),
        }
    }

    pub(crate) fn applies(&self, instance: &T) -> bool {
        self.conditions.iter().all(|condition| condition(instance))
    }
}

/// Delegation of a property value to another validator
#[async_trait]
pub(crate) trait ChildValidation<V>: Send + Sync {
    fn is_async(&self) -> bool;

    fn validate(
        &self,
        value: &V,
        shared: Shared<'_>,
        scope: &Scope,
        failures: &mut Vec<ValidationFailure>,
    ) -> Result<()>;

    async fn validate_async(
        &self,
        value: &V,
        shared: Shared<'_>,
        scope: &Scope,
        failures: &mut Vec<ValidationFailure>,
    ) -> Result<()>;
}

/// A validator supplied when the rule was declared
pub(crate) struct ChildValidator<C> {
    validator: Arc<Validator<C>>,
}

#[async_trait]
impl<C, V> ChildValidation<V> for ChildValidator<C>
where
    C: Send + Sync + 'static,
    V: AsChild<C> + Sync,
{
    fn is_async(&self) -> bool {
        self.validator.is_async()
    }

    fn validate(
        &self,
        value: &V,
        shared: Shared<'_>,
        scope: &Scope,
        failures: &mut Vec<ValidationFailure>,
    ) -> Result<()> {
        match value.as_child() {
            Some(child) => self.validator.execute(Some(child), shared, scope, failures).map(drop),
            None => Ok(()),
        }
    }

    async fn validate_async(
        &self,
        value: &V,
        shared: Shared<'_>,
        scope: &Scope,
        failures: &mut Vec<ValidationFailure>,
    ) -> Result<()> {
        match value.as_child() {
            Some(child) => self
                .validator
                .execute_async(Some(child), shared, scope, failures)
                .await
                .map(drop),
            None => Ok(()),
        }
    }
}

/// A validator looked up in the call's registry
pub(crate) struct InjectedValidator<C> {
    _child: PhantomData<fn() -> C>,
}

impl<C: Send + Sync + 'static> InjectedValidator<C> {
    fn resolve(&self, shared: Shared<'_>) -> Result<Arc<Validator<C>>> {
        shared
            .registry
            .and_then(|registry| registry.get::<C>())
            .ok_or(ValidationError::ValidatorNotRegistered {
                type_name: std::any::type_name::<C>(),
            })
    }
}

#[async_trait]
impl<C, V> ChildValidation<V> for InjectedValidator<C>
where
    C: Send + Sync + 'static,
    V: AsChild<C> + Sync,
{
    fn is_async(&self) -> bool {
        false
    }

    fn validate(
        &self,
        value: &V,
        shared: Shared<'_>,
        scope: &Scope,
        failures: &mut Vec<ValidationFailure>,
    ) -> Result<()> {
        let Some(child) = value.as_child() else {
            return Ok(());
        };
        self.resolve(shared)?
            .execute(Some(child), shared, scope, failures)
            .map(drop)
    }

    async fn validate_async(
        &self,
        value: &V,
        shared: Shared<'_>,
        scope: &Scope,
        failures: &mut Vec<ValidationFailure>,
    ) -> Result<()> {
        let Some(child) = value.as_child() else {
            return Ok(());
        };
        let validator = self.resolve(shared)?;
        validator
            .execute_async(Some(child), shared, scope, failures)
            .await
            .map(drop)
    }
}

enum Check<T, V> {
    Sync(Box<dyn PropertyValidator<T, V>>),
    Async(Box<dyn AsyncPropertyValidator<T, V>>),
    Custom(CustomCheck<T, V>),
    Child(Box<dyn ChildValidation<V>>),
}

enum Message<T, V> {
    Template(String),
    Dynamic(Box<dyn Fn(&T, &V) -> String + Send + Sync>),
}

/// Outcome of a failed built-in or predicate check
struct Violation {
    code: &'static str,
    template: &'static str,
    args: MessageArgs,
}

/// One constraint of a rule with its per-component settings
struct Component<T, V> {
    check: Check<T, V>,
    conditions: Vec<Condition<T>>,
    message: Option<Message<T, V>>,
    error_code: Option<String>,
    severity: Option<Severity>,
    state: Option<serde_json::Value>,
    on_failure: Option<FailureCallback<T>>,
}

impl<T, V> Component<T, V> {
    fn new(check: Check<T, V>) -> Self {
        Self {
            check,
            conditions: Vec::new(),
            message: None,
            error_code: None,
            severity: None,
            state: None,
            on_failure: None,
        }
    }

    fn applies(&self, instance: &T) -> bool {
        self.conditions.iter().all(|condition| condition(instance))
    }

    fn is_async(&self) -> bool {
        match &self.check {
            Check::Async(_) => true,
            Check::Child(child) => child.is_async(),
            Check::Sync(_) | Check::Custom(_) => false,
        }
    }

    fn failure(
        &self,
        site: &Site,
        instance: &T,
        value: &V,
        violation: Violation,
        options: &ValidatorOptions,
    ) -> ValidationFailure {
        let mut args = site.args.clone();
        args.extend(violation.args);

        let message = match &self.message {
            Some(Message::Template(template)) => args.format(template),
            Some(Message::Dynamic(build)) => args.format(&build(instance, value)),
            None => args.format(
                options
                    .message_for(violation.code)
                    .unwrap_or(violation.template),
            ),
        };

        let failure = ValidationFailure {
            property: site.path.clone(),
            message,
            error_code: violation.code.to_string(),
            attempted_value: site.attempted_value.clone(),
            placeholders: args.into_placeholders(),
            severity: Severity::default(),
            state: None,
        };
        self.decorate(failure)
    }

    /// Apply the component's code, severity and state overrides
    fn decorate(&self, mut failure: ValidationFailure) -> ValidationFailure {
        if let Some(code) = &self.error_code {
            failure.error_code = code.clone();
        }
        if let Some(severity) = self.severity {
            failure.severity = severity;
        }
        if let Some(state) = &self.state {
            failure.state = Some(state.clone());
        }
        failure
    }

    fn run_custom(
        &self,
        custom: &CustomCheck<T, V>,
        instance: &T,
        value: &V,
        shared: Shared<'_>,
        scope: &Scope,
        site: &Site,
    ) -> Result<Vec<ValidationFailure>> {
        let mut context = CustomContext::new(instance, shared.root_data, &scope.prefix, site);
        custom(value, &mut context).map_err(|source| ValidationError::Rule {
            property: site.path.clone(),
            source,
        })?;
        Ok(context
            .into_failures()
            .into_iter()
            .map(|failure| self.decorate(failure))
            .collect())
    }

    fn notify(&self, instance: &T, recorded: &[ValidationFailure]) {
        if let Some(callback) = &self.on_failure {
            for failure in recorded {
                callback(instance, failure);
            }
        }
    }
}

/// The value a rule is currently checking
struct Target<'v, V> {
    value: &'v V,
    relative: String,
    index: Option<usize>,
}

/// Components and settings shared by property and collection rules
pub(crate) struct RuleCore<T, V> {
    path: String,
    display_name: Option<String>,
    components: Vec<Component<T, V>>,
    rule_conditions: Vec<Condition<T>>,
    cascade: Option<CascadeMode>,
    on_any_failure: Option<FailuresCallback<T>>,
    dependents: Vec<RuleEntry<T>>,
}

impl<T, V> RuleCore<T, V>
where
    T: Send + Sync + 'static,
    V: Serialize + Send + Sync + 'static,
{
    fn new(path: String) -> Self {
        Self {
            path,
            display_name: None,
            components: Vec::new(),
            rule_conditions: Vec::new(),
            cascade: None,
            on_any_failure: None,
            dependents: Vec::new(),
        }
    }

    fn is_async(&self) -> bool {
        self.components.iter().any(Component::is_async)
            || self.dependents.iter().any(|entry| entry.rule.is_async())
    }

    fn has_child(&self) -> bool {
        self.components
            .iter()
            .any(|component| matches!(component.check, Check::Child(_)))
    }

    fn cascade_mode(&self, shared: Shared<'_>, scope: &Scope) -> CascadeMode {
        self.cascade
            .or(scope.cascade)
            .unwrap_or(shared.options.default_cascade_mode)
    }

    fn site(&self, scope: &Scope, target: &Target<'_, V>) -> Site {
        let display_name = self
            .display_name
            .clone()
            .unwrap_or_else(|| derive_display_name(&self.path));
        let path = scope.path_for(&target.relative);
        let (attempted_value, rendered) = describe_value(target.value);

        let mut args = MessageArgs::new();
        args.set("PropertyName", &display_name);
        args.set("PropertyPath", &path);
        args.set("PropertyValue", rendered);
        if let Some(index) = target.index {
            args.set("CollectionIndex", index);
        }

        Site {
            path,
            display_name,
            collection_index: target.index,
            attempted_value,
            args,
        }
    }

    /// Paths a property selector may name `target` by
    fn candidates(&self, target: &Target<'_, V>) -> Vec<String> {
        let mut candidates = vec![target.relative.clone()];
        if target.index.is_some() {
            candidates.push(format!("{}[]", self.path));
            candidates.push(self.path.clone());
        }
        candidates
    }

    /// Scope for delegating `target` to a child validator; `None` when the
    /// property selector excludes it
    fn child_scope(
        &self,
        shared: Shared<'_>,
        scope: &Scope,
        target: &Target<'_, V>,
    ) -> Result<Option<Scope>> {
        match scope.selector.for_child(&self.candidates(target)) {
            Some(selector) => scope
                .child(&target.relative, selector, shared.options.max_depth)
                .map(Some),
            None => {
                trace!("Child of '{}' not selected", scope.path_for(&target.relative));
                Ok(None)
            }
        }
    }

    /// Run every component against `target`, honouring conditions and cascade
    fn run(
        &self,
        instance: &T,
        target: &Target<'_, V>,
        shared: Shared<'_>,
        scope: &Scope,
        failures: &mut Vec<ValidationFailure>,
    ) -> Result<usize> {
        let cascade = self.cascade_mode(shared, scope);
        let start = failures.len();
        let mut site: Option<Site> = None;
        // Only nested paths requested: leave the value itself unchecked
        let own = scope.selector.selects_own(&self.candidates(target));

        for component in &self.components {
            shared.cancellation.check()?;
            if !component.applies(instance) {
                continue;
            }
            if !own && !matches!(component.check, Check::Child(_)) {
                continue;
            }

            let before = failures.len();
            match &component.check {
                Check::Sync(validator) => {
                    let mut args = MessageArgs::new();
                    if !validator.is_valid(instance, target.value, &mut args) {
                        let site = site.get_or_insert_with(|| self.site(scope, target));
                        let violation = Violation {
                            code: validator.name(),
                            template: validator.default_message(),
                            args,
                        };
                        failures.push(component.failure(
                            site,
                            instance,
                            target.value,
                            violation,
                            shared.options,
                        ));
                    }
                }
                Check::Async(_) => {
                    return Err(ValidationError::AsyncRuleInSyncCall {
                        property: scope.path_for(&target.relative),
                    });
                }
                Check::Custom(custom) => {
                    let site: &Site = site.get_or_insert_with(|| self.site(scope, target));
                    let added =
                        component.run_custom(custom, instance, target.value, shared, scope, site)?;
                    failures.extend(added);
                }
                Check::Child(child) => {
                    if let Some(child_scope) = self.child_scope(shared, scope, target)? {
                        child.validate(target.value, shared, &child_scope, failures)?;
                    }
                }
            }

            component.notify(instance, &failures[before..]);
            if cascade == CascadeMode::Stop && failures.len() > before {
                break;
            }
        }

        Ok(failures.len() - start)
    }

    async fn run_async(
        &self,
        instance: &T,
        target: &Target<'_, V>,
        shared: Shared<'_>,
        scope: &Scope,
        failures: &mut Vec<ValidationFailure>,
    ) -> Result<usize> {
        let cascade = self.cascade_mode(shared, scope);
        let start = failures.len();
        let mut site: Option<Site> = None;
        // Only nested paths requested: leave the value itself unchecked
        let own = scope.selector.selects_own(&self.candidates(target));

        for component in &self.components {
            shared.cancellation.check()?;
            if !component.applies(instance) {
                continue;
            }
            if !own && !matches!(component.check, Check::Child(_)) {
                continue;
            }

            let before = failures.len();
            match &component.check {
                Check::Sync(validator) => {
                    let mut args = MessageArgs::new();
                    if !validator.is_valid(instance, target.value, &mut args) {
                        let site = site.get_or_insert_with(|| self.site(scope, target));
                        let violation = Violation {
                            code: validator.name(),
                            template: validator.default_message(),
                            args,
                        };
                        failures.push(component.failure(
                            site,
                            instance,
                            target.value,
                            violation,
                            shared.options,
                        ));
                    }
                }
                Check::Async(validator) => {
                    let mut args = MessageArgs::new();
                    let outcome = tokio::select! {
                        biased;
                        _ = shared.cancellation.cancelled() => return Err(ValidationError::Cancelled),
                        outcome = validator.is_valid(instance, target.value, &mut args) => outcome,
                    };
                    let valid = outcome.map_err(|source| ValidationError::Rule {
                        property: scope.path_for(&target.relative),
                        source,
                    })?;
                    if !valid {
                        let site = site.get_or_insert_with(|| self.site(scope, target));
                        let violation = Violation {
                            code: validator.name(),
                            template: validator.default_message(),
                            args,
                        };
                        failures.push(component.failure(
                            site,
                            instance,
                            target.value,
                            violation,
                            shared.options,
                        ));
                    }
                }
                Check::Custom(custom) => {
                    let site: &Site = site.get_or_insert_with(|| self.site(scope, target));
                    let added =
                        component.run_custom(custom, instance, target.value, shared, scope, site)?;
                    failures.extend(added);
                }
                Check::Child(child) => {
                    if let Some(child_scope) = self.child_scope(shared, scope, target)? {
                        child
                            .validate_async(target.value, shared, &child_scope, failures)
                            .await?;
                    }
                }
            }

            component.notify(instance, &failures[before..]);
            if cascade == CascadeMode::Stop && failures.len() > before {
                break;
            }
        }

        Ok(failures.len() - start)
    }

    /// Failure callback, or dependent rules when the rule passed
    fn finish(
        &self,
        instance: &T,
        shared: Shared<'_>,
        scope: &Scope,
        failures: &mut Vec<ValidationFailure>,
        start: usize,
    ) -> Result<()> {
        if failures.len() > start {
            if let Some(callback) = &self.on_any_failure {
                callback(instance, &failures[start..]);
            }
            return Ok(());
        }

        for dependent in self.selected_dependents(instance, scope) {
            dependent.rule.validate(instance, shared, scope, failures)?;
        }
        Ok(())
    }

    async fn finish_async(
        &self,
        instance: &T,
        shared: Shared<'_>,
        scope: &Scope,
        failures: &mut Vec<ValidationFailure>,
        start: usize,
    ) -> Result<()> {
        if failures.len() > start {
            if let Some(callback) = &self.on_any_failure {
                callback(instance, &failures[start..]);
            }
            return Ok(());
        }

        let dependents: Vec<&RuleEntry<T>> = self.selected_dependents(instance, scope).collect();
        for dependent in dependents {
            dependent
                .rule
                .validate_async(instance, shared, scope, failures)
                .await?;
        }
        Ok(())
    }

    fn selected_dependents<'s>(
        &'s self,
        instance: &'s T,
        scope: &'s Scope,
    ) -> impl Iterator<Item = &'s RuleEntry<T>> + 's {
        let gated = !self.conditions_hold(instance);
        self.dependents.iter().filter(move |entry| {
            !gated && scope.selector.selects_property(entry.rule.path()) && entry.applies(instance)
        })
    }

    /// Rule-level `when` / `unless` conditions, wherever they were declared
    fn conditions_hold(&self, instance: &T) -> bool {
        self.rule_conditions.iter().all(|condition| condition(instance))
    }
}

/// Rule over a single property
pub(crate) struct PropertyRule<T, P> {
    core: RuleCore<T, P>,
    accessor: Box<dyn Fn(&T) -> &P + Send + Sync>,
}

impl<T, P> PropertyRule<T, P>
where
    T: Send + Sync + 'static,
    P: Serialize + Send + Sync + 'static,
{
    /// Registry validator for the property's type and its scope, when
    /// implicit child validation applies
    fn implicit(
        &self,
        instance: &T,
        shared: Shared<'_>,
        scope: &Scope,
        added: usize,
    ) -> Result<Option<(Arc<dyn ImplicitValidator>, Scope)>> {
        if !shared.options.implicitly_validate_child_properties || self.core.has_child() {
            return Ok(None);
        }
        if added > 0 && self.core.cascade_mode(shared, scope) == CascadeMode::Stop {
            return Ok(None);
        }
        if !self.core.conditions_hold(instance) {
            return Ok(None);
        }
        let Some(implicit) = shared.registry.and_then(|registry| registry.implicit::<P>()) else {
            return Ok(None);
        };
        let Some(selector) = scope.selector.for_child(std::slice::from_ref(&self.core.path))
        else {
            return Ok(None);
        };

        let child_scope = scope.child(&self.core.path, selector, shared.options.max_depth)?;
        Ok(Some((implicit, child_scope)))
    }

    fn target<'v>(&self, value: &'v P) -> Target<'v, P> {
        Target {
            value,
            relative: self.core.path.clone(),
            index: None,
        }
    }
}

#[async_trait]
impl<T, P> Rule<T> for PropertyRule<T, P>
where
    T: Send + Sync + 'static,
    P: Serialize + Send + Sync + 'static,
{
    fn path(&self) -> &str {
        &self.core.path
    }

    fn is_async(&self) -> bool {
        self.core.is_async()
    }

    fn validate(
        &self,
        instance: &T,
        shared: Shared<'_>,
        scope: &Scope,
        failures: &mut Vec<ValidationFailure>,
    ) -> Result<()> {
        let start = failures.len();
        let value = (self.accessor)(instance);
        let added = self
            .core
            .run(instance, &self.target(value), shared, scope, failures)?;

        if let Some((implicit, child_scope)) = self.implicit(instance, shared, scope, added)? {
            implicit.validate(value, shared, &child_scope, failures)?;
        }

        self.core.finish(instance, shared, scope, failures, start)
    }

    async fn validate_async(
        &self,
        instance: &T,
        shared: Shared<'_>,
        scope: &Scope,
        failures: &mut Vec<ValidationFailure>,
    ) -> Result<()> {
        let start = failures.len();
        let value = (self.accessor)(instance);
        let added = self
            .core
            .run_async(instance, &self.target(value), shared, scope, failures)
            .await?;

        if let Some((implicit, child_scope)) = self.implicit(instance, shared, scope, added)? {
            implicit
                .validate_async(value, shared, &child_scope, failures)
                .await?;
        }

        self.core
            .finish_async(instance, shared, scope, failures, start)
            .await
    }
}

/// Rule applied to every element of a sequence
pub(crate) struct CollectionRule<T, C: Elements> {
    core: RuleCore<T, C::Item>,
    accessor: Box<dyn Fn(&T) -> &C + Send + Sync>,
    filter: Option<ElementFilter<C::Item>>,
}

impl<T, C> CollectionRule<T, C>
where
    T: Send + Sync + 'static,
    C: Elements + Send + Sync + 'static,
    C::Item: Serialize + Send + Sync + 'static,
{
    fn targets<'v>(&self, collection: &'v C, selector: &Selector) -> Vec<Target<'v, C::Item>> {
        collection
            .elements()
            .iter()
            .enumerate()
            .map(|(index, element)| Target {
                value: element,
                relative: format!("{}[{}]", self.core.path, index),
                index: Some(index),
            })
            .filter(|target| {
                if !selector.selects_element(&self.core.path, &target.relative) {
                    return false;
                }
                let keep = self.filter.as_ref().is_none_or(|filter| filter(target.value));
                if !keep {
                    trace!("Element '{}' filtered out", target.relative);
                }
                keep
            })
            .collect()
    }
}

#[async_trait]
impl<T, C> Rule<T> for CollectionRule<T, C>
where
    T: Send + Sync + 'static,
    C: Elements + Send + Sync + 'static,
    C::Item: Serialize + Send + Sync + 'static,
{
    fn path(&self) -> &str {
        &self.core.path
    }

    fn is_async(&self) -> bool {
        self.core.is_async()
    }

    fn validate(
        &self,
        instance: &T,
        shared: Shared<'_>,
        scope: &Scope,
        failures: &mut Vec<ValidationFailure>,
    ) -> Result<()> {
        let start = failures.len();
        for target in self.targets((self.accessor)(instance), &scope.selector) {
            self.core.run(instance, &target, shared, scope, failures)?;
        }
        self.core.finish(instance, shared, scope, failures, start)
    }

    async fn validate_async(
        &self,
        instance: &T,
        shared: Shared<'_>,
        scope: &Scope,
        failures: &mut Vec<ValidationFailure>,
    ) -> Result<()> {
        let start = failures.len();
        for target in self.targets((self.accessor)(instance), &scope.selector) {
            self.core
                .run_async(instance, &target, shared, scope, failures)
                .await?;
        }
        self.core
            .finish_async(instance, shared, scope, failures, start)
            .await
    }
}

/// Marker for rules over a single property
pub struct Single;

/// Marker for rules over each element of a collection
pub struct Each;

/// Configures one rule. Obtained from `ValidatorBuilder::rule_for` and
/// `ValidatorBuilder::rule_for_each`.
///
/// Message, code, severity, state, `when_current` and `on_failure` settings
/// apply to the component declared last; `when` and `unless` gate every
/// component declared before them.
pub struct RuleBuilder<T, V, S = Single> {
    core: RuleCore<T, V>,
    filter: Option<ElementFilter<V>>,
    _shape: PhantomData<fn() -> S>,
}

impl<T, V, S> RuleBuilder<T, V, S>
where
    T: Send + Sync + 'static,
    V: Serialize + Send + Sync + 'static,
{
    pub(crate) fn new(path: impl Into<String>) -> Self {
        Self {
            core: RuleCore::new(path.into()),
            filter: None,
            _shape: PhantomData,
        }
    }

    fn push(mut self, check: Check<T, V>) -> Self {
        self.core.components.push(Component::new(check));
        self
    }

    fn configure_last(mut self, configure: impl FnOnce(&mut Component<T, V>)) -> Self {
        if let Some(component) = self.core.components.last_mut() {
            configure(component);
        }
        self
    }

    /// Cascade mode for this rule, overriding the validator's
    pub fn cascade(mut self, mode: CascadeMode) -> Self {
        self.core.cascade = Some(mode);
        self
    }

    /// Display name used for `{PropertyName}`
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.core.display_name = Some(name.into());
        self
    }

    /// Property path reported on failures
    pub fn override_property_name(mut self, name: impl Into<String>) -> Self {
        self.core.path = name.into();
        self
    }

    pub fn with_message(self, template: impl Into<String>) -> Self {
        let template = template.into();
        self.configure_last(|component| component.message = Some(Message::Template(template)))
    }

    /// Build the message from the instance and the value
    pub fn with_message_fn<F>(self, build: F) -> Self
    where
        F: Fn(&T, &V) -> String + Send + Sync + 'static,
    {
        self.configure_last(|component| {
            component.message = Some(Message::Dynamic(Box::new(build)))
        })
    }

    pub fn with_error_code(self, code: impl Into<String>) -> Self {
        let code = code.into();
        self.configure_last(|component| component.error_code = Some(code))
    }

    pub fn with_severity(self, severity: Severity) -> Self {
        self.configure_last(|component| component.severity = Some(severity))
    }

    /// Attach custom state to failures of the last component
    pub fn with_state(self, state: impl Into<serde_json::Value>) -> Self {
        let state = state.into();
        self.configure_last(|component| component.state = Some(state))
    }

    /// Run the components declared so far only when `condition` holds
    pub fn when<F>(mut self, condition: F) -> Self
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        let condition: Condition<T> = Arc::new(condition);
        for component in &mut self.core.components {
            component.conditions.push(Arc::clone(&condition));
        }
        self.core.rule_conditions.push(condition);
        self
    }

    pub fn unless<F>(self, condition: F) -> Self
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        self.when(move |instance| !condition(instance))
    }

    /// Gate only the last component
    pub fn when_current<F>(self, condition: F) -> Self
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        self.configure_last(|component| component.conditions.push(Arc::new(condition)))
    }

    pub fn unless_current<F>(self, condition: F) -> Self
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        self.when_current(move |instance| !condition(instance))
    }

    /// Called for each failure of the last component, after it was recorded
    pub fn on_failure<F>(self, callback: F) -> Self
    where
        F: Fn(&T, &ValidationFailure) + Send + Sync + 'static,
    {
        self.configure_last(|component| component.on_failure = Some(Arc::new(callback)))
    }

    /// Called once with all failures of a rule invocation that failed
    pub fn on_any_failure<F>(mut self, callback: F) -> Self
    where
        F: Fn(&T, &[ValidationFailure]) + Send + Sync + 'static,
    {
        self.core.on_any_failure = Some(Arc::new(callback));
        self
    }

    /// Rules that run only when this rule produced no failures. The rule's
    /// `when` / `unless` conditions gate them too.
    pub fn dependent_rules<F>(mut self, configure: F) -> Self
    where
        F: FnOnce(ValidatorBuilder<T>) -> ValidatorBuilder<T>,
    {
        self.core
            .dependents
            .extend(configure(ValidatorBuilder::new()).into_entries());
        self
    }

    // Predicates and extension points

    pub fn must<F>(self, predicate: F) -> Self
    where
        F: Fn(&V) -> bool + Send + Sync + 'static,
    {
        self.must_with(move |_: &T, value: &V| predicate(value))
    }

    /// Predicate over the whole instance and the value
    pub fn must_with<F>(self, predicate: F) -> Self
    where
        F: Fn(&T, &V) -> bool + Send + Sync + 'static,
    {
        self.set_property_validator(Predicate::new(predicate))
    }

    /// Awaited predicate; only runs under `validate_async`
    pub fn must_async<F>(self, predicate: F) -> Self
    where
        F: for<'a> Fn(&'a T, &'a V) -> BoxFuture<'a, std::result::Result<bool, RuleError>>
            + Send
            + Sync
            + 'static,
    {
        self.set_async_validator(AsyncPredicate::new(predicate))
    }

    /// Free-form check that reports failures through the context
    pub fn custom<F>(self, check: F) -> Self
    where
        F: Fn(&V, &mut CustomContext<'_, T>) -> std::result::Result<(), RuleError>
            + Send
            + Sync
            + 'static,
    {
        self.push(Check::Custom(Box::new(check)))
    }

    pub fn set_property_validator<P>(self, validator: P) -> Self
    where
        P: PropertyValidator<T, V> + 'static,
    {
        self.push(Check::Sync(Box::new(validator)))
    }

    pub fn set_async_validator<P>(self, validator: P) -> Self
    where
        P: AsyncPropertyValidator<T, V> + 'static,
    {
        self.push(Check::Async(Box::new(validator)))
    }

    /// Validate the value with another validator; failures are prefixed
    /// with this rule's path
    pub fn set_validator<C>(self, validator: Arc<Validator<C>>) -> Self
    where
        C: Send + Sync + 'static,
        V: AsChild<C>,
    {
        self.push(Check::Child(Box::new(ChildValidator { validator })))
    }

    /// Validate the value with the registry's validator for `C`
    pub fn inject_validator<C>(self) -> Self
    where
        C: Send + Sync + 'static,
        V: AsChild<C>,
    {
        self.push(Check::Child(Box::new(InjectedValidator::<C> {
            _child: PhantomData,
        })))
    }

    /// Declare an inline child validator
    pub fn child_rules<C, F>(self, configure: F) -> Self
    where
        C: Send + Sync + 'static,
        V: AsChild<C>,
        F: FnOnce(ValidatorBuilder<C>) -> ValidatorBuilder<C>,
    {
        self.set_validator(Arc::new(configure(ValidatorBuilder::new()).build()))
    }

    // Comparisons

    pub fn equal(self, value: V) -> Self
    where
        V: PartialEq,
    {
        self.set_property_validator(Equality::equal(ValueSource::Fixed(value)))
    }

    pub fn not_equal(self, value: V) -> Self
    where
        V: PartialEq,
    {
        self.set_property_validator(Equality::not_equal(ValueSource::Fixed(value)))
    }

    /// Must equal another property of the same instance
    pub fn equal_to<F>(self, name: impl Into<String>, accessor: F) -> Self
    where
        V: PartialEq,
        F: Fn(&T) -> &V + Send + Sync + 'static,
    {
        self.set_property_validator(Equality::equal(ValueSource::Property {
            name: name.into(),
            accessor: Box::new(accessor),
        }))
    }

    pub fn not_equal_to<F>(self, name: impl Into<String>, accessor: F) -> Self
    where
        V: PartialEq,
        F: Fn(&T) -> &V + Send + Sync + 'static,
    {
        self.set_property_validator(Equality::not_equal(ValueSource::Property {
            name: name.into(),
            accessor: Box::new(accessor),
        }))
    }

    pub fn greater_than(self, value: V) -> Self
    where
        V: PartialOrd,
    {
        self.set_property_validator(Comparison::new(Comparator::GreaterThan, ValueSource::Fixed(value)))
    }

    pub fn greater_than_or_equal(self, value: V) -> Self
    where
        V: PartialOrd,
    {
        self.set_property_validator(Comparison::new(
            Comparator::GreaterThanOrEqual,
            ValueSource::Fixed(value),
        ))
    }

    pub fn less_than(self, value: V) -> Self
    where
        V: PartialOrd,
    {
        self.set_property_validator(Comparison::new(Comparator::LessThan, ValueSource::Fixed(value)))
    }

    pub fn less_than_or_equal(self, value: V) -> Self
    where
        V: PartialOrd,
    {
        self.set_property_validator(Comparison::new(
            Comparator::LessThanOrEqual,
            ValueSource::Fixed(value),
        ))
    }

    pub fn greater_than_property<F>(self, name: impl Into<String>, accessor: F) -> Self
    where
        V: PartialOrd,
        F: Fn(&T) -> &V + Send + Sync + 'static,
    {
        self.set_property_validator(Comparison::new(
            Comparator::GreaterThan,
            ValueSource::Property {
                name: name.into(),
                accessor: Box::new(accessor),
            },
        ))
    }

    pub fn less_than_property<F>(self, name: impl Into<String>, accessor: F) -> Self
    where
        V: PartialOrd,
        F: Fn(&T) -> &V + Send + Sync + 'static,
    {
        self.set_property_validator(Comparison::new(
            Comparator::LessThan,
            ValueSource::Property {
                name: name.into(),
                accessor: Box::new(accessor),
            },
        ))
    }

    /// `from <= value <= to`
    pub fn inclusive_between(self, from: V, to: V) -> Self
    where
        V: PartialOrd,
    {
        self.set_property_validator(Between {
            from,
            to,
            inclusive: true,
        })
    }

    /// `from < value < to`
    pub fn exclusive_between(self, from: V, to: V) -> Self
    where
        V: PartialOrd,
    {
        self.set_property_validator(Between {
            from,
            to,
            inclusive: false,
        })
    }

    // Presence

    pub fn not_null(self) -> Self
    where
        V: Nullable,
    {
        self.set_property_validator(NotNull)
    }

    pub fn null(self) -> Self
    where
        V: Nullable,
    {
        self.set_property_validator(Null)
    }

    pub fn not_empty(self) -> Self
    where
        V: Emptiness,
    {
        self.set_property_validator(NotEmpty)
    }

    pub fn empty(self) -> Self
    where
        V: Emptiness,
    {
        self.set_property_validator(Empty)
    }

    // Text

    pub fn length(self, min: usize, max: usize) -> Self
    where
        V: TextValue,
    {
        self.set_property_validator(Length::between(min, max))
    }

    pub fn min_length(self, min: usize) -> Self
    where
        V: TextValue,
    {
        self.set_property_validator(Length::minimum(min))
    }

    pub fn max_length(self, max: usize) -> Self
    where
        V: TextValue,
    {
        self.set_property_validator(Length::maximum(max))
    }

    pub fn exact_length(self, length: usize) -> Self
    where
        V: TextValue,
    {
        self.set_property_validator(Length::exact(length))
    }

    pub fn matches(self, regex: Regex) -> Self
    where
        V: TextValue,
    {
        self.set_property_validator(Matches(regex))
    }

    pub fn email_address(self) -> Self
    where
        V: TextValue,
    {
        self.set_property_validator(EmailAddress)
    }

    pub fn credit_card(self) -> Self
    where
        V: TextValue,
    {
        self.set_property_validator(CreditCard)
    }

    // Numbers

    /// At most `precision` digits in total, `scale` of them after the point
    pub fn precision_scale(self, precision: u32, scale: u32, ignore_trailing_zeros: bool) -> Self
    where
        V: DecimalValue,
    {
        self.set_property_validator(PrecisionScale {
            precision,
            scale,
            ignore_trailing_zeros,
        })
    }
}

impl<T, V> RuleBuilder<T, V, Each>
where
    T: Send + Sync + 'static,
    V: Serialize + Send + Sync + 'static,
{
    /// Skip elements for which `predicate` is false, without failures
    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&V) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(predicate));
        self
    }

    pub(crate) fn into_collection_rule<C>(
        self,
        accessor: Box<dyn Fn(&T) -> &C + Send + Sync>,
    ) -> CollectionRule<T, C>
    where
        C: Elements<Item = V>,
    {
        CollectionRule {
            core: self.core,
            accessor,
            filter: self.filter,
        }
    }
}

impl<T, P> RuleBuilder<T, P, Single>
where
    T: Send + Sync + 'static,
    P: Serialize + Send + Sync + 'static,
{
    pub(crate) fn into_property_rule(
        self,
        accessor: Box<dyn Fn(&T) -> &P + Send + Sync>,
    ) -> PropertyRule<T, P> {
        PropertyRule {
            core: self.core,
            accessor,
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::{CascadeMode, Severity, Validator};
    use serde::Serialize;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Debug, Default, Serialize)]
    struct Customer {
        first_name: String,
        last_name: Option<String>,
        discount: i32,
    }

    #[test]
    fn test_stop_cascade_per_rule() {
        let validator = Validator::<Customer>::builder()
            .rule_for("FirstName", |c| &c.first_name, |rule| {
                rule.cascade(CascadeMode::Stop)
                    .not_empty()
                    .not_equal("Foo".to_string())
            })
            .rule_for("Discount", |c| &c.discount, |rule| rule.greater_than(0))
            .build();

        let result = validator.validate(&Customer::default()).unwrap();
        assert_eq!(result.failures.len(), 2);
        assert_eq!(result.failures[0].error_code, "notEmpty");
        assert_eq!(result.failures[1].property, "Discount");
    }

    #[test]
    fn test_continue_cascade_reports_every_component() {
        let validator = Validator::<Customer>::builder()
            .rule_for("FirstName", |c| &c.first_name, |rule| {
                rule.not_empty().min_length(3)
            })
            .build();

        let result = validator.validate(&Customer::default()).unwrap();
        assert_eq!(result.failures.len(), 2);
    }

    #[test]
    fn test_when_gates_earlier_components_only() {
        let validator = Validator::<Customer>::builder()
            .rule_for("FirstName", |c| &c.first_name, |rule| {
                rule.not_empty()
                    .when(|c| c.discount > 0)
                    .min_length(3)
            })
            .build();

        let result = validator.validate(&Customer::default()).unwrap();
        assert_eq!(result.failures.len(), 1);
        assert_eq!(result.failures[0].error_code, "minLength");
    }

    #[test]
    fn test_when_current_gates_last_component() {
        let validator = Validator::<Customer>::builder()
            .rule_for("FirstName", |c| &c.first_name, |rule| {
                rule.not_empty()
                    .min_length(3)
                    .unless_current(|c| c.discount == 0)
            })
            .build();

        let result = validator.validate(&Customer::default()).unwrap();
        assert_eq!(result.failures.len(), 1);
        assert_eq!(result.failures[0].error_code, "notEmpty");
    }

    #[derive(Debug, Default)]
    struct Order {
        discount: Option<i32>,
        price: Option<u32>,
    }

    #[test]
    fn test_missing_values_pass_comparisons() {
        let validator = Validator::<Order>::builder()
            .rule_for("Discount", |o| &o.discount, |rule| rule.greater_than(Some(0)))
            .rule_for("Price", |o| &o.price, |rule| {
                rule.inclusive_between(Some(1), Some(50))
            })
            .build();

        assert!(validator.validate(&Order::default()).unwrap().is_valid());

        let order = Order {
            discount: Some(0),
            price: Some(70),
        };
        let result = validator.validate(&order).unwrap();
        assert_eq!(result.failures[0].message, "'Discount' must be greater than '0'.");
        assert_eq!(
            result.failures[1].message,
            "'Price' must be between 1 and 50. You entered 70."
        );
    }

    #[test]
    fn test_message_overrides() {
        let validator = Validator::<Customer>::builder()
            .rule_for("LastName", |c| &c.last_name, |rule| {
                rule.not_empty()
                    .with_name("Surname")
                    .with_message("{PropertyName} is required")
                    .with_error_code("surnameRequired")
                    .with_severity(Severity::Warning)
                    .with_state(serde_json::json!({ "field": 7 }))
            })
            .build();

        let result = validator.validate(&Customer::default()).unwrap();
        let failure = &result.failures[0];
        assert_eq!(failure.property, "LastName");
        assert_eq!(failure.message, "Surname is required");
        assert_eq!(failure.error_code, "surnameRequired");
        assert_eq!(failure.severity, Severity::Warning);
        assert_eq!(failure.state, Some(serde_json::json!({ "field": 7 })));
        assert_eq!(failure.attempted_value, None);
    }

    #[test]
    fn test_message_fn_and_property_value() {
        let validator = Validator::<Customer>::builder()
            .rule_for("Discount", |c| &c.discount, |rule| {
                rule.inclusive_between(1, 50)
                    .with_message_fn(|c, _| format!("{} gets {{PropertyValue}}", c.first_name))
            })
            .build();

        let customer = Customer {
            first_name: "Ada".to_string(),
            discount: 70,
            ..Default::default()
        };
        let result = validator.validate(&customer).unwrap();
        assert_eq!(result.failures[0].message, "Ada gets 70");
        assert_eq!(result.failures[0].attempted_value, Some(serde_json::json!(70)));
        assert_eq!(result.failures[0].placeholders["From"], "1");
    }

    #[test]
    fn test_override_property_name() {
        let validator = Validator::<Customer>::builder()
            .rule_for("FirstName", |c| &c.first_name, |rule| {
                rule.override_property_name("GivenName").not_empty()
            })
            .build();

        let result = validator.validate(&Customer::default()).unwrap();
        assert_eq!(result.failures[0].property, "GivenName");
        assert_eq!(result.failures[0].message, "'Given Name' must not be empty.");
    }

    #[test]
    fn test_failure_callbacks() {
        let each = Arc::new(AtomicUsize::new(0));
        let any = Arc::new(AtomicUsize::new(0));
        let (each_seen, any_seen) = (Arc::clone(&each), Arc::clone(&any));

        let validator = Validator::<Customer>::builder()
            .rule_for("FirstName", |c| &c.first_name, move |rule| {
                rule.not_empty()
                    .on_failure(move |_, failure| {
                        assert_eq!(failure.error_code, "notEmpty");
                        each_seen.fetch_add(1, Ordering::SeqCst);
                    })
                    .min_length(2)
                    .on_any_failure(move |_, failures| {
                        any_seen.fetch_add(failures.len(), Ordering::SeqCst);
                    })
            })
            .build();

        validator.validate(&Customer::default()).unwrap();
        assert_eq!(each.load(Ordering::SeqCst), 1);
        assert_eq!(any.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_dependent_rules_run_after_success() {
        let validator = Validator::<Customer>::builder()
            .rule_for("FirstName", |c| &c.first_name, |rule| {
                rule.not_empty().dependent_rules(|rules| {
                    rules.rule_for("LastName", |c| &c.last_name, |rule| rule.not_null())
                })
            })
            .build();

        let result = validator.validate(&Customer::default()).unwrap();
        assert_eq!(result.failures.len(), 1);
        assert_eq!(result.failures[0].property, "FirstName");

        let named = Customer {
            first_name: "Ada".to_string(),
            ..Default::default()
        };
        let result = validator.validate(&named).unwrap();
        assert_eq!(result.failures.len(), 1);
        assert_eq!(result.failures[0].property, "LastName");
    }

    #[test]
    fn test_rule_condition_gates_dependent_rules() {
        let validator = Validator::<Customer>::builder()
            .rule_for("FirstName", |c| &c.first_name, |rule| {
                rule.not_empty()
                    .dependent_rules(|rules| {
                        rules.rule_for("LastName", |c| &c.last_name, |rule| rule.not_null())
                    })
                    .when(|c| c.discount > 0)
            })
            .build();

        let named = Customer {
            first_name: "Ada".to_string(),
            ..Default::default()
        };
        assert!(validator.validate(&named).unwrap().is_valid());

        let preferred = Customer {
            first_name: "Ada".to_string(),
            discount: 5,
            ..Default::default()
        };
        let result = validator.validate(&preferred).unwrap();
        assert_eq!(result.failures.len(), 1);
        assert_eq!(result.failures[0].property, "LastName");
    }

    #[test]
    fn test_custom_rule_failures() {
        let validator = Validator::<Customer>::builder()
            .rule_for("Discount", |c| &c.discount, |rule| {
                rule.custom(|discount, context| {
                    if *discount < 0 {
                        context.add_failure("{PropertyName} cannot be negative");
                        context.add_failure_for("FirstName", "check the name too");
                    }
                    Ok(())
                })
                .with_error_code("negative")
            })
            .build();

        let customer = Customer {
            discount: -5,
            ..Default::default()
        };
        let result = validator.validate(&customer).unwrap();
        assert_eq!(result.failures.len(), 2);
        assert_eq!(result.failures[0].message, "Discount cannot be negative");
        assert_eq!(result.failures[0].error_code, "negative");
        assert_eq!(result.failures[1].property, "FirstName");
    }

    #[test]
    fn test_custom_rule_error_propagates() {
        let validator = Validator::<Customer>::builder()
            .rule_for("Discount", |c| &c.discount, |rule| {
                rule.custom(|_, _| Err("lookup failed".into()))
            })
            .build();

        let error = validator.validate(&Customer::default()).unwrap_err();
        assert!(matches!(error, crate::ValidationError::Rule { ref property, .. } if property == "Discount"));
    }
}
