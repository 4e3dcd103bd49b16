//! Validator registry

use crate::context::{Scope, Shared};
use crate::{
    Result, ValidationContext, ValidationError, ValidationFailure, ValidationResult, Validator,
    ValidatorOptions,
};
use async_trait::async_trait;
use dashmap::DashMap;
use std::any::{type_name, Any, TypeId};
use std::sync::Arc;
use tracing::debug;

/// Runs a registered validator against a property value of unknown type
#[async_trait]
pub(crate) trait ImplicitValidator: Send + Sync {
    fn validate(
        &self,
        value: &(dyn Any + Send + Sync),
        shared: Shared<'_>,
        scope: &Scope,
        failures: &mut Vec<ValidationFailure>,
    ) -> Result<()>;

    async fn validate_async(
        &self,
        value: &(dyn Any + Send + Sync),
        shared: Shared<'_>,
        scope: &Scope,
        failures: &mut Vec<ValidationFailure>,
    ) -> Result<()>;
}

/// How a property holds the registered type
#[derive(Debug, Clone, Copy)]
enum Shape {
    Value,
    Optional,
    Sequence,
}

struct Implicit<C> {
    validator: Arc<Validator<C>>,
    shape: Shape,
}

impl<C: Send + Sync + 'static> Implicit<C> {
    fn children<'v>(&self, value: &'v (dyn Any + Send + Sync)) -> Vec<(Option<usize>, &'v C)> {
        match self.shape {
            Shape::Value => value
                .downcast_ref::<C>()
                .map(|child| vec![(None, child)])
                .unwrap_or_default(),
            Shape::Optional => value
                .downcast_ref::<Option<C>>()
                .and_then(Option::as_ref)
                .map(|child| vec![(None, child)])
                .unwrap_or_default(),
            Shape::Sequence => value
                .downcast_ref::<Vec<C>>()
                .map(|items| {
                    items
                        .iter()
                        .enumerate()
                        .map(|(index, child)| (Some(index), child))
                        .collect()
                })
                .unwrap_or_default(),
        }
    }
}

fn element_scope(scope: &Scope, index: Option<usize>) -> Scope {
    match index {
        Some(index) => scope.element(index),
        None => scope.clone(),
    }
}

#[async_trait]
impl<C: Send + Sync + 'static> ImplicitValidator for Implicit<C> {
    fn validate(
        &self,
        value: &(dyn Any + Send + Sync),
        shared: Shared<'_>,
        scope: &Scope,
        failures: &mut Vec<ValidationFailure>,
    ) -> Result<()> {
        for (index, child) in self.children(value) {
            let scope = element_scope(scope, index);
            self.validator.execute(Some(child), shared, &scope, failures)?;
        }
        Ok(())
    }

    async fn validate_async(
        &self,
        value: &(dyn Any + Send + Sync),
        shared: Shared<'_>,
        scope: &Scope,
        failures: &mut Vec<ValidationFailure>,
    ) -> Result<()> {
        for (index, child) in self.children(value) {
            let scope = element_scope(scope, index);
            self.validator
                .execute_async(Some(child), shared, &scope, failures)
                .await?;
        }
        Ok(())
    }
}

/// Type-keyed collection of validators.
///
/// Used by `inject_validator`, by implicit child validation and as an
/// explicit lookup for callers. Cloning is cheap; clones share the same
/// validators.
///
/// ```
/// use affirm_validation::{Validator, ValidatorRegistry};
///
/// struct Address {
///     street: String,
/// }
///
/// let registry = ValidatorRegistry::new();
/// registry.register(
///     Validator::<Address>::builder()
///         .rule_for("Street", |a| &a.street, |rule| rule.not_empty())
///         .build(),
/// );
///
/// let result = registry.validate(&Address { street: String::new() }).unwrap();
/// assert!(result.has_error_for("Street"));
/// ```
#[derive(Clone)]
pub struct ValidatorRegistry {
    validators: Arc<DashMap<TypeId, Arc<dyn Any + Send + Sync>>>,
    implicit: Arc<DashMap<TypeId, Arc<dyn ImplicitValidator>>>,
    options: Arc<ValidatorOptions>,
}

impl Default for ValidatorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ValidatorRegistry {
    pub fn new() -> Self {
        Self::with_options(ValidatorOptions::default())
    }

    /// Create a registry whose contexts use `options`
    pub fn with_options(options: ValidatorOptions) -> Self {
        Self {
            validators: Arc::new(DashMap::new()),
            implicit: Arc::new(DashMap::new()),
            options: Arc::new(options),
        }
    }

    pub fn options(&self) -> &ValidatorOptions {
        &self.options
    }

    /// Register the validator for `T`, replacing any previous one
    pub fn register<T>(&self, validator: Validator<T>) -> Arc<Validator<T>>
    where
        T: Send + Sync + 'static,
    {
        let validator = Arc::new(validator);
        self.register_arc(Arc::clone(&validator));
        validator
    }

    pub fn register_arc<T>(&self, validator: Arc<Validator<T>>)
    where
        T: Send + Sync + 'static,
    {
        let stored: Arc<dyn Any + Send + Sync> = validator.clone();
        self.validators.insert(TypeId::of::<T>(), stored);

        for (type_id, shape) in [
            (TypeId::of::<T>(), Shape::Value),
            (TypeId::of::<Option<T>>(), Shape::Optional),
            (TypeId::of::<Vec<T>>(), Shape::Sequence),
        ] {
            let implicit: Arc<dyn ImplicitValidator> = Arc::new(Implicit {
                validator: Arc::clone(&validator),
                shape,
            });
            self.implicit.insert(type_id, implicit);
        }

        debug!("Registered validator for {}", type_name::<T>());
    }

    /// Validator registered for `T`
    pub fn get<T>(&self) -> Option<Arc<Validator<T>>>
    where
        T: Send + Sync + 'static,
    {
        self.validators
            .get(&TypeId::of::<T>())
            .and_then(|entry| Arc::clone(entry.value()).downcast::<Validator<T>>().ok())
    }

    pub fn contains<T: 'static>(&self) -> bool {
        self.validators.contains_key(&TypeId::of::<T>())
    }

    /// Number of registered validators
    pub fn len(&self) -> usize {
        self.validators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.validators.is_empty()
    }

    /// Context for `instance` that resolves child validators from this registry
    pub fn context<'a, T>(&self, instance: &'a T) -> ValidationContext<'a, T> {
        ValidationContext::new(instance).with_registry(self.clone())
    }

    /// Validate with the registered validator for `T`
    pub fn validate<T>(&self, instance: &T) -> Result<ValidationResult>
    where
        T: Send + Sync + 'static,
    {
        self.require::<T>()?
            .validate_context(&self.context(instance))
    }

    pub async fn validate_async<T>(&self, instance: &T) -> Result<ValidationResult>
    where
        T: Send + Sync + 'static,
    {
        let validator = self.require::<T>()?;
        validator
            .validate_context_async(&self.context(instance))
            .await
    }

    fn require<T>(&self) -> Result<Arc<Validator<T>>>
    where
        T: Send + Sync + 'static,
    {
        self.get::<T>().ok_or(ValidationError::ValidatorNotRegistered {
            type_name: type_name::<T>(),
        })
    }

    pub(crate) fn implicit<P: 'static>(&self) -> Option<Arc<dyn ImplicitValidator>> {
        self.implicit
            .get(&TypeId::of::<P>())
            .map(|entry| Arc::clone(entry.value()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Serialize;

    #[derive(Debug, Default, Serialize)]
    struct Address {
        street: String,
    }

    #[derive(Debug, Default, Serialize)]
    struct Customer {
        main_address: Option<Address>,
        previous_addresses: Vec<Address>,
        nickname: String,
    }

    fn registry(implicit: bool) -> ValidatorRegistry {
        let registry = ValidatorRegistry::with_options(
            ValidatorOptions::new().implicit_child_validation(implicit),
        );
        registry.register(
            Validator::<Address>::builder()
                .rule_for("Street", |a| &a.street, |rule| rule.not_empty())
                .build(),
        );
        registry.register(
            Validator::<Customer>::builder()
                .rule_for("MainAddress", |c| &c.main_address, |rule| rule)
                .rule_for("PreviousAddresses", |c| &c.previous_addresses, |rule| rule)
                .rule_for("Nickname", |c| &c.nickname, |rule| rule.max_length(3))
                .build(),
        );
        registry
    }

    fn sample() -> Customer {
        Customer {
            main_address: Some(Address::default()),
            previous_addresses: vec![
                Address {
                    street: "Main St".to_string(),
                },
                Address::default(),
            ],
            nickname: "Al".to_string(),
        }
    }

    #[test]
    fn test_register_and_get() {
        let registry = registry(false);
        assert_eq!(registry.len(), 2);
        assert!(registry.contains::<Address>());
        assert!(!registry.contains::<String>());
        assert!(registry.get::<Address>().is_some());
        assert!(registry.get::<String>().is_none());
    }

    #[test]
    fn test_unregistered_type() {
        let error = ValidatorRegistry::new().validate(&42u32).unwrap_err();
        assert!(matches!(error, ValidationError::ValidatorNotRegistered { .. }));
    }

    #[test]
    fn test_implicit_child_validation_disabled() {
        let result = registry(false).validate(&sample()).unwrap();
        assert!(result.is_valid());
    }

    #[test]
    fn test_implicit_child_validation() {
        let result = registry(true).validate(&sample()).unwrap();
        let properties: Vec<_> = result.failures.iter().map(|f| f.property.as_str()).collect();
        assert_eq!(
            properties,
            vec!["MainAddress.Street", "PreviousAddresses[1].Street"]
        );
    }

    #[tokio::test]
    async fn test_implicit_child_validation_async() {
        let result = registry(true).validate_async(&sample()).await.unwrap();
        assert_eq!(result.failures.len(), 2);
    }

    #[test]
    fn test_max_depth() {
        let registry = ValidatorRegistry::with_options(
            ValidatorOptions::new()
                .implicit_child_validation(true)
                .with_max_depth(0),
        );
        registry.register(
            Validator::<Address>::builder()
                .rule_for("Street", |a| &a.street, |rule| rule.not_empty())
                .build(),
        );
        registry.register(
            Validator::<Customer>::builder()
                .rule_for("MainAddress", |c| &c.main_address, |rule| rule)
                .build(),
        );

        let error = registry.validate(&sample()).unwrap_err();
        assert!(matches!(error, ValidationError::InvalidArgument(_)));
    }
}
