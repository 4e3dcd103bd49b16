// Validation traits

use crate::{MessageArgs, RuleError};
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// A synchronous constraint on a property value.
///
/// Implement this to add reusable checks beyond the built-in ones; attach
/// them with `RuleBuilder::set_property_validator`.
pub trait PropertyValidator<T, P>: Send + Sync {
    /// Error code recorded on failures
    fn name(&self) -> &'static str;

    /// Message template used when the rule does not provide one
    fn default_message(&self) -> &'static str;

    /// Check the value. Placeholders for the message go into `args`.
    fn is_valid(&self, instance: &T, value: &P, args: &mut MessageArgs) -> bool;
}

/// A constraint that has to await I/O (e.g. an existence check)
#[async_trait]
pub trait AsyncPropertyValidator<T, P>: Send + Sync {
    fn name(&self) -> &'static str {
        "asyncPredicate"
    }

    fn default_message(&self) -> &'static str {
        crate::validators::PREDICATE_MESSAGE
    }

    async fn is_valid(
        &self,
        instance: &T,
        value: &P,
        args: &mut MessageArgs,
    ) -> Result<bool, RuleError>;
}

/// Values that can be absent
pub trait Nullable {
    fn is_null(&self) -> bool;
}

impl<V> Nullable for Option<V> {
    fn is_null(&self) -> bool {
        self.is_none()
    }
}

/// Values with an "empty" state: absent, blank text, empty collection or default number
pub trait Emptiness {
    fn is_empty_value(&self) -> bool;
}

impl Emptiness for String {
    fn is_empty_value(&self) -> bool {
        self.trim().is_empty()
    }
}

impl<E> Emptiness for Vec<E> {
    fn is_empty_value(&self) -> bool {
        self.is_empty()
    }
}

impl<K, V, S> Emptiness for HashMap<K, V, S> {
    fn is_empty_value(&self) -> bool {
        self.is_empty()
    }
}

impl<K, V> Emptiness for BTreeMap<K, V> {
    fn is_empty_value(&self) -> bool {
        self.is_empty()
    }
}

impl<V: Emptiness> Emptiness for Option<V> {
    fn is_empty_value(&self) -> bool {
        match self {
            Some(value) => value.is_empty_value(),
            None => true,
        }
    }
}

impl Emptiness for bool {
    fn is_empty_value(&self) -> bool {
        !*self
    }
}

impl Emptiness for Decimal {
    fn is_empty_value(&self) -> bool {
        self.is_zero()
    }
}

macro_rules! impl_emptiness_for_numbers {
    ($($ty:ty),*) => {
        $(
            impl Emptiness for $ty {
                fn is_empty_value(&self) -> bool {
                    *self == <$ty>::default()
                }
            }
        )*
    };
}

impl_emptiness_for_numbers!(i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize, f32, f64);

/// Values that expose text; `None` means there is nothing to check
pub trait TextValue {
    fn text(&self) -> Option<&str>;
}

impl TextValue for String {
    fn text(&self) -> Option<&str> {
        Some(self.as_str())
    }
}

impl TextValue for Option<String> {
    fn text(&self) -> Option<&str> {
        self.as_deref()
    }
}

/// Values that expose a decimal number
pub trait DecimalValue {
    fn decimal(&self) -> Option<Decimal>;
}

impl DecimalValue for Decimal {
    fn decimal(&self) -> Option<Decimal> {
        Some(*self)
    }
}

impl DecimalValue for Option<Decimal> {
    fn decimal(&self) -> Option<Decimal> {
        *self
    }
}

/// Sequences a collection rule iterates; an absent collection has no elements
pub trait Elements {
    type Item;

    fn elements(&self) -> &[Self::Item];
}

impl<E> Elements for Vec<E> {
    type Item = E;

    fn elements(&self) -> &[E] {
        self.as_slice()
    }
}

impl<E> Elements for Option<Vec<E>> {
    type Item = E;

    fn elements(&self) -> &[E] {
        self.as_deref().unwrap_or(&[])
    }
}

impl<E, const N: usize> Elements for [E; N] {
    type Item = E;

    fn elements(&self) -> &[E] {
        self
    }
}

/// Values a child validator for `C` can run against
pub trait AsChild<C> {
    fn as_child(&self) -> Option<&C>;
}

impl<C> AsChild<C> for C {
    fn as_child(&self) -> Option<&C> {
        Some(self)
    }
}

impl<C> AsChild<C> for Option<C> {
    fn as_child(&self) -> Option<&C> {
        self.as_ref()
    }
}

impl<C> AsChild<C> for Box<C> {
    fn as_child(&self) -> Option<&C> {
        Some(self.as_ref())
    }
}

impl<C> AsChild<C> for Arc<C> {
    fn as_child(&self) -> Option<&C> {
        Some(self.as_ref())
    }
}
