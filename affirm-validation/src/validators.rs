// Built-in property validators

use crate::message::{is_absent, render};
use crate::{
    AsyncPropertyValidator, DecimalValue, Emptiness, MessageArgs, Nullable, PropertyValidator,
    RuleError, TextValue,
};
use async_trait::async_trait;
use futures::future::BoxFuture;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

static EMAIL_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-zA-Z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)*$").unwrap()
});

pub(crate) const PREDICATE_MESSAGE: &str =
    "The specified condition was not met for '{PropertyName}'.";

// Presence validators

/// Fails when the value is absent
pub struct NotNull;

impl<T, P: Nullable> PropertyValidator<T, P> for NotNull {
    fn name(&self) -> &'static str {
        "notNull"
    }

    fn default_message(&self) -> &'static str {
        "'{PropertyName}' must not be empty."
    }

    fn is_valid(&self, _instance: &T, value: &P, _args: &mut MessageArgs) -> bool {
        !value.is_null()
    }
}

/// Fails when the value is present
pub struct Null;

impl<T, P: Nullable> PropertyValidator<T, P> for Null {
    fn name(&self) -> &'static str {
        "null"
    }

    fn default_message(&self) -> &'static str {
        "'{PropertyName}' must be empty."
    }

    fn is_valid(&self, _instance: &T, value: &P, _args: &mut MessageArgs) -> bool {
        value.is_null()
    }
}

/// Fails on absent values, blank text, empty collections and zero numbers
pub struct NotEmpty;

impl<T, P: Emptiness> PropertyValidator<T, P> for NotEmpty {
    fn name(&self) -> &'static str {
        "notEmpty"
    }

    fn default_message(&self) -> &'static str {
        "'{PropertyName}' must not be empty."
    }

    fn is_valid(&self, _instance: &T, value: &P, _args: &mut MessageArgs) -> bool {
        !value.is_empty_value()
    }
}

/// Fails unless the value is empty
pub struct Empty;

impl<T, P: Emptiness> PropertyValidator<T, P> for Empty {
    fn name(&self) -> &'static str {
        "empty"
    }

    fn default_message(&self) -> &'static str {
        "'{PropertyName}' must be empty."
    }

    fn is_valid(&self, _instance: &T, value: &P, _args: &mut MessageArgs) -> bool {
        value.is_empty_value()
    }
}

// Comparison validators

/// Where a comparison value comes from
pub enum ValueSource<T, V> {
    /// A constant
    Fixed(V),
    /// Another property of the same instance
    Property {
        name: String,
        accessor: Box<dyn Fn(&T) -> &V + Send + Sync>,
    },
}

impl<T, V: Serialize> ValueSource<T, V> {
    fn resolve<'a>(&'a self, instance: &'a T) -> &'a V {
        match self {
            ValueSource::Fixed(value) => value,
            ValueSource::Property { accessor, .. } => accessor(instance),
        }
    }

    fn describe(&self, value: &V, args: &mut MessageArgs) {
        args.set("ComparisonValue", render(value));
        if let ValueSource::Property { name, .. } = self {
            args.set("ComparisonProperty", crate::message::display_name(name));
        }
    }
}

/// Equality against a constant or another property
pub struct Equality<T, V> {
    negate: bool,
    source: ValueSource<T, V>,
}

impl<T, V> Equality<T, V> {
    pub fn equal(source: ValueSource<T, V>) -> Self {
        Self {
            negate: false,
            source,
        }
    }

    pub fn not_equal(source: ValueSource<T, V>) -> Self {
        Self {
            negate: true,
            source,
        }
    }
}

impl<T, V> PropertyValidator<T, V> for Equality<T, V>
where
    V: PartialEq + Serialize + Send + Sync,
{
    fn name(&self) -> &'static str {
        if self.negate { "notEqual" } else { "equal" }
    }

    fn default_message(&self) -> &'static str {
        if self.negate {
            "'{PropertyName}' must not be equal to '{ComparisonValue}'."
        } else {
            "'{PropertyName}' must be equal to '{ComparisonValue}'."
        }
    }

    fn is_valid(&self, instance: &T, value: &V, args: &mut MessageArgs) -> bool {
        let other = self.source.resolve(instance);
        self.source.describe(other, args);
        is_absent(value) || (value == other) != self.negate
    }
}

/// Operator of a [`Comparison`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparator {
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
}

/// Ordering against a constant or another property
pub struct Comparison<T, V> {
    op: Comparator,
    source: ValueSource<T, V>,
}

impl<T, V> Comparison<T, V> {
    pub fn new(op: Comparator, source: ValueSource<T, V>) -> Self {
        Self { op, source }
    }
}

impl<T, V> PropertyValidator<T, V> for Comparison<T, V>
where
    V: PartialOrd + Serialize + Send + Sync,
{
    fn name(&self) -> &'static str {
        match self.op {
            Comparator::LessThan => "lessThan",
            Comparator::LessThanOrEqual => "lessThanOrEqual",
            Comparator::GreaterThan => "greaterThan",
            Comparator::GreaterThanOrEqual => "greaterThanOrEqual",
        }
    }

    fn default_message(&self) -> &'static str {
        match self.op {
            Comparator::LessThan => "'{PropertyName}' must be less than '{ComparisonValue}'.",
            Comparator::LessThanOrEqual => {
                "'{PropertyName}' must be less than or equal to '{ComparisonValue}'."
            }
            Comparator::GreaterThan => "'{PropertyName}' must be greater than '{ComparisonValue}'.",
            Comparator::GreaterThanOrEqual => {
                "'{PropertyName}' must be greater than or equal to '{ComparisonValue}'."
            }
        }
    }

    fn is_valid(&self, instance: &T, value: &V, args: &mut MessageArgs) -> bool {
        let other = self.source.resolve(instance);
        self.source.describe(other, args);
        if is_absent(value) || is_absent(other) {
            return true;
        }
        match self.op {
            Comparator::LessThan => value < other,
            Comparator::LessThanOrEqual => value <= other,
            Comparator::GreaterThan => value > other,
            Comparator::GreaterThanOrEqual => value >= other,
        }
    }
}

/// Range check with `{From}` / `{To}` placeholders
pub struct Between<V> {
    pub from: V,
    pub to: V,
    pub inclusive: bool,
}

impl<T, V> PropertyValidator<T, V> for Between<V>
where
    V: PartialOrd + Serialize + Send + Sync,
{
    fn name(&self) -> &'static str {
        if self.inclusive { "inclusiveBetween" } else { "exclusiveBetween" }
    }

    fn default_message(&self) -> &'static str {
        if self.inclusive {
            "'{PropertyName}' must be between {From} and {To}. You entered {PropertyValue}."
        } else {
            "'{PropertyName}' must be between {From} and {To} (exclusive). You entered {PropertyValue}."
        }
    }

    fn is_valid(&self, _instance: &T, value: &V, args: &mut MessageArgs) -> bool {
        args.set("From", render(&self.from));
        args.set("To", render(&self.to));
        if is_absent(value) {
            return true;
        }
        if self.inclusive {
            *value >= self.from && *value <= self.to
        } else {
            *value > self.from && *value < self.to
        }
    }
}

// String validators

/// Which bound a [`Length`] check enforces
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LengthKind {
    Between,
    Minimum,
    Maximum,
    Exact,
}

/// Character count check; absent text passes
pub struct Length {
    pub min: usize,
    pub max: usize,
    pub kind: LengthKind,
}

impl Length {
    pub fn between(min: usize, max: usize) -> Self {
        Self {
            min,
            max,
            kind: LengthKind::Between,
        }
    }

    pub fn minimum(min: usize) -> Self {
        Self {
            min,
            max: usize::MAX,
            kind: LengthKind::Minimum,
        }
    }

    pub fn maximum(max: usize) -> Self {
        Self {
            min: 0,
            max,
            kind: LengthKind::Maximum,
        }
    }

    pub fn exact(length: usize) -> Self {
        Self {
            min: length,
            max: length,
            kind: LengthKind::Exact,
        }
    }
}

impl<T, P: TextValue> PropertyValidator<T, P> for Length {
    fn name(&self) -> &'static str {
        match self.kind {
            LengthKind::Between => "length",
            LengthKind::Minimum => "minLength",
            LengthKind::Maximum => "maxLength",
            LengthKind::Exact => "exactLength",
        }
    }

    fn default_message(&self) -> &'static str {
        match self.kind {
            LengthKind::Between => {
                "'{PropertyName}' must be between {MinLength} and {MaxLength} characters. You entered {TotalLength} characters."
            }
            LengthKind::Minimum => {
                "The length of '{PropertyName}' must be at least {MinLength} characters. You entered {TotalLength} characters."
            }
            LengthKind::Maximum => {
                "The length of '{PropertyName}' must be {MaxLength} characters or fewer. You entered {TotalLength} characters."
            }
            LengthKind::Exact => {
                "'{PropertyName}' must be {MaxLength} characters in length. You entered {TotalLength} characters."
            }
        }
    }

    fn is_valid(&self, _instance: &T, value: &P, args: &mut MessageArgs) -> bool {
        let Some(text) = value.text() else {
            return true;
        };
        let total = text.chars().count();
        args.set("MinLength", self.min);
        if self.kind != LengthKind::Minimum {
            args.set("MaxLength", self.max);
        }
        args.set("TotalLength", total);
        total >= self.min && total <= self.max
    }
}

/// Custom regex validator
pub struct Matches(pub Regex);

impl Matches {
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self(Regex::new(pattern)?))
    }
}

impl<T, P: TextValue> PropertyValidator<T, P> for Matches {
    fn name(&self) -> &'static str {
        "matches"
    }

    fn default_message(&self) -> &'static str {
        "'{PropertyName}' is not in the correct format."
    }

    fn is_valid(&self, _instance: &T, value: &P, args: &mut MessageArgs) -> bool {
        args.set("RegularExpression", self.0.as_str());
        value.text().is_none_or(|text| self.0.is_match(text))
    }
}

/// Validates email format
pub struct EmailAddress;

impl<T, P: TextValue> PropertyValidator<T, P> for EmailAddress {
    fn name(&self) -> &'static str {
        "email"
    }

    fn default_message(&self) -> &'static str {
        "'{PropertyName}' is not a valid email address."
    }

    fn is_valid(&self, _instance: &T, value: &P, _args: &mut MessageArgs) -> bool {
        value.text().is_none_or(|text| EMAIL_REGEX.is_match(text))
    }
}

/// Luhn checksum over digits, ignoring spaces and dashes
pub struct CreditCard;

impl CreditCard {
    fn luhn(text: &str) -> bool {
        let digits: Vec<u32> = text
            .chars()
            .filter(|c| *c != ' ' && *c != '-')
            .map(|c| c.to_digit(10))
            .collect::<Option<Vec<_>>>()
            .unwrap_or_default();

        if digits.is_empty() {
            return false;
        }

        let sum: u32 = digits
            .iter()
            .rev()
            .enumerate()
            .map(|(i, d)| {
                if i % 2 == 1 {
                    let doubled = d * 2;
                    if doubled > 9 { doubled - 9 } else { doubled }
                } else {
                    *d
                }
            })
            .sum();

        sum % 10 == 0
    }
}

impl<T, P: TextValue> PropertyValidator<T, P> for CreditCard {
    fn name(&self) -> &'static str {
        "creditCard"
    }

    fn default_message(&self) -> &'static str {
        "'{PropertyName}' is not a valid credit card number."
    }

    fn is_valid(&self, _instance: &T, value: &P, _args: &mut MessageArgs) -> bool {
        value.text().is_none_or(Self::luhn)
    }
}

// Number validators

/// Limits total digits and decimal places of a decimal value
pub struct PrecisionScale {
    pub precision: u32,
    pub scale: u32,
    pub ignore_trailing_zeros: bool,
}

impl<T, P: DecimalValue> PropertyValidator<T, P> for PrecisionScale {
    fn name(&self) -> &'static str {
        "precisionScale"
    }

    fn default_message(&self) -> &'static str {
        "'{PropertyName}' must not be more than {ExpectedPrecision} digits in total, with allowance for {ExpectedScale} decimals. {Digits} digits and {ActualScale} decimals were found."
    }

    fn is_valid(&self, _instance: &T, value: &P, args: &mut MessageArgs) -> bool {
        let Some(decimal) = value.decimal() else {
            return true;
        };
        let decimal = if self.ignore_trailing_zeros {
            decimal.normalize()
        } else {
            decimal
        };

        let scale = decimal.scale();
        let digits = decimal
            .mantissa()
            .unsigned_abs()
            .checked_ilog10()
            .map_or(1, |log| log + 1);
        let integer_digits = digits.saturating_sub(scale);

        args.set("ExpectedPrecision", self.precision);
        args.set("ExpectedScale", self.scale);
        args.set("Digits", integer_digits + scale);
        args.set("ActualScale", scale);

        scale <= self.scale && integer_digits <= self.precision.saturating_sub(self.scale)
    }
}

// Predicates

/// Closure predicate over the instance and the value
pub struct Predicate<F> {
    predicate: F,
}

impl<F> Predicate<F> {
    pub fn new(predicate: F) -> Self {
        Self { predicate }
    }
}

impl<T, V, F> PropertyValidator<T, V> for Predicate<F>
where
    F: Fn(&T, &V) -> bool + Send + Sync,
{
    fn name(&self) -> &'static str {
        "predicate"
    }

    fn default_message(&self) -> &'static str {
        PREDICATE_MESSAGE
    }

    fn is_valid(&self, instance: &T, value: &V, _args: &mut MessageArgs) -> bool {
        (self.predicate)(instance, value)
    }
}

/// Closure predicate that awaits
pub struct AsyncPredicate<F> {
    predicate: F,
}

impl<F> AsyncPredicate<F> {
    pub fn new(predicate: F) -> Self {
        Self { predicate }
    }
}

#[async_trait]
impl<T, V, F> AsyncPropertyValidator<T, V> for AsyncPredicate<F>
where
    T: Sync,
    V: Sync,
    F: for<'a> Fn(&'a T, &'a V) -> BoxFuture<'a, Result<bool, RuleError>> + Send + Sync,
{
    async fn is_valid(
        &self,
        instance: &T,
        value: &V,
        _args: &mut MessageArgs,
    ) -> Result<bool, RuleError> {
        (self.predicate)(instance, value).await
    }
}
