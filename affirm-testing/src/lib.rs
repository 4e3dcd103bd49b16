//! Testing utilities for Affirm validators.
//!
//! ## Features
//!
//! - **TestValidate** - run a validator and get an assertable result
//! - **Assertions** - per-property checks chained by message, code and severity
//!
//! ## Quick Start
//!
//! ```
//! use affirm_testing::*;
//! use affirm_validation::Validator;
//!
//! struct Person {
//!     name: String,
//! }
//!
//! let validator = Validator::<Person>::builder()
//!     .rule_for("Name", |p| &p.name, |rule| rule.not_empty())
//!     .build();
//!
//! let result = validator.test_validate(&Person { name: String::new() });
//! result
//!     .should_have_error_for("Name")
//!     .with_error_code("notEmpty")
//!     .with_message("'Name' must not be empty.");
//!
//! validator
//!     .test_validate(&Person { name: "Ada".to_string() })
//!     .should_not_have_any_errors();
//! ```
//!
//! ## Async Validators
//!
//! ```
//! use affirm_testing::*;
//! use affirm_validation::Validator;
//! use futures::FutureExt;
//!
//! struct Account {
//!     id: u64,
//! }
//!
//! let validator = Validator::<Account>::builder()
//!     .rule_for("Id", |a| &a.id, |rule| {
//!         rule.must_async(|_, id| {
//!             let free = *id != 7;
//!             async move { Ok(free) }.boxed()
//!         })
//!         .with_message("User Already Registered")
//!     })
//!     .build();
//!
//! # tokio_test::block_on(async {
//! validator
//!     .test_validate_async(&Account { id: 7 })
//!     .await
//!     .should_have_error_for("Id")
//!     .with_message("User Already Registered");
//! # });
//! ```

mod assertions;

pub use assertions::{FailureAssertions, TestValidate, TestValidationResult};

#[cfg(test)]
mod tests {
    use super::*;
    use affirm_validation::{ValidationResult, ValidationFailure};

    #[test]
    fn test_module_exports() {
        let result = TestValidationResult::new(ValidationResult::new());
        result.should_not_have_any_errors();

        let mut failed = ValidationResult::new();
        failed.add(ValidationFailure::new("Name", "required"));
        assert_eq!(
            TestValidationResult::new(failed)
                .should_have_error_for("Name")
                .count(),
            1
        );
    }
}
