// Affirm - declarative object validation for Rust
//
// This library re-exports the validation engine and, behind features, option
// loading and test helpers.

// Re-export the engine
pub use affirm_validation::*;

// Re-export optional crates
#[cfg(feature = "config")]
pub use affirm_config;

#[cfg(feature = "testing")]
pub use affirm_testing;

// Prelude for common imports
pub mod prelude {
    pub use crate::{
        CancellationToken,
        CascadeMode,
        CustomContext,
        Severity,
        ValidateOptions,
        ValidationContext,
        ValidationError,
        ValidationFailure,
        ValidationResult,
        Validator,
        ValidatorBuilder,
        ValidatorOptions,
        ValidatorRegistry,
    };

    #[cfg(feature = "config")]
    pub use affirm_config::OptionsLoader;

    #[cfg(feature = "testing")]
    pub use affirm_testing::{TestValidate, TestValidationResult};
}
