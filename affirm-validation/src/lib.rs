//! Declarative object validation for Affirm
//!
//! Validators are built once from rule descriptors (a property name, an
//! accessor and a list of constraints) and then run against instances to
//! produce a [`ValidationResult`]. Rules can be grouped into rule sets,
//! gated by conditions, delegated to child validators and awaited when they
//! need I/O.
//!
//! # Examples
//!
//! ## Basic Validation
//!
//! ```
//! use affirm_validation::Validator;
//!
//! struct UserRegisterRequest {
//!     tagname: String,
//!     first_name: Option<String>,
//!     last_name: String,
//! }
//!
//! let validator = Validator::<UserRegisterRequest>::builder()
//!     .rule_for("Tagname", |r| &r.tagname, |rule| {
//!         rule.not_empty().with_message("Request model cannot be empty")
//!     })
//!     .rule_for("FirstName", |r| &r.first_name, |rule| rule.not_null())
//!     .rule_for("LastName", |r| &r.last_name, |rule| {
//!         rule.not_empty().with_name("Last Name")
//!     })
//!     .build();
//!
//! let request = UserRegisterRequest {
//!     tagname: String::new(),
//!     first_name: Some("Ada".to_string()),
//!     last_name: String::new(),
//! };
//!
//! let result = validator.validate(&request).unwrap();
//! assert_eq!(
//!     result.to_string(),
//!     "Request model cannot be empty\n'Last Name' must not be empty."
//! );
//! ```
//!
//! ## Child Validators and Collections
//!
//! ```
//! use affirm_validation::Validator;
//! use serde::Serialize;
//! use std::sync::Arc;
//!
//! #[derive(Serialize)]
//! struct Address {
//!     street: String,
//! }
//!
//! struct Customer {
//!     main_address: Option<Address>,
//!     favorite_books: Vec<Option<String>>,
//! }
//!
//! let address = Arc::new(
//!     Validator::<Address>::builder()
//!         .rule_for("Street", |a| &a.street, |rule| rule.not_empty())
//!         .build(),
//! );
//!
//! let validator = Validator::<Customer>::builder()
//!     .rule_for("MainAddress", |c| &c.main_address, |rule| rule.set_validator(address))
//!     .rule_for_each("FavoriteBooks", |c| &c.favorite_books, |rule| {
//!         rule.not_null().with_message("Book {CollectionIndex} must not be null")
//!     })
//!     .build();
//!
//! let customer = Customer {
//!     main_address: Some(Address { street: String::new() }),
//!     favorite_books: vec![Some("Dune".to_string()), None],
//! };
//!
//! let result = validator.validate(&customer).unwrap();
//! assert_eq!(result.failures[0].property, "MainAddress.Street");
//! assert_eq!(result.failures[1].property, "FavoriteBooks[1]");
//! assert_eq!(result.failures[1].message, "Book 1 must not be null");
//! ```
//!
//! ## Rule Sets
//!
//! ```
//! use affirm_validation::{ValidateOptions, Validator};
//!
//! struct Person {
//!     first_name: String,
//!     last_name: String,
//!     age: u32,
//! }
//!
//! let validator = Validator::<Person>::builder()
//!     .rule_for("Age", |p| &p.age, |rule| rule.greater_than_or_equal(18))
//!     .rule_set("Names", |names| {
//!         names
//!             .rule_for("FirstName", |p| &p.first_name, |rule| rule.not_empty())
//!             .rule_for("LastName", |p| &p.last_name, |rule| rule.not_empty())
//!     })
//!     .build();
//!
//! let person = Person { first_name: String::new(), last_name: String::new(), age: 40 };
//!
//! // Only the "Names" rules run
//! let result = validator
//!     .validate_with(&person, ValidateOptions::new().rule_sets("Names"))
//!     .unwrap();
//! assert_eq!(result.failures.len(), 2);
//! assert_eq!(result.rule_sets_executed, vec!["Names"]);
//!
//! // Without a selector only ungrouped rules run
//! assert!(validator.validate(&person).unwrap().is_valid());
//! ```

mod context;
mod errors;
mod message;
mod options;
mod registry;
mod result;
mod rules;
mod traits;
mod validator;
mod validators;

pub use context::{
    CustomContext, PreValidationContext, RootContextData, ValidateOptions, ValidationContext,
};
pub use errors::*;
pub use message::{display_name, MessageArgs};
pub use options::*;
pub use registry::ValidatorRegistry;
pub use result::*;
pub use rules::{Each, RuleBuilder, Single};
pub use traits::*;
pub use validator::{
    ConditionalBuilder, Validator, ValidatorBuilder, ALL_RULE_SETS, DEFAULT_RULE_SET,
};
pub use validators::*;

pub use futures::future::BoxFuture;
pub use tokio_util::sync::CancellationToken;
