//! Integration tests for common Affirm workflows.
//!
//! These tests exercise the facade crate the way an application would.

use affirm::prelude::*;
use affirm_config::{FileFormat, OptionsLoader};
use affirm_testing::TestValidate;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone, Default, Serialize)]
struct Address {
    street: String,
}

#[derive(Debug, Clone, Default)]
struct UserRegisterRequest {
    tagname: String,
    first_name: Option<String>,
    last_name: String,
    main_address: Option<Address>,
    additional_addresses: Vec<Address>,
}

fn address_validator() -> Arc<Validator<Address>> {
    Arc::new(
        Validator::<Address>::builder()
            .rule_for("Street", |a: &Address| &a.street, |rule| rule.not_empty())
            .build(),
    )
}

fn user_validator() -> Validator<UserRegisterRequest> {
    Validator::<UserRegisterRequest>::builder()
        .rule_for("Tagname", |r| &r.tagname, |rule| rule.not_empty())
        .rule_for("FirstName", |r| &r.first_name, |rule| rule.not_null())
        .rule_for("MainAddress", |r| &r.main_address, |rule| {
            rule.set_validator(address_validator())
        })
        .rule_for("AdditionalAddresses", |r| &r.additional_addresses, |rule| {
            rule.must(|addresses| addresses.len() <= 10)
                .with_message("No more than 10 addresses are allowed in {PropertyName}")
        })
        .rule_for_each("AdditionalAddresses", |r| &r.additional_addresses, |rule| {
            rule.set_validator(address_validator())
        })
        .rule_set("Names", |names| {
            names
                .rule_for("FirstName", |r| &r.first_name, |rule| rule.not_empty())
                .rule_for("LastName", |r| &r.last_name, |rule| {
                    rule.cascade(CascadeMode::Stop)
                        .not_empty()
                        .min_length(3)
                })
        })
        .rule_set("Addresses", |addresses| {
            addresses.rule_for("MainAddress", |r| &r.main_address, |rule| {
                rule.set_validator(address_validator())
            })
        })
        .build()
}

fn invalid_request() -> UserRegisterRequest {
    UserRegisterRequest {
        tagname: String::new(),
        first_name: None,
        last_name: String::new(),
        main_address: Some(Address::default()),
        additional_addresses: vec![Address::default()],
    }
}

fn properties(result: &ValidationResult) -> Vec<String> {
    result.failures.iter().map(|f| f.property.clone()).collect()
}

// =============================================================================
// Default validation
// =============================================================================

#[test]
fn test_missing_tagname_and_first_name() {
    let request = UserRegisterRequest {
        tagname: String::new(),
        first_name: None,
        last_name: "Lovelace".to_string(),
        ..Default::default()
    };

    let result = user_validator().test_validate(&request);
    result.should_have_error_for("Tagname").with_error_code("notEmpty");
    result.should_have_error_for("FirstName").with_error_code("notNull");
    assert!(!result.result().is_valid());
}

#[test]
fn test_is_valid_matches_failures() {
    let validator = user_validator();
    for request in [invalid_request(), UserRegisterRequest {
        tagname: "ada".to_string(),
        first_name: Some("Ada".to_string()),
        ..Default::default()
    }] {
        let result = validator.validate(&request).unwrap();
        assert_eq!(result.is_valid(), result.failures.is_empty());
    }
}

#[test]
fn test_validation_is_idempotent() {
    let validator = user_validator();
    let request = invalid_request();
    let options = || ValidateOptions::new().rule_sets("Names, Addresses");

    let first = validator.validate_with(&request, options()).unwrap();
    let second = validator.validate_with(&request, options()).unwrap();
    assert_eq!(first, second);
}

// =============================================================================
// Selectors
// =============================================================================

#[test]
fn test_property_selector_only_reports_selected_properties() {
    let validator = user_validator();
    let request = invalid_request();

    for property in ["Tagname", "FirstName", "LastName", "MainAddress"] {
        let result = validator
            .validate_with(&request, ValidateOptions::new().properties(property))
            .unwrap();
        assert!(!result.is_valid());
        for failure in &result.failures {
            assert!(
                failure.property == property
                    || failure.property.starts_with(&format!("{}.", property)),
                "{} reported for selector {}",
                failure.property,
                property
            );
        }
    }
}

#[test]
fn test_all_rule_sets_cover_every_named_set() {
    let validator = user_validator();
    let request = invalid_request();

    let all = properties(
        &validator
            .validate_with(&request, ValidateOptions::new().rule_sets("*"))
            .unwrap(),
    );
    for set in ["default", "Names", "Addresses"] {
        let single = validator
            .validate_with(&request, ValidateOptions::new().rule_sets(set))
            .unwrap();
        for property in properties(&single) {
            assert!(all.contains(&property), "{} missing from '*'", property);
        }
    }
}

#[test]
fn test_combined_selectors_are_rejected() {
    let error = user_validator()
        .validate_with(
            &invalid_request(),
            ValidateOptions::new().rule_sets("Names").properties("Tagname"),
        )
        .unwrap_err();
    assert!(matches!(error, ValidationError::InvalidArgument(_)));
}

// =============================================================================
// Cascade, collections and children
// =============================================================================

#[test]
fn test_stop_cascade_skips_later_components() {
    let result = user_validator().test_validate_with(
        &invalid_request(),
        ValidateOptions::new().rule_sets("Names"),
    );

    let last_name = result.should_have_error_for("LastName");
    assert_eq!(last_name.count(), 1);
    last_name.with_error_code("notEmpty");
}

#[test]
fn test_collection_limit_and_elements() {
    let mut addresses: Vec<Address> = (0..11)
        .map(|i| Address {
            street: format!("{} Main St", i),
        })
        .collect();
    addresses[4].street.clear();

    let request = UserRegisterRequest {
        tagname: "ada".to_string(),
        first_name: Some("Ada".to_string()),
        additional_addresses: addresses,
        ..Default::default()
    };

    let result = user_validator().test_validate(&request);
    result
        .should_have_error_for("AdditionalAddresses")
        .with_message("No more than 10 addresses are allowed in Additional Addresses");
    result.should_have_error_for("AdditionalAddresses[4].Street");
    result.should_have_error_count(2);
}

#[test]
fn test_missing_child_is_skipped() {
    let request = UserRegisterRequest {
        tagname: "ada".to_string(),
        first_name: Some("Ada".to_string()),
        main_address: None,
        ..Default::default()
    };

    user_validator()
        .test_validate(&request)
        .should_not_have_any_errors();
}

// =============================================================================
// Registry, options and async
// =============================================================================

#[tokio::test]
async fn test_registry_with_loaded_options() {
    let options = OptionsLoader::new()
        .load_str(r#"{ "messages": { "notEmpty": "{PropertyName} is required" } }"#, FileFormat::Json)
        .unwrap()
        .apply_env_map(HashMap::from([(
            "implicit_child_validation".to_string(),
            "true".to_string(),
        )]))
        .unwrap()
        .build();

    let registry = ValidatorRegistry::with_options(options);
    registry.register_arc(address_validator());
    registry.register(
        Validator::<UserRegisterRequest>::builder()
            .rule_for("Tagname", |r| &r.tagname, |rule| rule.not_empty())
            .rule_for("MainAddress", |r| &r.main_address, |rule| rule)
            .build(),
    );

    let request = UserRegisterRequest {
        main_address: Some(Address::default()),
        ..Default::default()
    };
    let result = registry.validate_async(&request).await.unwrap();
    assert_eq!(properties(&result), vec!["Tagname", "MainAddress.Street"]);
    assert_eq!(result.failures[0].message, "Tagname is required");
    assert_eq!(result.failures[1].message, "Street is required");
}

#[tokio::test]
async fn test_async_and_sync_agree_for_sync_rules() {
    let validator = user_validator();
    let request = invalid_request();

    let sync = validator.validate(&request).unwrap();
    let result = validator.test_validate_async(&request).await;
    assert_eq!(result.result(), &sync);
}

// =============================================================================
// Implicit children, dependent rules and missing collections
// =============================================================================

#[derive(Debug, Default)]
struct Customer {
    name: String,
    nickname: Option<String>,
    address: Option<Address>,
    previous_addresses: Vec<Address>,
    favorite_books: Option<Vec<String>>,
}

fn customer_validator() -> Validator<Customer> {
    Validator::<Customer>::builder()
        .rule_for("Name", |c| &c.name, |rule| rule.not_empty())
        .rule_for("Address", |c| &c.address, |rule| rule)
        .rule_for("PreviousAddresses", |c| &c.previous_addresses, |rule| rule)
        .build()
}

fn customer_with_blank_addresses() -> Customer {
    Customer {
        address: Some(Address::default()),
        previous_addresses: vec![
            Address {
                street: "1 Main St".to_string(),
            },
            Address::default(),
        ],
        ..Default::default()
    }
}

#[test]
fn test_implicit_child_validation() {
    let registry =
        ValidatorRegistry::with_options(ValidatorOptions::new().implicit_child_validation(true));
    registry.register_arc(address_validator());

    let customer = customer_with_blank_addresses();
    let result = customer_validator()
        .validate_context(&registry.context(&customer))
        .unwrap();

    assert_eq!(
        properties(&result),
        vec!["Name", "Address.Street", "PreviousAddresses[1].Street"]
    );
    assert_eq!(
        result.to_json()["errors"][1]["property"],
        serde_json::json!("Address.Street")
    );
}

#[test]
fn test_implicit_child_validation_is_off_by_default() {
    let registry = ValidatorRegistry::new();
    registry.register_arc(address_validator());

    let customer = customer_with_blank_addresses();
    let result = customer_validator()
        .validate_context(&registry.context(&customer))
        .unwrap();

    assert_eq!(properties(&result), vec!["Name"]);
}

#[test]
fn test_dependent_rules_skipped_when_condition_is_false() {
    let validator = Validator::<Customer>::builder()
        .rule_for("Name", |c| &c.name, |rule| {
            rule.when(|c| c.address.is_some())
                .not_empty()
                .dependent_rules(|rules| {
                    rules.rule_for("Nickname", |c| &c.nickname, |rule| rule.not_null())
                })
        })
        .build();

    let named = Customer {
        name: "Ada".to_string(),
        ..Default::default()
    };
    validator
        .test_validate(&named)
        .should_not_have_any_errors();

    let with_address = Customer {
        name: "Ada".to_string(),
        address: Some(Address::default()),
        ..Default::default()
    };
    let result = validator.test_validate(&with_address);
    result.should_have_error_for("Nickname").with_error_code("notNull");
    result.should_have_error_count(1);
}

#[test]
fn test_missing_collection_has_no_elements() {
    let validator = Validator::<Customer>::builder()
        .rule_for_each("FavoriteBooks", |c| &c.favorite_books, |rule| {
            rule.not_empty()
                .with_message("Book {CollectionIndex} must not be empty")
        })
        .build();

    validator
        .test_validate(&Customer::default())
        .should_not_have_any_errors();

    let customer = Customer {
        favorite_books: Some(vec!["Dune".to_string(), String::new()]),
        ..Default::default()
    };
    validator
        .test_validate(&customer)
        .should_have_error_for("FavoriteBooks[1]")
        .with_message("Book 1 must not be empty");
}

#[test]
fn test_property_selector_narrows_collection_elements() {
    let validator = Validator::<Customer>::builder()
        .rule_for_each("FavoriteBooks", |c| &c.favorite_books, |rule| rule.not_empty())
        .build();
    let customer = Customer {
        favorite_books: Some(vec![String::new(), String::new()]),
        ..Default::default()
    };

    let result = validator
        .validate_with(&customer, ValidateOptions::new().properties("FavoriteBooks[1]"))
        .unwrap();
    assert_eq!(properties(&result), vec!["FavoriteBooks[1]"]);
}
