//! Option loading for Affirm validators
//!
//! [`OptionsLoader`] builds a [`ValidatorOptions`] from layered sources.
//! Later layers override earlier ones:
//!
//! 1. Built-in defaults
//! 2. JSON or TOML files (format chosen by extension)
//! 3. `.env` files
//! 4. `AFFIRM_*` environment variables
//!
//! # Examples
//!
//! ```
//! use affirm_config::{FileFormat, OptionsLoader};
//! use affirm_validation::CascadeMode;
//! use std::collections::HashMap;
//!
//! let options = OptionsLoader::new()
//!     .load_str(r#"{"max_depth": 8}"#, FileFormat::Json)
//!     .unwrap()
//!     .apply_env_map(HashMap::from([
//!         ("cascade_mode".to_string(), "stop".to_string()),
//!     ]))
//!     .unwrap()
//!     .build();
//!
//! assert_eq!(options.max_depth, 8);
//! assert_eq!(options.default_cascade_mode, CascadeMode::Stop);
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Option |
//! |---|---|
//! | `AFFIRM_CASCADE_MODE` | `default_cascade_mode` (`continue` or `stop`) |
//! | `AFFIRM_IMPLICIT_CHILD_VALIDATION` | `implicitly_validate_child_properties` |
//! | `AFFIRM_MAX_DEPTH` | `max_depth` |

pub mod env;
pub mod error;
pub mod loader;

pub use env::{DEFAULT_PREFIX, EnvLoader};
pub use error::{ConfigError, Result};
pub use loader::{ConfigLoader, FileFormat};

use affirm_validation::{CascadeMode, ValidatorOptions};
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, trace};

/// Layered loader for [`ValidatorOptions`]
pub struct OptionsLoader {
    options: ValidatorOptions,
    env: EnvLoader,
}

impl OptionsLoader {
    /// Start from the built-in defaults, reading `AFFIRM_*` variables
    pub fn new() -> Self {
        Self::from_options(ValidatorOptions::default())
    }

    /// Start from existing options
    pub fn from_options(options: ValidatorOptions) -> Self {
        Self {
            options,
            env: EnvLoader::default(),
        }
    }

    /// Read environment variables with `prefix` instead of `AFFIRM`
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env = EnvLoader::new(Some(prefix.into()));
        self
    }

    /// Merge a JSON or TOML file
    pub fn load_file(self, path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = ConfigLoader::auto(path)?.load_file(path)?;
        debug!("Loaded validator options from {}", path.display());
        self.merge(data)
    }

    /// Merge configuration text in the given format
    pub fn load_str(self, content: &str, format: FileFormat) -> Result<Self> {
        let data = ConfigLoader::new(format).parse(content)?;
        self.merge(data)
    }

    /// Apply prefixed variables from a `.env` file
    pub fn load_dotenv(self, path: impl AsRef<Path>) -> Result<Self> {
        let vars = self.env.load_dotenv(path)?;
        self.apply_env_map(vars)
    }

    /// Apply prefixed variables from the process environment
    pub fn load_env(self) -> Result<Self> {
        let vars = self.env.load()?;
        self.apply_env_map(vars)
    }

    /// Apply already normalized variables (`max_depth`, `cascade_mode`, ...)
    pub fn apply_env_map(mut self, vars: HashMap<String, String>) -> Result<Self> {
        for (key, value) in vars {
            match key.as_str() {
                "cascade_mode" | "default_cascade_mode" => {
                    self.options.default_cascade_mode =
                        CascadeMode::parse(&value).ok_or_else(|| invalid(&key, &value))?;
                }
                "implicit_child_validation" | "implicitly_validate_child_properties" => {
                    self.options.implicitly_validate_child_properties =
                        parse_bool(&value).ok_or_else(|| invalid(&key, &value))?;
                }
                "max_depth" => {
                    self.options.max_depth =
                        value.trim().parse().map_err(|_| invalid(&key, &value))?;
                }
                _ => trace!("Ignoring unknown option variable '{}'", key),
            }
        }
        Ok(self)
    }

    pub fn options(&self) -> &ValidatorOptions {
        &self.options
    }

    pub fn build(self) -> ValidatorOptions {
        self.options
    }

    /// Defaults, then `path` when given, then `./.env` when present, then
    /// the process environment
    pub fn load(path: Option<&Path>) -> Result<ValidatorOptions> {
        let mut loader = Self::new();
        if let Some(path) = path {
            loader = loader.load_file(path)?;
        }
        if Path::new(".env").exists() {
            loader = loader.load_dotenv(".env")?;
        }
        Ok(loader.load_env()?.build())
    }

    fn merge(mut self, data: Value) -> Result<Self> {
        let mut current = serde_json::to_value(&self.options)
            .map_err(|e| ConfigError::SerializationError(e.to_string()))?;
        merge_values(&mut current, data);
        self.options = serde_json::from_value(current)
            .map_err(|e| ConfigError::DeserializationError(e.to_string()))?;
        Ok(self)
    }
}

impl Default for OptionsLoader {
    fn default() -> Self {
        Self::new()
    }
}

fn invalid(key: &str, value: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Deep merge `overlay` into `base`; tables merge key by key
fn merge_values(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base), Value::Object(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(existing) => merge_values(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}
