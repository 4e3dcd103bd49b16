// Environment variable loading

use crate::{ConfigError, Result};
use std::collections::HashMap;
use std::env;
use std::path::Path;

/// Prefix of the variables read by default
pub const DEFAULT_PREFIX: &str = "AFFIRM";

/// Environment variable loader.
///
/// Keys are returned lowercased with the prefix removed, so
/// `AFFIRM_MAX_DEPTH` becomes `max_depth`.
pub struct EnvLoader {
    prefix: Option<String>,
}

impl EnvLoader {
    /// Create a new environment loader
    pub fn new(prefix: Option<String>) -> Self {
        Self { prefix }
    }

    /// Load the process environment
    pub fn load(&self) -> Result<HashMap<String, String>> {
        Ok(self.load_from(env::vars()))
    }

    /// Load variables from a `.env` file without touching the process environment
    pub fn load_dotenv(&self, path: impl AsRef<Path>) -> Result<HashMap<String, String>> {
        let path = path.as_ref();
        let entries = dotenvy::from_path_iter(path)
            .map_err(|e| ConfigError::LoadError(format!("{}: {}", path.display(), e)))?;

        let mut vars = Vec::new();
        for entry in entries {
            vars.push(entry.map_err(|e| ConfigError::ParseError(e.to_string()))?);
        }
        Ok(self.load_from(vars))
    }

    /// Filter and normalize an arbitrary set of variables
    pub fn load_from<I>(&self, vars: I) -> HashMap<String, String>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut config = HashMap::new();

        for (key, value) in vars {
            if let Some(ref prefix) = self.prefix {
                if let Some(rest) = key.strip_prefix(prefix.as_str()) {
                    if let Some(trimmed_key) = rest.strip_prefix('_') {
                        config.insert(trimmed_key.to_lowercase(), value);
                    }
                }
            } else {
                config.insert(key.to_lowercase(), value);
            }
        }

        config
    }

    /// Load a specific environment variable
    pub fn load_var(&self, key: &str) -> Result<String> {
        let full_key = if let Some(ref prefix) = self.prefix {
            format!("{}_{}", prefix, key.to_uppercase())
        } else {
            key.to_uppercase()
        };

        env::var(&full_key).map_err(ConfigError::EnvError)
    }

    /// Load with default value
    pub fn load_var_or(&self, key: &str, default: &str) -> String {
        self.load_var(key).unwrap_or_else(|_| default.to_string())
    }
}

impl Default for EnvLoader {
    fn default() -> Self {
        Self::new(Some(DEFAULT_PREFIX.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_prefix_is_stripped() {
        let loader = EnvLoader::default();
        let config = loader.load_from(vars(&[
            ("AFFIRM_MAX_DEPTH", "8"),
            ("AFFIRM_CASCADE_MODE", "stop"),
            ("AFFIRMATIVE", "yes"),
            ("PATH", "/usr/bin"),
        ]));

        assert_eq!(config.len(), 2);
        assert_eq!(config["max_depth"], "8");
        assert_eq!(config["cascade_mode"], "stop");
    }

    #[test]
    fn test_without_prefix() {
        let loader = EnvLoader::new(None);
        let config = loader.load_from(vars(&[("MAX_DEPTH", "4")]));
        assert_eq!(config["max_depth"], "4");
    }

    #[test]
    fn test_env_loader_with_default() {
        let loader = EnvLoader::new(None);
        let value = loader.load_var_or("NONEXISTENT_VAR_12345", "default");

        assert_eq!(value, "default");
    }

    #[test]
    fn test_env_loader_missing_var() {
        let loader = EnvLoader::new(Some("AFFIRM_TEST".to_string()));
        let result = loader.load_var("MISSING_VAR_67890");

        assert!(matches!(result, Err(ConfigError::EnvError(_))));
    }

    #[test]
    fn test_missing_dotenv_file() {
        let result = EnvLoader::default().load_dotenv("/nonexistent/affirm/.env");
        assert!(matches!(result, Err(ConfigError::LoadError(_))));
    }
}
