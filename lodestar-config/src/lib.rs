// Configuration loading for Lodestar

pub mod duration;
pub mod env;
pub mod error;
pub mod loader;
pub mod settings;
pub mod validation;

pub use duration::{format_duration, parse_duration};
pub use env::EnvLoader;
pub use error::{ConfigError, Result};
pub use loader::{ConfigLoader, FileFormat};
pub use settings::{ENV_PREFIX, ElectorSettings};
pub use validation::{ConfigValidator, Validate};

use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

/// Main configuration manager.
///
/// Holds a flat key/value map. Later loads override earlier ones, so load
/// files first and the environment last.
#[derive(Clone, Default)]
pub struct ConfigManager {
    config: Arc<RwLock<HashMap<String, Value>>>,
    env_prefix: Option<String>,
}

impl ConfigManager {
    /// Create a new configuration manager
    pub fn new() -> Self {
        Self::default()
    }

    /// Create with environment variable prefix
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            config: Arc::new(RwLock::new(HashMap::new())),
            env_prefix: Some(prefix.into()),
        }
    }

    fn loader(&self) -> EnvLoader {
        EnvLoader::new(self.env_prefix.clone())
    }

    /// Load configuration from environment variables
    pub fn load_env(&self) -> Result<()> {
        let env_vars = self.loader().load()?;
        self.insert_strings(env_vars);
        Ok(())
    }

    /// Load configuration from an explicit set of variables
    pub fn load_env_from<I>(&self, vars: I)
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let env_vars = self.loader().load_from(vars);
        self.insert_strings(env_vars);
    }

    fn insert_strings(&self, values: HashMap<String, String>) {
        let mut config = self.config.write();
        for (key, value) in values {
            config.insert(key, Value::String(value));
        }
    }

    /// Load a `.env` file into the process environment, then load the environment.
    ///
    /// Without a path, a missing `.env` in the working directory is ignored.
    pub fn load_dotenv(&self, path: Option<&Path>) -> Result<()> {
        if let Some(path) = path {
            dotenvy::from_path(path).map_err(|e| ConfigError::LoadError(e.to_string()))?;
        } else {
            dotenvy::dotenv().ok();
        }
        self.load_env()
    }

    /// Load configuration from file
    pub fn load_file(&self, path: impl AsRef<Path>, format: FileFormat) -> Result<()> {
        let data = ConfigLoader::new(format).load_file(path)?;
        self.merge_value(data)
    }

    /// Load configuration from file, detecting the format from its name
    pub fn load_file_auto(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let data = ConfigLoader::auto(path)?.load_file(path)?;
        self.merge_value(data)
    }

    /// Merge the top-level keys of a parsed document
    pub fn merge_value(&self, data: Value) -> Result<()> {
        let Value::Object(map) = data else {
            return Err(ConfigError::ParseError(
                "configuration root must be a table".to_string(),
            ));
        };

        let mut config = self.config.write();
        for (key, value) in map {
            config.insert(key, value);
        }
        Ok(())
    }

    /// Set a configuration value
    pub fn set<T: serde::Serialize>(&self, key: &str, value: T) -> Result<()> {
        let json_value = serde_json::to_value(value)
            .map_err(|e| ConfigError::SerializationError(e.to_string()))?;

        self.config.write().insert(key.to_string(), json_value);
        Ok(())
    }

    /// Set a value only when `key` has none yet
    pub fn set_if_absent<T: serde::Serialize>(&self, key: &str, value: T) -> Result<()> {
        if !self.has(key) {
            self.set(key, value)?;
        }
        Ok(())
    }

    /// Get a configuration value
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<T> {
        let value = self
            .config
            .read()
            .get(key)
            .cloned()
            .ok_or_else(|| ConfigError::KeyNotFound(key.to_string()))?;

        serde_json::from_value(value).map_err(|e| ConfigError::DeserializationError(e.to_string()))
    }

    /// Get a configuration value with default
    pub fn get_or<T: DeserializeOwned>(&self, key: &str, default: T) -> T {
        self.get(key).unwrap_or(default)
    }

    /// Get a string value
    pub fn get_string(&self, key: &str) -> Result<String> {
        self.get(key)
    }

    /// Check if a key exists
    pub fn has(&self, key: &str) -> bool {
        self.config.read().contains_key(key)
    }

    /// Get all configuration keys
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.config.read().keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Load and validate configuration
    pub fn load_validated<T: DeserializeOwned + Validate>(&self) -> Result<T> {
        let json_value = Value::Object(
            self.config
                .read()
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        );

        let validated: T = serde_json::from_value(json_value)
            .map_err(|e| ConfigError::DeserializationError(e.to_string()))?;

        validated.validate()?;

        Ok(validated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_and_get() {
        let manager = ConfigManager::new();
        manager.set("lock_name", "orders").unwrap();

        let value: String = manager.get("lock_name").unwrap();
        assert_eq!(value, "orders");
    }

    #[test]
    fn test_get_or_default() {
        let manager = ConfigManager::new();

        let value: String = manager.get_or("missing_key", "default_value".to_string());
        assert_eq!(value, "default_value");
        assert!(matches!(manager.get_string("missing_key"), Err(ConfigError::KeyNotFound(_))));
    }

    #[test]
    fn test_set_if_absent() {
        let manager = ConfigManager::new();
        manager.set("identity", "explicit").unwrap();
        manager.set_if_absent("identity", "fallback").unwrap();
        manager.set_if_absent("namespace", "prod").unwrap();

        assert_eq!(manager.get_string("identity").unwrap(), "explicit");
        assert_eq!(manager.get_string("namespace").unwrap(), "prod");
        assert_eq!(manager.keys(), vec!["identity", "namespace"]);
    }

    #[test]
    fn test_env_overrides_file_values() {
        let manager = ConfigManager::with_prefix("ELECTOR");
        manager
            .merge_value(serde_json::json!({ "lock_name": "file", "label_key": "leader" }))
            .unwrap();
        manager.load_env_from(vec![("ELECTOR_LOCK_NAME".to_string(), "env".to_string())]);

        assert_eq!(manager.get_string("lock_name").unwrap(), "env");
        assert_eq!(manager.get_string("label_key").unwrap(), "leader");
    }

    #[test]
    fn test_merge_rejects_non_table() {
        let manager = ConfigManager::new();
        assert!(manager.merge_value(serde_json::json!([1, 2, 3])).is_err());
    }
}
