// Settings errors

use lodestar_distributed::LeaderError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    /// No source provided the key
    #[error("Setting {0:?} is not set")]
    KeyNotFound(String),

    /// A settings file or `.env` file could not be read
    #[error("Failed to load settings: {0}")]
    LoadError(String),

    /// Malformed file content or duration
    #[error("Failed to parse settings: {0}")]
    ParseError(String),

    /// Values that parse but cannot drive an election
    #[error("Invalid settings: {0}")]
    ValidationError(String),

    #[error("Failed to convert settings: {0}")]
    SerializationError(String),

    /// Collected values do not fit the requested type
    #[error("Settings do not match the expected shape: {0}")]
    DeserializationError(String),

    #[error("Environment variable {var} is unusable: {source}")]
    EnvError {
        var: String,
        #[source]
        source: std::env::VarError,
    },
}

impl From<LeaderError> for ConfigError {
    fn from(err: LeaderError) -> Self {
        ConfigError::ValidationError(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ConfigError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_election_errors_become_validation_errors() {
        let err: ConfigError = LeaderError::InvalidConfig("renew_deadline too long".to_string()).into();
        assert!(matches!(err, ConfigError::ValidationError(ref msg) if msg.contains("renew_deadline")));
    }

    #[test]
    fn test_env_error_names_the_variable() {
        let err = ConfigError::EnvError {
            var: "ELECTOR_LOCK_NAME".to_string(),
            source: std::env::VarError::NotPresent,
        };
        assert!(err.to_string().contains("ELECTOR_LOCK_NAME"));
    }
}
