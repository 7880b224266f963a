//! Error types for the Lodestar CLI.

use std::fmt;

/// Result type for CLI operations.
pub type CliResult<T> = Result<T, CliError>;

/// CLI error types.
#[derive(Debug)]
pub enum CliError {
    /// Settings could not be loaded or failed validation
    Config(lodestar_config::ConfigError),

    /// The election could not be set up
    Election(lodestar_distributed::LeaderError),

    /// Redis connection error
    Redis(redis::RedisError),

    /// Cluster metadata client error
    Metadata(lodestar_distributed::MetadataError),

    /// Logging could not be installed
    Logging(String),

    /// IO error (signal handlers, output)
    Io(std::io::Error),
}

impl CliError {
    /// Process exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Config(_) | CliError::Election(_) => 2,
            _ => 1,
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Config(e) => write!(f, "Configuration error: {}", e),
            CliError::Election(e) => write!(f, "Election error: {}", e),
            CliError::Redis(e) => write!(f, "Redis error: {}", e),
            CliError::Metadata(e) => write!(f, "Metadata error: {}", e),
            CliError::Logging(msg) => write!(f, "Logging error: {}", msg),
            CliError::Io(e) => write!(f, "IO error: {}", e),
        }
    }
}

impl std::error::Error for CliError {}

impl From<lodestar_config::ConfigError> for CliError {
    fn from(e: lodestar_config::ConfigError) -> Self {
        CliError::Config(e)
    }
}

impl From<lodestar_distributed::LeaderError> for CliError {
    fn from(e: lodestar_distributed::LeaderError) -> Self {
        CliError::Election(e)
    }
}

impl From<redis::RedisError> for CliError {
    fn from(e: redis::RedisError) -> Self {
        CliError::Redis(e)
    }
}

impl From<lodestar_distributed::MetadataError> for CliError {
    fn from(e: lodestar_distributed::MetadataError) -> Self {
        CliError::Metadata(e)
    }
}

impl From<std::io::Error> for CliError {
    fn from(e: std::io::Error) -> Self {
        CliError::Io(e)
    }
}
