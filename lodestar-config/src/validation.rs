// Configuration validation

use crate::{ConfigError, Result};
use std::time::Duration;

/// Trait for validating configuration
pub trait Validate {
    fn validate(&self) -> Result<()>;
}

/// Configuration validator with rules
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate that a value is not blank
    pub fn not_empty(value: &str, field: &str) -> Result<()> {
        if value.trim().is_empty() {
            return Err(ConfigError::ValidationError(format!(
                "{} cannot be empty",
                field
            )));
        }
        Ok(())
    }

    /// Validate that a duration is non-zero
    pub fn positive(value: Duration, field: &str) -> Result<()> {
        if value.is_zero() {
            return Err(ConfigError::ValidationError(format!(
                "{} must be positive",
                field
            )));
        }
        Ok(())
    }

    /// Validate that `value` is strictly shorter than `limit`
    pub fn shorter_than(
        value: Duration,
        field: &str,
        limit: Duration,
        limit_field: &str,
    ) -> Result<()> {
        if value >= limit {
            return Err(ConfigError::ValidationError(format!(
                "{} ({:?}) must be shorter than {} ({:?})",
                field, value, limit_field, limit
            )));
        }
        Ok(())
    }

    /// Validate a Redis connection URL scheme
    pub fn is_redis_url(value: &str, field: &str) -> Result<()> {
        let valid = ["redis://", "rediss://", "redis+unix://", "unix://"]
            .iter()
            .any(|scheme| value.starts_with(scheme));
        if !valid {
            return Err(ConfigError::ValidationError(format!(
                "{} must be a redis:// or rediss:// URL",
                field
            )));
        }
        Ok(())
    }
}
