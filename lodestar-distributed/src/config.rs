//! Election configuration

use crate::error::LeaderError;
use serde::Serialize;
use std::time::Duration;

/// Default lease duration
pub const DEFAULT_LEASE_DURATION: Duration = Duration::from_secs(120);

/// Default renew deadline
pub const DEFAULT_RENEW_DEADLINE: Duration = Duration::from_secs(60);

/// Default retry period
pub const DEFAULT_RETRY_PERIOD: Duration = Duration::from_secs(5);

/// Immutable election settings.
///
/// Only constructible through [`ElectionConfigBuilder::build`], which
/// rejects a renew deadline that is not shorter than the lease.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ElectionConfig {
    lock_name: String,
    lease_duration: Duration,
    renew_deadline: Duration,
    retry_period: Duration,
    label_key: String,
    selector_key: String,
    selector_value: String,
}

impl ElectionConfig {
    /// Start a builder for `lock_name`
    pub fn builder(lock_name: impl Into<String>) -> ElectionConfigBuilder {
        ElectionConfigBuilder::new(lock_name)
    }

    /// Name of the distributed lock
    pub fn lock_name(&self) -> &str {
        &self.lock_name
    }

    /// Maximum validity of a held lock without renewal
    pub fn lease_duration(&self) -> Duration {
        self.lease_duration
    }

    /// Interval between renewals
    pub fn renew_deadline(&self) -> Duration {
        self.renew_deadline
    }

    /// Backoff between acquisition attempts, also the acquisition wait
    pub fn retry_period(&self) -> Duration {
        self.retry_period
    }

    /// Leadership label key
    pub fn label_key(&self) -> &str {
        &self.label_key
    }

    /// Peer selector label key
    pub fn selector_key(&self) -> &str {
        &self.selector_key
    }

    /// Peer selector label value
    pub fn selector_value(&self) -> &str {
        &self.selector_value
    }
}

/// Builder for [`ElectionConfig`]
#[derive(Debug, Clone)]
pub struct ElectionConfigBuilder {
    lock_name: String,
    lease_duration: Duration,
    renew_deadline: Duration,
    retry_period: Duration,
    label_key: String,
    selector_key: String,
    selector_value: String,
}

impl ElectionConfigBuilder {
    /// Create a builder with default durations (120s / 60s / 5s)
    pub fn new(lock_name: impl Into<String>) -> Self {
        Self {
            lock_name: lock_name.into(),
            lease_duration: DEFAULT_LEASE_DURATION,
            renew_deadline: DEFAULT_RENEW_DEADLINE,
            retry_period: DEFAULT_RETRY_PERIOD,
            label_key: String::new(),
            selector_key: String::new(),
            selector_value: String::new(),
        }
    }

    /// Set the lease duration
    pub fn lease_duration(mut self, lease_duration: Duration) -> Self {
        self.lease_duration = lease_duration;
        self
    }

    /// Set the renew deadline
    pub fn renew_deadline(mut self, renew_deadline: Duration) -> Self {
        self.renew_deadline = renew_deadline;
        self
    }

    /// Set the retry period
    pub fn retry_period(mut self, retry_period: Duration) -> Self {
        self.retry_period = retry_period;
        self
    }

    /// Set the leadership label key
    pub fn label_key(mut self, label_key: impl Into<String>) -> Self {
        self.label_key = label_key.into();
        self
    }

    /// Set the peer selector
    pub fn selector(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.selector_key = key.into();
        self.selector_value = value.into();
        self
    }

    /// Validate and build
    pub fn build(self) -> Result<ElectionConfig, LeaderError> {
        for (field, value) in [
            ("lock_name", &self.lock_name),
            ("label_key", &self.label_key),
            ("selector_key", &self.selector_key),
            ("selector_value", &self.selector_value),
        ] {
            if value.trim().is_empty() {
                return Err(LeaderError::InvalidConfig(format!("{} cannot be empty", field)));
            }
        }

        for (field, value) in [
            ("lease_duration", self.lease_duration),
            ("renew_deadline", self.renew_deadline),
            ("retry_period", self.retry_period),
        ] {
            if value.is_zero() {
                return Err(LeaderError::InvalidConfig(format!("{} must be positive", field)));
            }
        }

        if self.renew_deadline >= self.lease_duration {
            return Err(LeaderError::InvalidConfig(format!(
                "renew_deadline ({:?}) must be shorter than lease_duration ({:?})",
                self.renew_deadline, self.lease_duration
            )));
        }

        Ok(ElectionConfig {
            lock_name: self.lock_name,
            lease_duration: self.lease_duration,
            renew_deadline: self.renew_deadline,
            retry_period: self.retry_period,
            label_key: self.label_key,
            selector_key: self.selector_key,
            selector_value: self.selector_value,
        })
    }
}
