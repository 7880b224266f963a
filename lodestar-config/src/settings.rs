// Elector settings

use crate::duration::serde_duration;
use crate::{ConfigManager, ConfigValidator, Result, Validate};
use lodestar_distributed::ElectionConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

/// Environment prefix for elector settings (`ELECTOR_LOCK_NAME`, ...)
pub const ENV_PREFIX: &str = "ELECTOR";

/// Settings keys filled from the Kubernetes downward API when unset
const DOWNWARD_API: [(&str, &str); 2] = [("identity", "POD_NAME"), ("namespace", "POD_NAMESPACE")];

/// Everything a replica needs to join an election
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ElectorSettings {
    /// Name of this replica, usually the pod name
    pub identity: String,
    pub namespace: String,
    pub lock_name: String,
    /// Label set to `true` on the leader and `false` elsewhere
    pub label_key: String,
    pub selector_key: String,
    pub selector_value: String,
    #[serde(with = "serde_duration")]
    pub lease_duration: Duration,
    #[serde(with = "serde_duration")]
    pub renew_deadline: Duration,
    #[serde(with = "serde_duration")]
    pub retry_period: Duration,
    pub redis_url: String,
    /// Shared object recording the current leader, if any
    pub leader_info: Option<String>,
}

impl Default for ElectorSettings {
    fn default() -> Self {
        Self {
            identity: String::new(),
            namespace: String::new(),
            lock_name: String::new(),
            label_key: String::new(),
            selector_key: String::new(),
            selector_value: String::new(),
            lease_duration: Duration::from_secs(120),
            renew_deadline: Duration::from_secs(60),
            retry_period: Duration::from_secs(5),
            redis_url: "redis://127.0.0.1/".to_string(),
            leader_info: None,
        }
    }
}

impl Validate for ElectorSettings {
    fn validate(&self) -> Result<()> {
        ConfigValidator::not_empty(&self.identity, "identity")?;
        ConfigValidator::not_empty(&self.namespace, "namespace")?;
        ConfigValidator::not_empty(&self.lock_name, "lock_name")?;
        ConfigValidator::not_empty(&self.label_key, "label_key")?;
        ConfigValidator::not_empty(&self.selector_key, "selector_key")?;
        ConfigValidator::not_empty(&self.selector_value, "selector_value")?;

        ConfigValidator::positive(self.lease_duration, "lease_duration")?;
        ConfigValidator::positive(self.renew_deadline, "renew_deadline")?;
        ConfigValidator::positive(self.retry_period, "retry_period")?;
        ConfigValidator::shorter_than(
            self.renew_deadline,
            "renew_deadline",
            self.lease_duration,
            "lease_duration",
        )?;

        ConfigValidator::is_redis_url(&self.redis_url, "redis_url")
    }
}

impl ElectorSettings {
    /// Load from an optional settings file, an optional `.env` file and the
    /// process environment, in increasing order of precedence.
    pub fn load(file: Option<&Path>, env_file: Option<&Path>) -> Result<Self> {
        let manager = Self::manager(file, env_file)?;
        Self::resolve(&manager, |var| std::env::var(var).ok())
    }

    /// Collect raw settings without resolving them, so callers can layer
    /// their own overrides on top.
    pub fn manager(file: Option<&Path>, env_file: Option<&Path>) -> Result<ConfigManager> {
        let manager = ConfigManager::with_prefix(ENV_PREFIX);
        if let Some(path) = file {
            debug!(path = %path.display(), "Loading settings file");
            manager.load_file_auto(path)?;
        }
        manager.load_dotenv(env_file)?;
        Ok(manager)
    }

    /// Fill downward-API fallbacks via `lookup`, then deserialize and validate.
    pub fn resolve<F>(manager: &ConfigManager, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        for (key, var) in DOWNWARD_API {
            if let Some(value) = lookup(var).filter(|v| !v.trim().is_empty()) {
                manager.set_if_absent(key, value)?;
            }
        }

        manager.load_validated()
    }

    /// Name of the leader record object, when one is configured
    pub fn leader_info_name(&self) -> Option<&str> {
        self.leader_info.as_deref().filter(|name| !name.trim().is_empty())
    }

    /// Build the core election configuration
    pub fn election_config(&self) -> Result<ElectionConfig> {
        Ok(ElectionConfig::builder(self.lock_name.clone())
            .lease_duration(self.lease_duration)
            .renew_deadline(self.renew_deadline)
            .retry_period(self.retry_period)
            .label_key(self.label_key.clone())
            .selector(self.selector_key.clone(), self.selector_value.clone())
            .build()?)
    }
}
