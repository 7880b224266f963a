//! CLI command implementations.

pub mod check_config;
pub mod run;

use crate::error::CliResult;
use clap::Args;
use lodestar_config::ElectorSettings;
use std::path::PathBuf;
use tracing::debug;

/// Settings sources shared by every command.
///
/// Flags override the environment, which overrides the `.env` file, which
/// overrides the settings file.
#[derive(Args, Debug, Clone, Default)]
pub struct SettingsArgs {
    /// Settings file (toml, json or .env)
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Load this .env file instead of ./.env
    #[arg(long, value_name = "FILE")]
    pub env_file: Option<PathBuf>,

    /// Replica identity (defaults to $POD_NAME)
    #[arg(long)]
    pub identity: Option<String>,

    /// Namespace of the labelled replicas (defaults to $POD_NAMESPACE)
    #[arg(long)]
    pub namespace: Option<String>,

    /// Name of the shared lock
    #[arg(long)]
    pub lock_name: Option<String>,

    /// Label written to every replica
    #[arg(long)]
    pub label_key: Option<String>,

    /// Label key selecting the participating replicas
    #[arg(long)]
    pub selector_key: Option<String>,

    /// Label value selecting the participating replicas
    #[arg(long)]
    pub selector_value: Option<String>,

    /// Lease duration (e.g. 120s, 2m)
    #[arg(long, value_name = "DURATION")]
    pub lease_duration: Option<String>,

    /// Renewal interval, shorter than the lease
    #[arg(long, value_name = "DURATION")]
    pub renew_deadline: Option<String>,

    /// Pause between acquisition attempts
    #[arg(long, value_name = "DURATION")]
    pub retry_period: Option<String>,

    /// Redis connection URL
    #[arg(long, value_name = "URL")]
    pub redis_url: Option<String>,

    /// Shared object recording the current leader
    #[arg(long, value_name = "NAME")]
    pub leader_info: Option<String>,
}

impl SettingsArgs {
    fn overrides(&self) -> Vec<(&'static str, &str)> {
        [
            ("identity", &self.identity),
            ("namespace", &self.namespace),
            ("lock_name", &self.lock_name),
            ("label_key", &self.label_key),
            ("selector_key", &self.selector_key),
            ("selector_value", &self.selector_value),
            ("lease_duration", &self.lease_duration),
            ("renew_deadline", &self.renew_deadline),
            ("retry_period", &self.retry_period),
            ("redis_url", &self.redis_url),
            ("leader_info", &self.leader_info),
        ]
        .into_iter()
        .filter_map(|(key, value)| value.as_deref().map(|value| (key, value)))
        .collect()
    }

    /// Collect every source and resolve validated settings
    pub fn load(&self) -> CliResult<ElectorSettings> {
        let manager = ElectorSettings::manager(self.config.as_deref(), self.env_file.as_deref())?;

        for (key, value) in self.overrides() {
            debug!(key, "Applying command line override");
            manager.set(key, value)?;
        }

        Ok(ElectorSettings::resolve(&manager, |var| std::env::var(var).ok())?)
    }
}
