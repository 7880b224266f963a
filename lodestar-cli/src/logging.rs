//! Logging setup.
//!
//! `RUST_LOG` wins when set. Otherwise:
//!
//! - `LODESTAR_DEBUG=1` - Enable debug logging
//! - `LODESTAR_LOG_LEVEL=trace|debug|info|warn|error|off` - Set log level
//! - `LODESTAR_LOG_FORMAT=json|pretty|compact` - Set output format
//! - `LODESTAR_LOG_COLOR=1|0` - Enable/disable colors

use crate::error::{CliError, CliResult};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

/// Output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Json,
    Pretty,
    Compact,
}

impl Format {
    fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "json" => Some(Format::Json),
            "pretty" => Some(Format::Pretty),
            "compact" => Some(Format::Compact),
            _ => None,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    pub level: String,
    pub format: Format,
    pub color: bool,
}

fn flag(value: &str) -> bool {
    value == "1" || value.eq_ignore_ascii_case("true")
}

impl LogConfig {
    /// Read the configuration from the process environment
    pub fn from_env() -> Self {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Read the configuration through `lookup`
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let debug = lookup("LODESTAR_DEBUG").is_some_and(|v| flag(&v));

        let level = lookup("LODESTAR_LOG_LEVEL")
            .map(|v| v.to_lowercase())
            .filter(|v| ["trace", "debug", "info", "warn", "error", "off"].contains(&v.as_str()))
            .unwrap_or_else(|| if debug { "debug" } else { "info" }.to_string());

        let format = lookup("LODESTAR_LOG_FORMAT")
            .and_then(|v| Format::parse(&v))
            .unwrap_or(Format::Json);

        let color = lookup("LODESTAR_LOG_COLOR")
            .map(|v| flag(&v))
            .unwrap_or_else(|| lookup("NO_COLOR").is_none() && lookup("TERM").is_some());

        Self { level, format, color }
    }

    /// Force a more verbose level
    pub fn verbose(mut self) -> Self {
        self.level = "debug".to_string();
        self
    }
}

/// Install the global subscriber.
pub fn init(config: &LogConfig) -> CliResult<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));
    let registry = tracing_subscriber::registry().with(filter);

    let result = match config.format {
        Format::Json => registry
            .with(fmt::layer().json().flatten_event(true).with_writer(std::io::stderr))
            .try_init(),
        Format::Pretty => registry
            .with(fmt::layer().pretty().with_ansi(config.color).with_writer(std::io::stderr))
            .try_init(),
        Format::Compact => registry
            .with(fmt::layer().compact().with_ansi(config.color).with_writer(std::io::stderr))
            .try_init(),
    };

    result.map_err(|e| CliError::Logging(e.to_string()))
}
