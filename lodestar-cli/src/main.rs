//! Lodestar - leader election for Kubernetes replicas backed by a Redis lock.
//!
//! # Commands
//!
//! - `lodestar run` - Join the election and keep pod labels in sync
//! - `lodestar check-config` - Resolve and validate settings, then exit
//!
//! Settings come from an optional file, `.env`, `ELECTOR_*` environment
//! variables and flags, in increasing order of precedence.

use clap::{Parser, Subcommand};
use colored::Colorize;

mod commands;
mod error;
mod logging;

use commands::{SettingsArgs, check_config, run};
use error::CliResult;
use logging::LogConfig;

/// Lodestar - label the leader among your replicas
#[derive(Parser)]
#[command(name = "lodestar")]
#[command(author = "Pegasus Heavy Industries LLC")]
#[command(version)]
#[command(about = "Leader election for Kubernetes replicas backed by a Redis lock")]
#[command(long_about = None)]
#[command(propagate_version = true)]
#[command(after_help = format!(
    "{}\n  {} lodestar check-config --config elector.toml\n  {} lodestar run --lock-name orders --redis-url redis://redis:6379/",
    "Examples:".bright_cyan().bold(),
    "$".dimmed(),
    "$".dimmed(),
))]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Join the election until SIGINT or SIGTERM
    Run(SettingsArgs),

    /// Validate settings and print them
    #[command(alias = "check")]
    CheckConfig(SettingsArgs),
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if cli.no_color {
        colored::control::set_override(false);
    }

    let result: CliResult<()> = match &cli.command {
        Commands::Run(args) => {
            let mut log_config = LogConfig::from_env();
            if cli.verbose {
                log_config = log_config.verbose();
            }
            if cli.no_color {
                log_config.color = false;
            }

            match logging::init(&log_config) {
                Ok(()) => run::run(args, cli.verbose).await,
                Err(e) => Err(e),
            }
        }
        Commands::CheckConfig(args) => check_config::run(args, cli.quiet),
    };

    if let Err(e) = result {
        eprintln!("\n  {} {}\n", "Error:".red().bold(), e);
        std::process::exit(e.exit_code());
    };
}
