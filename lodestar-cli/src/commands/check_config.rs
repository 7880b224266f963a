//! Validate settings without joining the election.

use crate::commands::SettingsArgs;
use crate::error::CliResult;
use colored::Colorize;

/// Resolve the settings, build the election config and print the result.
pub fn run(args: &SettingsArgs, quiet: bool) -> CliResult<()> {
    let settings = args.load()?;
    let config = settings.election_config()?;

    if quiet {
        return Ok(());
    }

    println!(
        "{} Settings are valid for lock {}",
        "✓".green().bold(),
        config.lock_name().cyan()
    );
    match settings.leader_info_name() {
        Some(name) => println!("  {} leader record: {}", "→".dimmed(), name),
        None => println!("  {} leader record: {}", "→".dimmed(), "disabled".dimmed()),
    }

    let json = serde_json::to_string_pretty(&settings).map_err(std::io::Error::from)?;
    println!("{}", json);
    Ok(())
}
