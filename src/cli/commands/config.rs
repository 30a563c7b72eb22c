//! Config command implementation.
//!
//! View the effective configuration or create a default file.

use std::path::PathBuf;

use crate::cli::{Cli, ConfigAction, ConfigArgs, OutputFormat};
use crate::config::{default_config_path, Config};
use crate::error::{Result, TelemetryError};

/// Run the config command.
pub fn run(cli: &Cli, config: &Config, args: &ConfigArgs) -> Result<()> {
    match &args.action {
        ConfigAction::Show => show_config(cli, config),
        ConfigAction::Path => {
            println!("{}", config_path(cli)?.display());
            Ok(())
        }
        ConfigAction::Init { force } => init_config(cli, *force),
    }
}

fn config_path(cli: &Cli) -> Result<PathBuf> {
    match &cli.config {
        Some(path) => Ok(path.clone()),
        None => default_config_path(),
    }
}

/// Show full configuration.
fn show_config(cli: &Cli, config: &Config) -> Result<()> {
    match cli.effective_output(config) {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(config)?;
            println!("{json}");
        }
        OutputFormat::Text => {
            let toml = toml::to_string_pretty(config).map_err(|e| TelemetryError::InvalidConfig {
                message: format!("Failed to serialize config: {e}"),
            })?;
            print!("{toml}");
        }
    }
    Ok(())
}

/// Write a default configuration file.
fn init_config(cli: &Cli, force: bool) -> Result<()> {
    let path = config_path(cli)?;
    if path.exists() && !force {
        return Err(TelemetryError::ConfigError {
            message: format!(
                "Config file already exists: {} (use --force to overwrite)",
                path.display()
            ),
        });
    }

    Config::default().save_to(&path)?;
    if !cli.quiet {
        println!("Created configuration file: {}", path.display());
    }
    Ok(())
}
