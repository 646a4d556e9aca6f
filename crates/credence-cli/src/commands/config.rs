//! Configuration CLI commands.

use clap::{Args, Subcommand};

use crate::output::{self, OutputFormat};
use credence_core::error::AppError;

/// Arguments for config commands
#[derive(Debug, Args)]
pub struct ConfigArgs {
    /// Config subcommand
    #[command(subcommand)]
    pub command: ConfigCommand,
}

/// Config subcommands
#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Show the effective configuration
    Show,
    /// Validate configuration sources
    Validate,
}

/// Execute config commands
pub async fn execute(
    args: &ConfigArgs,
    config_path: Option<&str>,
    format: OutputFormat,
) -> Result<(), AppError> {
    match &args.command {
        ConfigCommand::Show => {
            let config = super::load_config(config_path)?;
            match format {
                OutputFormat::Json => output::print_json(&config),
                OutputFormat::Table => println!("{:#?}", config),
            }
        }
        ConfigCommand::Validate => match super::load_config(config_path) {
            Ok(config) => {
                output::print_success("Configuration is valid");
                output::print_kv("Refresh URL", &config.auth_server.refresh_url);
                output::print_kv(
                    "Refresh policy",
                    &format!(
                        "{} attempts, {}s interval, {}s lead",
                        config.refresh.max_attempts,
                        config.refresh.min_interval_seconds,
                        config.refresh.lead_seconds
                    ),
                );
                output::print_kv("Durable store", &enabled(config.storage.durable.enabled, &config.storage.durable.path));
                output::print_kv("Embedded store", &enabled(config.storage.embedded.enabled, &config.storage.embedded.path));
                output::print_kv("Cookie origin", &enabled(config.storage.cookie.enabled, &config.storage.cookie.origin));
            }
            Err(e) => {
                output::print_error(&format!("Configuration invalid: {}", e));
                return Err(e);
            }
        },
    }

    Ok(())
}

fn enabled(on: bool, detail: &str) -> String {
    if on {
        detail.to_string()
    } else {
        "disabled".to_string()
    }
}
