//! CLI command definitions and dispatch.

pub mod config;
pub mod session;
pub mod storage;

use clap::{Parser, Subcommand};

use crate::output::OutputFormat;
use credence_auth::CredentialEngine;
use credence_core::config::AppConfig;
use credence_core::error::AppError;

/// Credence: credential persistence and refresh coordination
#[derive(Debug, Parser)]
#[command(name = "credence", version, about, long_about = None)]
pub struct Cli {
    /// Path to an additional configuration file
    #[arg(short, long)]
    pub config: Option<String>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "table")]
    pub format: OutputFormat,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level commands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Session and token management
    Session(session::SessionArgs),
    /// Credential storage management
    Storage(storage::StorageArgs),
    /// Configuration management
    Config(config::ConfigArgs),
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(&self) -> Result<(), AppError> {
        let config_path = self.config.as_deref();
        match &self.command {
            Commands::Session(args) => session::execute(args, config_path, self.format).await,
            Commands::Storage(args) => storage::execute(args, config_path, self.format).await,
            Commands::Config(args) => config::execute(args, config_path, self.format).await,
        }
    }
}

/// Helper: load configuration
pub fn load_config(config_path: Option<&str>) -> Result<AppConfig, AppError> {
    AppConfig::load(config_path)
}

/// Helper: build the engine and resume whatever session storage holds
pub async fn open_engine(config_path: Option<&str>) -> Result<CredentialEngine, AppError> {
    let config = load_config(config_path)?;
    let engine = CredentialEngine::from_config(&config)?;
    let status = engine.service().restore_session().await;
    tracing::debug!(%status, "Session state restored");
    Ok(engine)
}
