//! Credential storage CLI commands.

use clap::{Args, Subcommand};
use serde::Serialize;
use tabled::Tabled;

use crate::output::{self, OutputFormat};
use credence_core::error::AppError;
use credence_core::types::CredentialKey;
use credence_storage::BackendSnapshot;

/// Arguments for storage commands
#[derive(Debug, Args)]
pub struct StorageArgs {
    /// Storage subcommand
    #[command(subcommand)]
    pub command: StorageCommand,
}

/// Storage subcommands
#[derive(Debug, Subcommand)]
pub enum StorageCommand {
    /// List backends and the keys they hold
    List,
    /// Bring every backend to the same refresh token
    Reconcile,
    /// End the session and delete stored credentials from every backend
    Clear {
        /// Required to actually delete
        #[arg(long)]
        force: bool,
    },
}

/// Backend display row
#[derive(Debug, Serialize, Tabled)]
struct BackendRow {
    /// Backend
    backend: String,
    /// Available
    available: String,
    /// Access token
    access: String,
    /// Refresh token
    refresh: String,
    /// Expiry stamp
    stamp: String,
    /// Error
    error: String,
}

impl From<&BackendSnapshot> for BackendRow {
    fn from(s: &BackendSnapshot) -> Self {
        let has = |key: CredentialKey| output::mark(s.keys.contains(&key));
        Self {
            backend: s.kind.to_string(),
            available: output::mark(s.available),
            access: has(CredentialKey::AccessToken),
            refresh: has(CredentialKey::RefreshToken),
            stamp: has(CredentialKey::RefreshExpiresAt),
            error: output::or_dash(s.error.as_ref()),
        }
    }
}

/// Execute storage commands
pub async fn execute(
    args: &StorageArgs,
    config_path: Option<&str>,
    format: OutputFormat,
) -> Result<(), AppError> {
    let config = super::load_config(config_path)?;
    let engine = credence_auth::CredentialEngine::from_config(&config)?;
    let storage = engine.storage();

    match &args.command {
        StorageCommand::List => {
            let snapshot = storage.snapshot().await;
            match format {
                OutputFormat::Json => output::print_json(&snapshot),
                OutputFormat::Table => {
                    let rows: Vec<BackendRow> = snapshot.iter().map(BackendRow::from).collect();
                    output::print_list(&rows, format);
                }
            }
        }
        StorageCommand::Reconcile => {
            let report = storage.reconcile().await;
            match format {
                OutputFormat::Json => output::print_json(&report),
                OutputFormat::Table => {
                    if report.was_consistent() {
                        output::print_success("Backends already consistent");
                    } else {
                        output::print_success("Backends reconciled");
                    }
                    output::print_kv("Winner", &output::or_dash(report.winner));
                    output::print_kv("Repaired", &format!("{:?}", report.repaired));
                    if !report.failed.is_empty() {
                        output::print_warning(&format!("Repair failed for {:?}", report.failed));
                    }
                }
            }
        }
        StorageCommand::Clear { force } => {
            if !force {
                output::print_warning("Refusing to clear credentials without --force");
                return Ok(());
            }
            let report = engine.service().logout().await;
            output::print_success(&format!(
                "Logged out, cleared {} backends",
                report.written.len()
            ));
            for (kind, err) in &report.failed {
                output::print_warning(&format!("{}: {}", kind, err));
            }
        }
    }

    Ok(())
}
