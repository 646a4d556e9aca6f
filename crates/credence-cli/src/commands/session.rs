//! Session and token CLI commands.

use chrono::{DateTime, Utc};
use clap::{Args, Subcommand};
use serde_json::json;

use crate::output::{self, OutputFormat};
use credence_core::error::AppError;
use credence_core::types::{AccessToken, RefreshToken, TokenGrant};

/// Arguments for session commands
#[derive(Debug, Args)]
pub struct SessionArgs {
    /// Session subcommand
    #[command(subcommand)]
    pub command: SessionCommand,
}

/// Session subcommands
#[derive(Debug, Subcommand)]
pub enum SessionCommand {
    /// Show session and credential state
    Status,
    /// Print a valid access token, refreshing if needed
    Token,
    /// Print the role claim of the valid access token
    Role,
    /// Force a refresh now
    Refresh,
    /// Store a freshly issued token pair
    Login {
        /// Access token (compact JWS)
        #[arg(long)]
        access_token: String,
        /// Refresh token
        #[arg(long)]
        refresh_token: String,
        /// Refresh token expiry (RFC 3339)
        #[arg(long)]
        refresh_expires_at: Option<String>,
    },
    /// End the session and clear every backend
    Logout,
}

/// Execute session commands
pub async fn execute(
    args: &SessionArgs,
    config_path: Option<&str>,
    format: OutputFormat,
) -> Result<(), AppError> {
    let engine = super::open_engine(config_path).await?;
    let service = engine.service();

    match &args.command {
        SessionCommand::Status => {
            let report = service.report().await;
            match format {
                OutputFormat::Json => output::print_json(&report),
                OutputFormat::Table => {
                    output::print_kv("Session", &report.session_id.to_string());
                    output::print_kv("Status", &report.status.to_string());
                    output::print_kv("Generation", &report.generation.to_string());
                    output::print_kv("Refresh phase", &format!("{:?}", report.refresh_phase));
                    output::print_kv("Failed attempts", &report.failed_attempts.to_string());
                    output::print_kv("Access token", &output::mark(report.has_access_token));
                    output::print_kv("Access token valid", &output::mark(report.access_token_valid));
                    output::print_kv("Access expires", &output::or_dash(report.access_expires_at));
                    output::print_kv("Refresh token", &output::mark(report.has_refresh_token));
                    output::print_kv("Refresh expires", &output::or_dash(report.refresh_expires_at));
                    output::print_kv("Role", &output::or_dash(report.role));
                }
            }
        }
        SessionCommand::Token => {
            let token = service
                .get_valid_token()
                .await
                .ok_or_else(|| AppError::authentication("No valid access token"))?;
            match format {
                OutputFormat::Json => output::print_json(&json!({ "access_token": token })),
                OutputFormat::Table => println!("{}", token.as_str()),
            }
        }
        SessionCommand::Role => {
            let role = service.get_user_role().await;
            match format {
                OutputFormat::Json => output::print_json(&json!({ "role": role })),
                OutputFormat::Table => println!("{}", output::or_dash(role)),
            }
        }
        SessionCommand::Refresh => {
            let token = service.force_refresh().await?;
            output::print_success("Access token refreshed");
            if format == OutputFormat::Json {
                output::print_json(&json!({ "access_token": token }));
            }
        }
        SessionCommand::Login {
            access_token,
            refresh_token,
            refresh_expires_at,
        } => {
            let refresh_expires_at = refresh_expires_at
                .as_deref()
                .map(parse_timestamp)
                .transpose()?;
            let grant = TokenGrant {
                access_token: AccessToken::new(access_token.as_str()),
                refresh_token: RefreshToken::new(refresh_token.as_str()),
                expires_at: None,
                refresh_expires_at,
            };
            let generation = service.establish_session(grant).await?;
            output::print_success(&format!("Session established (generation {})", generation));
        }
        SessionCommand::Logout => {
            service.logout().await;
            output::print_success("Logged out, stored credentials cleared");
        }
    }

    Ok(())
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, AppError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| AppError::validation(format!("Invalid timestamp '{}': {}", raw, e)))
}
