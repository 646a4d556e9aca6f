//! Credence agent
//!
//! Restores the persisted session, keeps its access token fresh ahead of
//! expiry and revalidates on lifecycle events until shut down.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{EnvFilter, fmt};

use credence_auth::{CredentialEngine, LifecycleEvent, SessionStatus};
use credence_core::config::AppConfig;
use credence_core::error::AppError;

#[tokio::main]
async fn main() {
    let config = match load_configuration() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    init_logging(&config);

    if let Err(e) = run(config).await {
        tracing::error!(error = %e, "Agent error");
        std::process::exit(1);
    }
}

/// Load configuration from `CREDENCE_CONFIG` (if set) and the environment
fn load_configuration() -> Result<AppConfig, AppError> {
    let config_path = std::env::var("CREDENCE_CONFIG").ok();
    AppConfig::load(config_path.as_deref())
}

/// Initialize tracing/logging
fn init_logging(config: &AppConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format.as_str() {
        "json" => {
            fmt()
                .json()
                .with_env_filter(filter)
                .with_target(true)
                .with_thread_ids(true)
                .init();
        }
        _ => {
            fmt()
                .pretty()
                .with_env_filter(filter)
                .with_target(true)
                .init();
        }
    }
}

/// Main agent run function
async fn run(config: AppConfig) -> Result<(), AppError> {
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting credence agent");

    // ── Step 1: Build the engine ─────────────────────────────────
    let engine = CredentialEngine::from_config(&config)?;
    let service = engine.service().clone();
    tracing::info!(backends = ?engine.storage().kinds(), "Credential storage configured");

    // ── Step 2: Restore the persisted session ────────────────────
    let status = service.restore_session().await;
    tracing::info!(%status, "Session state restored");
    if status == SessionStatus::Active {
        service.schedule_proactive_refresh();
    }

    // ── Step 3: Lifecycle watcher ────────────────────────────────
    let cancel = CancellationToken::new();
    let (events_tx, events_rx) = mpsc::channel(16);

    let watcher = engine.watcher();
    let watcher_cancel = cancel.clone();
    let watcher_handle = tokio::spawn(async move {
        watcher.run(events_rx, watcher_cancel).await;
    });

    let signals_handle = tokio::spawn(async move {
        if let Err(e) = forward_lifecycle_signals(events_tx).await {
            tracing::warn!(error = %e, "Lifecycle signals unavailable");
        }
    });

    // ── Step 4: Graceful shutdown ────────────────────────────────
    shutdown_signal().await;
    tracing::info!("Shutdown signal received, stopping background work...");
    cancel.cancel();
    service.shutdown();
    signals_handle.abort();

    if tokio::time::timeout(Duration::from_secs(10), watcher_handle)
        .await
        .is_err()
    {
        tracing::warn!("Lifecycle watcher did not stop in time");
    }

    tracing::info!("Credence agent shut down");
    Ok(())
}

/// Map SIGUSR1 to a foreground return and SIGUSR2 to backgrounding
#[cfg(unix)]
async fn forward_lifecycle_signals(events: mpsc::Sender<LifecycleEvent>) -> Result<(), AppError> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut foreground = signal(SignalKind::user_defined1())?;
    let mut background = signal(SignalKind::user_defined2())?;

    loop {
        let event = tokio::select! {
            Some(()) = foreground.recv() => LifecycleEvent::Foreground,
            Some(()) = background.recv() => LifecycleEvent::Background,
            else => break,
        };
        tracing::debug!(?event, "Lifecycle signal received");
        if events.send(event).await.is_err() {
            break;
        }
    }
    Ok(())
}

#[cfg(not(unix))]
async fn forward_lifecycle_signals(events: mpsc::Sender<LifecycleEvent>) -> Result<(), AppError> {
    let _events = events;
    std::future::pending::<()>().await;
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
