//! Lifecycle watcher.
//!
//! Revalidates credentials when the host returns to the foreground and on a
//! periodic tick. A tick arriving much later than scheduled means the
//! process was suspended, and is handled like a foreground return.

use std::sync::Mutex;

use chrono::{TimeDelta, Utc};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use credence_core::config::lifecycle::LifecycleConfig;
use credence_storage::StorageManager;
use credence_storage::sync::MutexExt;

use crate::service::TokenService;

/// Host lifecycle notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// The host became visible / active again.
    Foreground,
    /// The host was hidden / backgrounded.
    Background,
}

/// Result of a foreground revalidation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ForegroundOutcome {
    /// Skipped: the previous revalidation is within the window.
    Throttled,
    /// A valid access token is available.
    Valid,
    /// No valid access token could be obtained.
    Absent,
}

/// Drives revalidation from lifecycle events and a periodic tick.
#[derive(Debug)]
pub struct LifecycleWatcher {
    service: TokenService,
    storage: StorageManager,
    config: LifecycleConfig,
    last_revalidation: Mutex<Option<Instant>>,
}

impl LifecycleWatcher {
    /// Creates a watcher revalidating through `service`.
    pub fn new(service: TokenService, storage: StorageManager, config: LifecycleConfig) -> Self {
        Self {
            service,
            storage,
            config,
            last_revalidation: Mutex::new(None),
        }
    }

    /// Handle a foreground return: reconcile storage, then revalidate.
    ///
    /// Runs at most once per revalidation window.
    pub async fn on_foreground(&self) -> ForegroundOutcome {
        {
            let mut last = self.last_revalidation.lock_or_recover();
            if let Some(previous) = *last {
                if previous.elapsed() < self.config.revalidate_window() {
                    debug!("Foreground revalidation throttled");
                    return ForegroundOutcome::Throttled;
                }
            }
            *last = Some(Instant::now());
        }

        let report = self.storage.reconcile().await;
        if !report.was_consistent() {
            info!(
                winner = ?report.winner,
                repaired = ?report.repaired,
                "Storage reconciled on foreground return"
            );
        }

        match self.service.get_valid_token().await {
            Some(_) => ForegroundOutcome::Valid,
            None => ForegroundOutcome::Absent,
        }
    }

    /// Run until `cancel` fires, consuming `events` and ticking periodically.
    pub async fn run(&self, mut events: mpsc::Receiver<LifecycleEvent>, cancel: CancellationToken) {
        let tick = self.config.tick_interval();
        let resume_gap = TimeDelta::from_std(tick + self.config.suspend_threshold())
            .unwrap_or_else(|_| TimeDelta::days(365));

        let mut ticker = tokio::time::interval_at(Instant::now() + tick, tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut last_wall = Utc::now();
        let mut events_open = true;

        info!(tick_secs = tick.as_secs(), "Lifecycle watcher started");
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                event = events.recv(), if events_open => match event {
                    Some(LifecycleEvent::Foreground) => {
                        let outcome = self.on_foreground().await;
                        debug!(?outcome, "Foreground event handled");
                    }
                    Some(LifecycleEvent::Background) => debug!("Host backgrounded"),
                    None => {
                        debug!("Lifecycle event channel closed");
                        events_open = false;
                    }
                },
                _ = ticker.tick() => {
                    let now = Utc::now();
                    let gap = now - last_wall;
                    last_wall = now;
                    if gap > resume_gap {
                        info!(gap_secs = gap.num_seconds(), "Resume detected");
                        self.on_foreground().await;
                    } else if self.service.get_valid_token().await.is_none() {
                        debug!("Periodic check found no valid token");
                    }
                }
            }
        }
        info!("Lifecycle watcher stopped");
    }
}
