//! Token service: the only API other subsystems use to obtain credentials.
//!
//! Owns the session lifecycle. It is the only component that declares a
//! session expired, and the only one that starts or ends a generation.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use credence_core::config::refresh::RefreshConfig;
use credence_core::error::AppError;
use credence_core::result::AppResult;
use credence_core::types::{AccessToken, RefreshToken, TokenGrant};
use credence_storage::{StorageManager, WriteReport};
use credence_storage::sync::MutexExt;

use super::scheduler::ScheduledRefresh;
use crate::jwt::TokenCodec;
use crate::refresh::{RefreshCoordinator, RefreshError, RefreshPhase};
use crate::session::{Session, SessionStatus};

/// Diagnostic view of the session and its stored credentials.
#[derive(Debug, Clone, Serialize)]
pub struct SessionReport {
    /// Session identifier.
    pub session_id: Uuid,
    /// Session status.
    pub status: SessionStatus,
    /// Current generation.
    pub generation: u64,
    /// Refresh coordinator phase.
    pub refresh_phase: RefreshPhase,
    /// Consecutive failed refresh attempts.
    pub failed_attempts: u32,
    /// Whether a proactive refresh loop is running.
    pub refresh_scheduled: bool,
    /// Whether an access token is stored.
    pub has_access_token: bool,
    /// Whether the stored access token is unexpired.
    pub access_token_valid: bool,
    /// Whether a refresh token is stored.
    pub has_refresh_token: bool,
    /// Stored access token expiry.
    pub access_expires_at: Option<DateTime<Utc>>,
    /// Stored refresh token expiry.
    pub refresh_expires_at: Option<DateTime<Utc>>,
    /// Role claim of the stored access token.
    pub role: Option<String>,
}

/// Façade over storage, decoding and refresh.
#[derive(Debug, Clone)]
pub struct TokenService {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    session: Arc<Session>,
    storage: StorageManager,
    coordinator: RefreshCoordinator,
    codec: TokenCodec,
    config: RefreshConfig,
    schedule: Mutex<Option<ScheduledRefresh>>,
}

impl TokenService {
    /// Creates the service. `coordinator` must be bound to the same session
    /// and storage.
    pub fn new(
        session: Arc<Session>,
        storage: StorageManager,
        coordinator: RefreshCoordinator,
        codec: TokenCodec,
        config: RefreshConfig,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                session,
                storage,
                coordinator,
                codec,
                config,
                schedule: Mutex::new(None),
            }),
        }
    }

    /// The session this service manages.
    pub fn session(&self) -> &Arc<Session> {
        &self.inner.session
    }

    /// The refresh coordinator.
    pub fn coordinator(&self) -> &RefreshCoordinator {
        &self.inner.coordinator
    }

    /// Current session status.
    pub fn status(&self) -> SessionStatus {
        self.inner.session.status()
    }

    /// A usable access token, refreshing if the stored one is expired.
    ///
    /// Returns `None` when the session is expired, nothing usable is stored,
    /// the refresh failed, or the session changed while refreshing.
    pub async fn get_valid_token(&self) -> Option<AccessToken> {
        let session = &self.inner.session;
        if session.status() == SessionStatus::Expired {
            debug!("Session expired, no token available");
            return None;
        }

        let generation = session.generation();
        let stored = self.inner.storage.read_credentials().await;
        if let Some(token) = stored.access_token {
            if !self.inner.codec.is_expired(token.as_str()) {
                return Some(token);
            }
        }

        let outcome = self.inner.coordinator.refresh().await;
        match self.settle_refresh(generation, outcome).await {
            Ok(token) => Some(token),
            Err(
                RefreshError::Superseded | RefreshError::NoRefreshToken | RefreshError::Exhausted,
            ) => None,
            Err(e) => {
                warn!(error = %e, "Access token unavailable");
                None
            }
        }
    }

    /// Refresh now, whether or not the stored access token is still valid.
    ///
    /// Goes through the same session handling as [`Self::get_valid_token`]:
    /// exhausting the attempt limit expires the session, and a result from
    /// an ended session is discarded.
    pub async fn force_refresh(&self) -> Result<AccessToken, RefreshError> {
        if self.status() == SessionStatus::Expired {
            return Err(RefreshError::Exhausted);
        }
        let generation = self.inner.session.generation();
        let outcome = self.inner.coordinator.refresh().await;
        self.settle_refresh(generation, outcome).await
    }

    /// The stored refresh token.
    pub async fn get_refresh_token(&self) -> Option<RefreshToken> {
        if self.status() == SessionStatus::Expired {
            return None;
        }
        self.inner.storage.read_credentials().await.refresh_token
    }

    /// Role of the valid access token.
    pub async fn get_user_role(&self) -> Option<String> {
        let token = self.get_valid_token().await?;
        self.inner.codec.role_of(token.as_str())
    }

    /// Start a new session from a freshly issued grant (login).
    ///
    /// Returns the new generation.
    pub async fn establish_session(&self, grant: TokenGrant) -> AppResult<u64> {
        self.inner
            .codec
            .decode(grant.access_token.as_str())
            .map_err(|e| AppError::validation(format!("Access token is not decodable: {e}")))?;
        if grant.refresh_token.as_str().is_empty() {
            return Err(AppError::validation("Refresh token is empty"));
        }

        self.cancel_schedule();
        let session = &self.inner.session;
        let _gate = session.write_gate().lock().await;
        let generation = session.advance(SessionStatus::Active);
        self.inner.coordinator.reset();

        let set = grant.into_credential_set(Utc::now() + self.inner.config.refresh_ttl());
        if let Err(e) = self.inner.storage.write_credentials(&set).await {
            session.set_status_if_current(generation, SessionStatus::Unauthenticated);
            return Err(e);
        }

        info!(session_id = %session.id(), generation, "Session established");
        Ok(generation)
    }

    /// Startup path: reconcile storage and resume the session it holds.
    pub async fn restore_session(&self) -> SessionStatus {
        let session = &self.inner.session;
        let generation = session.generation();
        let report = self.inner.storage.reconcile().await;
        if session.status() == SessionStatus::Active {
            return SessionStatus::Active;
        }

        let stored = self.inner.storage.read_credentials().await;
        let usable_access = stored
            .access_token
            .as_ref()
            .is_some_and(|t| !self.inner.codec.is_expired(t.as_str()));

        let _gate = session.write_gate().lock().await;
        if session.generation() != generation {
            debug!(generation, "Session changed during restore, keeping its state");
            return session.status();
        }
        if stored.refresh_token.is_some() || usable_access {
            let generation = session.advance(SessionStatus::Active);
            self.inner.coordinator.reset();
            info!(
                generation,
                winner = ?report.winner,
                repaired = ?report.repaired,
                "Session restored from storage"
            );
            SessionStatus::Active
        } else {
            session.set_status(SessionStatus::Unauthenticated);
            debug!("No stored credentials to restore");
            SessionStatus::Unauthenticated
        }
    }

    /// Start the proactive refresh loop.
    ///
    /// Fires `lead` before the access token expires, reschedules after each
    /// success and retries failed attempts after the minimum interval.
    /// Returns `false` when a loop is already running.
    pub fn schedule_proactive_refresh(&self) -> bool {
        let mut slot = self.inner.schedule.lock_or_recover();
        if slot.as_ref().is_some_and(ScheduledRefresh::is_live) {
            debug!("Proactive refresh already scheduled");
            return false;
        }
        if self.status() == SessionStatus::Expired {
            debug!("Session expired, not scheduling proactive refresh");
            return false;
        }

        let generation = self.inner.session.generation();
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(self.clone().run_proactive(generation, cancel.clone()));
        *slot = Some(ScheduledRefresh::new(cancel, handle));
        info!(generation, "Proactive refresh scheduled");
        true
    }

    /// Whether a proactive refresh loop is running.
    pub fn is_refresh_scheduled(&self) -> bool {
        self.inner
            .schedule
            .lock_or_recover()
            .as_ref()
            .is_some_and(ScheduledRefresh::is_live)
    }

    /// End the session: stop scheduling, discard in-flight refresh results
    /// and clear every backend.
    pub async fn logout(&self) -> WriteReport {
        self.cancel_schedule();
        let generation = {
            let _gate = self.inner.session.write_gate().lock().await;
            self.inner.session.advance(SessionStatus::Terminated)
        };
        self.inner.coordinator.reset();
        let report = self.inner.storage.clear_all().await;
        info!(
            generation,
            cleared = report.written.len(),
            failed = report.failed.len(),
            "Logged out"
        );
        report
    }

    /// Stop background work without ending the session.
    pub fn shutdown(&self) {
        self.cancel_schedule();
    }

    /// Snapshot of session and credential state.
    pub async fn report(&self) -> SessionReport {
        let stored = self.inner.storage.read_credentials().await;
        let codec = &self.inner.codec;
        let access = stored.access_token.as_ref().map(AccessToken::as_str);
        SessionReport {
            session_id: self.inner.session.id(),
            status: self.status(),
            generation: self.inner.session.generation(),
            refresh_phase: self.inner.coordinator.phase(),
            failed_attempts: self.inner.coordinator.attempt_count(),
            refresh_scheduled: self.is_refresh_scheduled(),
            has_access_token: access.is_some(),
            access_token_valid: access.is_some_and(|t| !codec.is_expired(t)),
            has_refresh_token: stored.refresh_token.is_some(),
            access_expires_at: access.and_then(|t| codec.expires_at(t)),
            refresh_expires_at: stored.refresh_expires_at,
            role: access.and_then(|t| codec.role_of(t)),
        }
    }

    /// Apply a refresh outcome to the session that started it.
    async fn settle_refresh(
        &self,
        generation: u64,
        outcome: Result<AccessToken, RefreshError>,
    ) -> Result<AccessToken, RefreshError> {
        let session = &self.inner.session;
        match outcome {
            Ok(token) if session.generation() == generation => Ok(token),
            Ok(_) => {
                debug!(generation, "Discarding refresh result from an ended session");
                Err(RefreshError::Superseded)
            }
            Err(RefreshError::Exhausted) => {
                self.expire_session(generation).await;
                Err(RefreshError::Exhausted)
            }
            Err(RefreshError::NoRefreshToken) => {
                if session.status() == SessionStatus::Active {
                    session.set_status_if_current(generation, SessionStatus::Unauthenticated);
                }
                Err(RefreshError::NoRefreshToken)
            }
            Err(e) => Err(e),
        }
    }

    fn cancel_schedule(&self) {
        if let Some(scheduled) = self.inner.schedule.lock_or_recover().take() {
            scheduled.cancel();
            debug!("Proactive refresh cancelled");
        }
    }

    /// Declare `generation` expired: no further refresh until a new login.
    async fn expire_session(&self, generation: u64) {
        let session = &self.inner.session;
        let _gate = session.write_gate().lock().await;
        if session.generation() != generation || session.status() == SessionStatus::Expired {
            return;
        }
        session.set_status(SessionStatus::Expired);
        self.cancel_schedule();
        self.inner.storage.clear_all().await;
        warn!(
            session_id = %session.id(),
            generation,
            "Session expired, refresh is no longer possible"
        );
    }

    async fn run_proactive(self, generation: u64, cancel: CancellationToken) {
        let lead = TimeDelta::from_std(self.inner.config.lead()).unwrap_or(TimeDelta::zero());
        let mut floor = Duration::ZERO;

        loop {
            if self.inner.session.generation() != generation
                || self.status() == SessionStatus::Expired
            {
                break;
            }

            let stored = self.inner.storage.read_credentials().await;
            let delay = match stored.access_token.as_ref() {
                Some(token) => self
                    .inner
                    .codec
                    .expires_at(token.as_str())
                    .and_then(|expires_at| (expires_at - lead - Utc::now()).to_std().ok())
                    .unwrap_or(Duration::ZERO),
                None if stored.refresh_token.is_some() => Duration::ZERO,
                None => {
                    debug!(generation, "No stored credentials, stopping proactive refresh");
                    break;
                }
            }
            .max(floor);

            debug!(generation, delay_secs = delay.as_secs(), "Next proactive refresh");
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
            if cancel.is_cancelled() || self.inner.session.generation() != generation {
                break;
            }

            match self.inner.coordinator.refresh().await {
                Ok(_) => floor = self.inner.config.min_interval(),
                Err(RefreshError::Exhausted) => {
                    self.expire_session(generation).await;
                    break;
                }
                Err(RefreshError::NoRefreshToken | RefreshError::Superseded) => break,
                Err(e) => {
                    warn!(error = %e, "Proactive refresh failed, retrying after cooldown");
                    floor = self.inner.config.min_interval();
                }
            }
        }
        debug!(generation, "Proactive refresh loop ended");
    }
}
