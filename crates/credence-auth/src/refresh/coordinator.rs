//! Refresh state machine.
//!
//! `Idle -> Refreshing -> (success -> Idle | failure -> Idle | exhausted -> Terminated)`.
//! At most one attempt runs per session; callers arriving while it runs
//! share its outcome. Each attempt runs on its own task, so it settles even
//! when every caller has gone away.

use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use credence_core::config::refresh::RefreshConfig;
use credence_core::traits::{RefreshResponse, RefreshTransport};
use credence_core::types::{AccessToken, RefreshToken, TokenGrant};
use credence_storage::StorageManager;
use credence_storage::sync::MutexExt;

use super::error::RefreshError;
use crate::jwt::TokenCodec;
use crate::session::Session;

/// Result every caller of a refresh observes.
pub type RefreshResult = Result<AccessToken, RefreshError>;

type SharedRefresh = Shared<BoxFuture<'static, RefreshResult>>;

/// Coordinator phase.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshPhase {
    /// No attempt running.
    #[default]
    Idle,
    /// An attempt is in flight.
    Refreshing,
    /// Attempts exhausted; refresh refused until reset.
    Terminated,
}

/// Mutable refresh state, held by the session and mutated only here.
#[derive(Default)]
pub struct RefreshAttemptState {
    phase: RefreshPhase,
    attempt_count: u32,
    last_attempt_at: Option<Instant>,
    last_outcome: Option<RefreshResult>,
    in_flight: Option<SharedRefresh>,
    /// Identifies the current attempt; bumped on start and reset so stale
    /// attempts cannot settle into newer state.
    seq: u64,
}

impl fmt::Debug for RefreshAttemptState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RefreshAttemptState")
            .field("phase", &self.phase)
            .field("attempt_count", &self.attempt_count)
            .field("last_attempt_at", &self.last_attempt_at)
            .field("last_outcome", &self.last_outcome)
            .field("in_flight", &self.in_flight.is_some())
            .finish()
    }
}

/// Owns the network refresh for one session.
#[derive(Debug, Clone)]
pub struct RefreshCoordinator {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    session: Arc<Session>,
    storage: StorageManager,
    transport: Arc<dyn RefreshTransport>,
    codec: TokenCodec,
    config: RefreshConfig,
}

impl RefreshCoordinator {
    /// Creates a coordinator for `session`.
    pub fn new(
        session: Arc<Session>,
        storage: StorageManager,
        transport: Arc<dyn RefreshTransport>,
        codec: TokenCodec,
        config: RefreshConfig,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                session,
                storage,
                transport,
                codec,
                config,
            }),
        }
    }

    /// Current phase.
    pub fn phase(&self) -> RefreshPhase {
        self.inner.session.attempts().lock_or_recover().phase
    }

    /// Consecutive failed attempts since the last success or reset.
    pub fn attempt_count(&self) -> u32 {
        self.inner.session.attempts().lock_or_recover().attempt_count
    }

    /// Obtain a new access token, joining the in-flight attempt if any.
    pub async fn refresh(&self) -> RefreshResult {
        let pending = {
            let mut state = self.inner.session.attempts().lock_or_recover();
            match (state.phase, state.in_flight.clone()) {
                (RefreshPhase::Terminated, _) => return Err(RefreshError::Exhausted),
                (RefreshPhase::Refreshing, Some(in_flight)) => {
                    debug!("Joining in-flight refresh");
                    in_flight
                }
                _ => {
                    if let Some(outcome) = self.cooldown_outcome(&state) {
                        return outcome;
                    }
                    self.start(&mut state)
                }
            }
        };
        pending.await
    }

    /// Clear attempt state. Any running attempt is disowned.
    pub fn reset(&self) {
        let mut state = self.inner.session.attempts().lock_or_recover();
        let seq = state.seq + 1;
        *state = RefreshAttemptState {
            seq,
            ..Default::default()
        };
        debug!("Refresh state reset");
    }

    /// The last outcome, if the previous network attempt is within the
    /// minimum interval.
    fn cooldown_outcome(&self, state: &RefreshAttemptState) -> Option<RefreshResult> {
        let last = state.last_attempt_at?;
        if last.elapsed() >= self.inner.config.min_interval() {
            return None;
        }
        let outcome = state.last_outcome.clone()?;
        debug!(
            since_ms = last.elapsed().as_millis() as u64,
            "Refresh within minimum interval, reusing last outcome"
        );
        Some(outcome)
    }

    fn start(&self, state: &mut RefreshAttemptState) -> SharedRefresh {
        state.seq += 1;
        let seq = state.seq;
        let generation = self.inner.session.generation();

        let task_inner = Arc::clone(&self.inner);
        let handle = tokio::spawn(async move {
            let (outcome, networked) = task_inner.attempt(generation).await;
            task_inner.settle(seq, networked, outcome)
        });

        let join_inner = Arc::clone(&self.inner);
        let shared = async move {
            match handle.await {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!(error = %e, "Refresh task failed");
                    join_inner.settle(
                        seq,
                        true,
                        Err(RefreshError::NetworkFailure(format!("refresh task failed: {e}"))),
                    )
                }
            }
        }
        .boxed()
        .shared();

        state.phase = RefreshPhase::Refreshing;
        state.in_flight = Some(shared.clone());
        shared
    }
}

impl Inner {
    /// Run one attempt. The flag reports whether the network was used.
    async fn attempt(&self, generation: u64) -> (RefreshResult, bool) {
        let stored = self.storage.read_credentials().await;
        let Some(refresh_token) = stored.refresh_token else {
            debug!(generation, "No refresh token stored, skipping refresh");
            return (Err(RefreshError::NoRefreshToken), false);
        };

        let attempt = self.session.attempts().lock_or_recover().attempt_count + 1;
        info!(
            session_id = %self.session.id(),
            generation,
            attempt,
            "Refreshing access token"
        );

        let grant = match self.transport.refresh(&refresh_token).await {
            Ok(response) => self.accept(response),
            Err(e) => Err(RefreshError::from(e)),
        };
        match grant {
            Ok(grant) => (self.persist(generation, grant).await, true),
            Err(e) => (Err(e), true),
        }
    }

    /// Validate a response into a grant.
    fn accept(&self, response: RefreshResponse) -> Result<TokenGrant, RefreshError> {
        let access = response
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| RefreshError::InvalidResponse("missing access token".to_string()))?;
        let refresh = response
            .refresh_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| RefreshError::InvalidResponse("missing refresh token".to_string()))?;
        self.codec
            .decode(&access)
            .map_err(|e| RefreshError::InvalidResponse(format!("undecodable access token: {e}")))?;
        if self.codec.is_expired(&access) {
            return Err(RefreshError::InvalidResponse(
                "issued access token is already expired".to_string(),
            ));
        }

        Ok(TokenGrant {
            access_token: AccessToken::new(access),
            refresh_token: RefreshToken::new(refresh),
            expires_at: response.expires_at,
            refresh_expires_at: response.refresh_expires_at,
        })
    }

    /// Write a grant, unless the session moved on while we were refreshing.
    async fn persist(&self, generation: u64, grant: TokenGrant) -> RefreshResult {
        let _gate = self.session.write_gate().lock().await;
        if self.session.generation() != generation {
            info!(
                generation,
                current = self.session.generation(),
                "Session changed during refresh, discarding result"
            );
            return Err(RefreshError::Superseded);
        }

        let access = grant.access_token.clone();
        let set = grant.into_credential_set(Utc::now() + self.config.refresh_ttl());
        if let Err(e) = self.storage.write_credentials(&set).await {
            error!(error = %e, "Refreshed credentials were not fully persisted");
        }
        Ok(access)
    }

    /// Fold an attempt's outcome into the state machine and return what
    /// callers observe.
    fn settle(&self, seq: u64, networked: bool, outcome: RefreshResult) -> RefreshResult {
        let mut state = self.session.attempts().lock_or_recover();
        if state.seq != seq {
            return outcome;
        }
        state.in_flight = None;

        let max_attempts = self.config.max_attempts.max(1);
        let outcome = match outcome {
            Ok(token) => {
                state.attempt_count = 0;
                state.phase = RefreshPhase::Idle;
                info!("Access token refreshed");
                Ok(token)
            }
            Err(e) if e.is_retryable() => {
                state.attempt_count += 1;
                if state.attempt_count >= max_attempts {
                    state.phase = RefreshPhase::Terminated;
                    warn!(
                        attempts = state.attempt_count,
                        error = %e,
                        "Refresh attempts exhausted"
                    );
                    Err(RefreshError::Exhausted)
                } else {
                    state.phase = RefreshPhase::Idle;
                    warn!(
                        attempt = state.attempt_count,
                        max_attempts,
                        error = %e,
                        "Refresh attempt failed"
                    );
                    Err(e)
                }
            }
            Err(e) => {
                state.phase = RefreshPhase::Idle;
                Err(e)
            }
        };

        if networked {
            state.last_attempt_at = Some(Instant::now());
            state.last_outcome = Some(outcome.clone());
        }
        outcome
    }
}
