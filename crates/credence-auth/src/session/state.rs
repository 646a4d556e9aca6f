//! The client-side session: a generation counter, a status, the storage
//! write gate and the refresh attempt state.

use std::fmt;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use credence_storage::sync::MutexExt;

use crate::refresh::RefreshAttemptState;

/// Lifecycle status of the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// No credentials are known.
    Unauthenticated,
    /// Credentials are established.
    Active,
    /// Refresh failed irrecoverably; no further refresh until a new login.
    Expired,
    /// The user logged out.
    Terminated,
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unauthenticated => write!(f, "unauthenticated"),
            Self::Active => write!(f, "active"),
            Self::Expired => write!(f, "expired"),
            Self::Terminated => write!(f, "terminated"),
        }
    }
}

/// Shared session state.
///
/// The generation is bumped on every session start and end; work tagged with
/// an older generation is discarded. Generation changes and credential
/// writes from a refresh both happen under the write gate.
#[derive(Debug)]
pub struct Session {
    /// Identifier for log correlation.
    id: Uuid,
    /// Current generation.
    generation: AtomicU64,
    /// Current status.
    status: Mutex<SessionStatus>,
    /// Serializes generation changes against refresh writes.
    write_gate: tokio::sync::Mutex<()>,
    /// Refresh state machine, owned by the refresh coordinator.
    attempts: Mutex<RefreshAttemptState>,
}

impl Session {
    /// Creates an unauthenticated session at generation 0.
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            generation: AtomicU64::new(0),
            status: Mutex::new(SessionStatus::Unauthenticated),
            write_gate: tokio::sync::Mutex::new(()),
            attempts: Mutex::new(RefreshAttemptState::default()),
        }
    }

    /// Session identifier.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Current generation.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Current status.
    pub fn status(&self) -> SessionStatus {
        *self.status.lock_or_recover()
    }

    /// Set the status without changing generation.
    pub fn set_status(&self, status: SessionStatus) {
        *self.status.lock_or_recover() = status;
    }

    /// Set the status only if the generation is still `generation`.
    /// Returns whether the status was changed.
    pub fn set_status_if_current(&self, generation: u64, status: SessionStatus) -> bool {
        let mut current = self.status.lock_or_recover();
        if self.generation() != generation {
            return false;
        }
        *current = status;
        true
    }

    /// Start a new generation with `status`. Callers hold the write gate.
    pub fn advance(&self, status: SessionStatus) -> u64 {
        let mut current = self.status.lock_or_recover();
        let next = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        *current = status;
        info!(session_id = %self.id, generation = next, status = %status, "Session generation advanced");
        next
    }

    /// The gate serializing generation changes against credential writes.
    pub fn write_gate(&self) -> &tokio::sync::Mutex<()> {
        &self.write_gate
    }

    pub(crate) fn attempts(&self) -> &Mutex<RefreshAttemptState> {
        &self.attempts
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_advance_bumps_generation_and_status() {
        let session = Session::new();
        assert_eq!(session.generation(), 0);
        assert_eq!(session.status(), SessionStatus::Unauthenticated);

        assert_eq!(session.advance(SessionStatus::Active), 1);
        assert_eq!(session.status(), SessionStatus::Active);
        assert_eq!(session.advance(SessionStatus::Terminated), 2);
    }

    #[test]
    fn test_stale_generation_cannot_change_status() {
        let session = Session::new();
        let first = session.advance(SessionStatus::Active);
        session.advance(SessionStatus::Terminated);

        assert!(!session.set_status_if_current(first, SessionStatus::Expired));
        assert_eq!(session.status(), SessionStatus::Terminated);
    }
}
