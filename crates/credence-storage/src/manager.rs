//! Storage manager: read priority, write fan-out and reconciliation across
//! every configured credential backend.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures::future::join_all;
use serde::Serialize;
use tokio::sync::{OnceCell, RwLock};
use tracing::{debug, info, warn};

use credence_core::config::storage::StorageConfig;
use credence_core::error::AppError;
use credence_core::result::AppResult;
use credence_core::traits::{BackendError, StorageBackend};
use credence_core::types::{BackendKind, CredentialKey, StoredCredentialSet};

/// One registered backend and its availability state.
#[derive(Debug)]
struct Member {
    backend: Arc<dyn StorageBackend>,
    /// Probe result, computed once per process.
    probed: OnceCell<bool>,
    /// Set once the backend reported itself unsupported.
    disabled: AtomicBool,
}

impl Member {
    fn kind(&self) -> BackendKind {
        self.backend.kind()
    }

    async fn is_available(&self) -> bool {
        let probed = *self
            .probed
            .get_or_init(|| async {
                match self.backend.probe().await {
                    Ok(()) => {
                        debug!(backend = %self.kind(), "Credential backend available");
                        true
                    }
                    Err(e) => {
                        warn!(backend = %self.kind(), error = %e, "Credential backend unavailable");
                        false
                    }
                }
            })
            .await;
        probed && !self.disabled.load(Ordering::Acquire)
    }

    /// Record a backend failure; unsupported backends are dropped for good.
    fn note_failure(&self, operation: &str, err: &BackendError) {
        if err.is_unsupported() {
            if !self.disabled.swap(true, Ordering::AcqRel) {
                warn!(backend = %self.kind(), operation, error = %err, "Credential backend disabled");
            }
        } else {
            warn!(backend = %self.kind(), operation, error = %err, "Credential backend operation failed");
        }
    }
}

/// Outcome of a fan-out write.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteReport {
    /// Backends that accepted the write.
    pub written: Vec<BackendKind>,
    /// Backends that failed, with their error.
    pub failed: Vec<(BackendKind, BackendError)>,
}

impl WriteReport {
    /// Whether every backend accepted the write.
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Outcome of a reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    /// Backends that were read.
    pub inspected: Vec<BackendKind>,
    /// Backend whose refresh token won, if any backend held one.
    pub winner: Option<BackendKind>,
    /// Backends rewritten with the winning value.
    pub repaired: Vec<BackendKind>,
    /// Backends whose repair write failed.
    pub failed: Vec<BackendKind>,
}

impl ReconcileReport {
    /// Whether all inspected backends already agreed.
    pub fn was_consistent(&self) -> bool {
        self.repaired.is_empty() && self.failed.is_empty()
    }
}

/// Per-backend diagnostic view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackendSnapshot {
    /// Which backend.
    pub kind: BackendKind,
    /// Whether the backend is in use.
    pub available: bool,
    /// Keys currently present.
    pub keys: Vec<CredentialKey>,
    /// Read error, if the read failed.
    pub error: Option<String>,
}

/// Aggregates the credential backends.
///
/// Backends are held in read-priority order (volatile, durable, embedded,
/// cookie). The manager is the only component touching them.
///
/// Writes, clears and reconciliation hold an exclusive guard for their
/// whole read-then-write span; reads share it. A reconcile can therefore
/// never write back values that a concurrent write or clear replaced.
#[derive(Debug, Clone)]
pub struct StorageManager {
    members: Arc<Vec<Member>>,
    guard: Arc<RwLock<()>>,
}

impl StorageManager {
    /// Create a manager over explicit backends.
    pub fn new(backends: Vec<Arc<dyn StorageBackend>>) -> Self {
        let mut members: Vec<Member> = backends
            .into_iter()
            .map(|backend| Member {
                backend,
                probed: OnceCell::new(),
                disabled: AtomicBool::new(false),
            })
            .collect();
        members.sort_by_key(|m| m.kind());
        Self {
            members: Arc::new(members),
            guard: Arc::new(RwLock::new(())),
        }
    }

    /// Build the enabled backends from configuration.
    ///
    /// The cookie backend writes into `jar`, which should also be handed to
    /// the HTTP refresh transport.
    #[cfg(feature = "cookie")]
    pub fn from_config(config: &StorageConfig, jar: Arc<reqwest::cookie::Jar>) -> Self {
        let mut backends = Self::local_backends(config);
        if config.cookie.enabled {
            backends.push(Arc::new(crate::cookie::CookieBackend::new(&config.cookie, jar)));
        }
        Self::finish_from_config(backends)
    }

    /// Build the enabled backends from configuration.
    #[cfg(not(feature = "cookie"))]
    pub fn from_config(config: &StorageConfig) -> Self {
        Self::finish_from_config(Self::local_backends(config))
    }

    fn local_backends(config: &StorageConfig) -> Vec<Arc<dyn StorageBackend>> {
        let mut backends: Vec<Arc<dyn StorageBackend>> = Vec::new();
        if config.volatile.enabled {
            backends.push(Arc::new(crate::volatile::VolatileBackend::new(&config.volatile)));
        }
        if config.durable.enabled {
            backends.push(Arc::new(crate::local::LocalFileBackend::new(&config.durable)));
        }
        #[cfg(feature = "embedded")]
        if config.embedded.enabled {
            backends.push(Arc::new(crate::embedded::EmbeddedBackend::new(&config.embedded)));
        }
        backends
    }

    fn finish_from_config(backends: Vec<Arc<dyn StorageBackend>>) -> Self {
        let kinds: Vec<&str> = backends.iter().map(|b| b.kind().as_str()).collect();
        info!(backends = ?kinds, "Initializing credential storage");
        Self::new(backends)
    }

    /// Kinds of every configured backend, in priority order.
    pub fn kinds(&self) -> Vec<BackendKind> {
        self.members.iter().map(Member::kind).collect()
    }

    async fn available(&self) -> Vec<&Member> {
        let checks = join_all(self.members.iter().map(|m| m.is_available())).await;
        self.members
            .iter()
            .zip(checks)
            .filter_map(|(m, ok)| ok.then_some(m))
            .collect()
    }

    /// Read each available backend; failures are logged and omitted.
    async fn read_all(&self) -> Vec<(BackendKind, StoredCredentialSet)> {
        let members = self.available().await;
        let reads = join_all(members.iter().map(|m| m.backend.read_set())).await;
        members
            .into_iter()
            .zip(reads)
            .filter_map(|(m, read)| match read {
                Ok(set) => Some((m.kind(), set)),
                Err(e) => {
                    m.note_failure("read", &e);
                    None
                }
            })
            .collect()
    }

    /// Resolve the current credentials.
    ///
    /// Each token comes from the highest-priority backend holding it; the
    /// refresh expiry is taken from the backend that supplied the refresh
    /// token.
    pub async fn read_credentials(&self) -> StoredCredentialSet {
        let _read = self.guard.read().await;
        let mut resolved = StoredCredentialSet::default();
        for (_, set) in self.read_all().await {
            if resolved.access_token.is_none() {
                resolved.access_token = set.access_token;
            }
            if resolved.refresh_token.is_none() && set.refresh_token.is_some() {
                resolved.refresh_token = set.refresh_token;
                resolved.refresh_expires_at = set.refresh_expires_at;
            }
        }
        resolved
    }

    /// Write `set` to every available backend concurrently. `None` fields
    /// are deleted.
    ///
    /// Succeeds when every available volatile/durable backend accepted the
    /// write, or, with neither present, when at least one backend did.
    pub async fn write_credentials(&self, set: &StoredCredentialSet) -> AppResult<WriteReport> {
        let _write = self.guard.write().await;
        let members = self.available().await;
        if members.is_empty() {
            return Err(AppError::storage("No credential backend available"));
        }

        let report = self.fan_out(&members, set).await;
        let essential_present = members.iter().any(|m| m.kind().is_essential());
        let essential_failed: Vec<BackendKind> = report
            .failed
            .iter()
            .map(|(kind, _)| *kind)
            .filter(BackendKind::is_essential)
            .collect();

        let ok = if essential_present {
            essential_failed.is_empty()
        } else {
            !report.written.is_empty()
        };

        if ok {
            debug!(written = ?report.written, failed = report.failed.len(), "Credentials written");
            Ok(report)
        } else {
            let detail: Vec<String> = report
                .failed
                .iter()
                .map(|(kind, e)| format!("{kind}: {e}"))
                .collect();
            Err(AppError::storage(format!(
                "Credential write failed: {}",
                detail.join("; ")
            )))
        }
    }

    async fn fan_out(&self, members: &[&Member], set: &StoredCredentialSet) -> WriteReport {
        let results = join_all(members.iter().map(|m| m.backend.write_set(set))).await;
        let mut report = WriteReport::default();
        for (m, result) in members.iter().zip(results) {
            match result {
                Ok(()) => report.written.push(m.kind()),
                Err(e) => {
                    m.note_failure("write", &e);
                    report.failed.push((m.kind(), e));
                }
            }
        }
        report
    }

    /// Bring every backend to the same refresh token.
    ///
    /// When backends disagree (absence counts as disagreement) the value with
    /// the latest `refreshExpiresAt` wins, ties and missing stamps going to
    /// the higher-priority backend. The winner's access token is propagated
    /// only if the winner holds one.
    pub async fn reconcile(&self) -> ReconcileReport {
        let _write = self.guard.write().await;
        let sets = self.read_all().await;
        let mut report = ReconcileReport {
            inspected: sets.iter().map(|(kind, _)| *kind).collect(),
            ..Default::default()
        };

        let mut winner: Option<(BackendKind, &StoredCredentialSet)> = None;
        for (kind, set) in &sets {
            if set.refresh_token.is_none() {
                continue;
            }
            let better = match winner {
                None => true,
                Some((_, best)) => set.refresh_expires_at > best.refresh_expires_at,
            };
            if better {
                winner = Some((*kind, set));
            }
        }

        let Some((winner_kind, winning)) = winner else {
            return report;
        };
        report.winner = Some(winner_kind);

        let members = self.available().await;
        let mut repairs = Vec::new();
        for (kind, current) in &sets {
            let mut target = current.clone();
            target.refresh_token = winning.refresh_token.clone();
            target.refresh_expires_at = winning.refresh_expires_at;
            if winning.access_token.is_some() {
                target.access_token = winning.access_token.clone();
            }
            if &target == current {
                continue;
            }
            if let Some(member) = members.iter().find(|m| m.kind() == *kind) {
                repairs.push((*member, target));
            }
        }

        let results = join_all(
            repairs
                .iter()
                .map(|(member, target)| member.backend.write_set(target)),
        )
        .await;
        for ((member, _), result) in repairs.iter().zip(results) {
            match result {
                Ok(()) => report.repaired.push(member.kind()),
                Err(e) => {
                    member.note_failure("reconcile", &e);
                    report.failed.push(member.kind());
                }
            }
        }

        if !report.was_consistent() {
            info!(
                winner = %winner_kind,
                repaired = ?report.repaired,
                failed = ?report.failed,
                "Reconciled divergent credentials"
            );
        }
        report
    }

    /// Delete every key from every available backend.
    pub async fn clear_all(&self) -> WriteReport {
        let _write = self.guard.write().await;
        let members = self.available().await;
        let results = join_all(members.iter().map(|m| m.backend.clear())).await;
        let mut report = WriteReport::default();
        for (m, result) in members.iter().zip(results) {
            match result {
                Ok(()) => report.written.push(m.kind()),
                Err(e) => {
                    m.note_failure("clear", &e);
                    report.failed.push((m.kind(), e));
                }
            }
        }
        info!(cleared = ?report.written, failed = report.failed.len(), "Cleared stored credentials");
        report
    }

    /// Per-backend availability and key presence.
    pub async fn snapshot(&self) -> Vec<BackendSnapshot> {
        let _read = self.guard.read().await;
        let mut snapshots = Vec::with_capacity(self.members.len());
        for m in self.members.iter() {
            if !m.is_available().await {
                snapshots.push(BackendSnapshot {
                    kind: m.kind(),
                    available: false,
                    keys: Vec::new(),
                    error: None,
                });
                continue;
            }
            let snapshot = match m.backend.read_set().await {
                Ok(set) => BackendSnapshot {
                    kind: m.kind(),
                    available: true,
                    keys: CredentialKey::ALL
                        .into_iter()
                        .filter(|key| set.value_of(*key).is_some())
                        .collect(),
                    error: None,
                },
                Err(e) => {
                    m.note_failure("snapshot", &e);
                    BackendSnapshot {
                        kind: m.kind(),
                        available: !e.is_unsupported(),
                        keys: Vec::new(),
                        error: Some(e.to_string()),
                    }
                }
            };
            snapshots.push(snapshot);
        }
        snapshots
    }
}
