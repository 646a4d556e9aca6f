//! Shared helpers for the credence-auth integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::Utc;
use tokio::sync::{Notify, Semaphore};

use credence_auth::CredentialEngine;
use credence_core::config::AppConfig;
use credence_core::traits::{
    BackendError, RefreshResponse, RefreshTransport, StorageBackend, TransportError,
};
use credence_core::types::{
    AccessToken, BackendKind, CredentialKey, RefreshToken, StoredCredentialSet, TokenGrant,
};
use credence_storage::{LocalFileBackend, StorageManager, VolatileBackend};

/// Mint an unsigned compact JWS expiring `exp_offset_secs` from now.
pub fn make_token(exp_offset_secs: i64, role: Option<&str>) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let mut claims = serde_json::json!({
        "sub": "user-1",
        "iat": Utc::now().timestamp(),
        "exp": Utc::now().timestamp() + exp_offset_secs,
    });
    if let Some(role) = role {
        claims["role"] = serde_json::Value::String(role.to_string());
    }
    let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
    format!("{header}.{payload}.c2lnbmF0dXJl")
}

/// A grant whose access token expires `exp_offset_secs` from now.
pub fn grant(exp_offset_secs: i64, refresh: &str) -> TokenGrant {
    TokenGrant {
        access_token: AccessToken::new(make_token(exp_offset_secs, Some("editor"))),
        refresh_token: RefreshToken::new(refresh),
        expires_at: None,
        refresh_expires_at: None,
    }
}

/// A successful refresh response.
pub fn success(access: &str, refresh: &str) -> RefreshResponse {
    RefreshResponse {
        access_token: Some(access.to_string()),
        refresh_token: Some(refresh.to_string()),
        expires_at: None,
        refresh_expires_at: Some(Utc::now() + chrono::Duration::hours(24)),
    }
}

/// Transport answering from a script, optionally holding each call until
/// released.
#[derive(Debug)]
pub struct ScriptedTransport {
    script: Mutex<VecDeque<Result<RefreshResponse, TransportError>>>,
    fallback: Result<RefreshResponse, TransportError>,
    calls: AtomicUsize,
    received: Mutex<Vec<String>>,
    gate: Option<Semaphore>,
}

impl ScriptedTransport {
    /// Always answer with `fallback`.
    pub fn always(fallback: Result<RefreshResponse, TransportError>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(VecDeque::new()),
            fallback,
            calls: AtomicUsize::new(0),
            received: Mutex::new(Vec::new()),
            gate: None,
        })
    }

    /// Always answer with `fallback`, but only after [`Self::release`].
    pub fn gated(fallback: Result<RefreshResponse, TransportError>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(VecDeque::new()),
            fallback,
            calls: AtomicUsize::new(0),
            received: Mutex::new(Vec::new()),
            gate: Some(Semaphore::new(0)),
        })
    }

    /// Answer the next call with `response` instead of the fallback.
    pub fn push(&self, response: Result<RefreshResponse, TransportError>) {
        self.script.lock().unwrap().push_back(response);
    }

    /// Let `n` held calls proceed.
    pub fn release(&self, n: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(n);
        }
    }

    /// Number of calls started.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Refresh tokens presented, in order.
    pub fn received(&self) -> Vec<String> {
        self.received.lock().unwrap().clone()
    }

    /// Wait until at least `n` calls have started.
    pub async fn wait_for_calls(&self, n: usize) {
        while self.calls() < n {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}

#[async_trait]
impl RefreshTransport for ScriptedTransport {
    async fn refresh(&self, refresh_token: &RefreshToken) -> Result<RefreshResponse, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.received
            .lock()
            .unwrap()
            .push(refresh_token.as_str().to_string());
        if let Some(gate) = &self.gate {
            gate.acquire().await.unwrap().forget();
        }
        let scripted = self.script.lock().unwrap().pop_front();
        scripted.unwrap_or_else(|| self.fallback.clone())
    }
}

/// Backend that, once armed, pauses its next whole-set read after taking
/// its copy, until released.
#[derive(Debug)]
pub struct HeldBackend {
    pub inner: Arc<dyn StorageBackend>,
    armed: AtomicBool,
    entered: Notify,
    gate: Semaphore,
}

impl HeldBackend {
    pub fn new(inner: Arc<dyn StorageBackend>) -> Arc<Self> {
        Arc::new(Self {
            inner,
            armed: AtomicBool::new(false),
            entered: Notify::new(),
            gate: Semaphore::new(0),
        })
    }

    /// Hold the next whole-set read.
    pub fn arm(&self) {
        self.armed.store(true, Ordering::SeqCst);
    }

    /// Wait until the armed read is being held.
    pub async fn held(&self) {
        self.entered.notified().await;
    }

    /// Let the held read return.
    pub fn release(&self) {
        self.gate.add_permits(1);
    }
}

#[async_trait]
impl StorageBackend for HeldBackend {
    fn kind(&self) -> BackendKind {
        self.inner.kind()
    }

    async fn probe(&self) -> Result<(), BackendError> {
        self.inner.probe().await
    }

    async fn get(&self, key: CredentialKey) -> Result<Option<String>, BackendError> {
        self.inner.get(key).await
    }

    async fn set(&self, key: CredentialKey, value: &str) -> Result<(), BackendError> {
        self.inner.set(key, value).await
    }

    async fn delete(&self, key: CredentialKey) -> Result<(), BackendError> {
        self.inner.delete(key).await
    }

    async fn read_set(&self) -> Result<StoredCredentialSet, BackendError> {
        let copy = self.inner.read_set().await?;
        if self.armed.swap(false, Ordering::SeqCst) {
            self.entered.notify_one();
            self.gate.acquire().await.unwrap().forget();
        }
        Ok(copy)
    }

    async fn write_set(&self, set: &StoredCredentialSet) -> Result<(), BackendError> {
        self.inner.write_set(set).await
    }

    async fn clear(&self) -> Result<(), BackendError> {
        self.inner.clear().await
    }
}

/// Engine wired to test doubles.
pub struct Harness {
    pub engine: CredentialEngine,
    pub transport: Arc<ScriptedTransport>,
    pub volatile: Arc<VolatileBackend>,
    pub durable: Option<Arc<LocalFileBackend>>,
    pub dir: Option<tempfile::TempDir>,
}

impl Harness {
    /// Volatile storage only; safe under paused time.
    pub fn volatile_only(transport: Arc<ScriptedTransport>) -> Self {
        let volatile = Arc::new(VolatileBackend::default());
        let storage = StorageManager::new(vec![volatile.clone() as Arc<dyn StorageBackend>]);
        let engine = CredentialEngine::with_parts(
            &AppConfig::default(),
            storage,
            transport.clone() as Arc<dyn RefreshTransport>,
        );
        Self {
            engine,
            transport,
            volatile,
            durable: None,
            dir: None,
        }
    }

    /// Volatile plus a durable document in a temp directory.
    pub fn with_durable(transport: Arc<ScriptedTransport>) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let durable = Arc::new(LocalFileBackend::with_path(
            dir.path().join("credentials.json"),
            16 * 1024,
            "",
        ));
        Self::over_durable(transport, durable, Some(dir))
    }

    /// A fresh engine (new process) over an existing durable document.
    pub fn over_durable(
        transport: Arc<ScriptedTransport>,
        durable: Arc<LocalFileBackend>,
        dir: Option<tempfile::TempDir>,
    ) -> Self {
        let volatile = Arc::new(VolatileBackend::default());
        let storage = StorageManager::new(vec![
            volatile.clone() as Arc<dyn StorageBackend>,
            durable.clone() as Arc<dyn StorageBackend>,
        ]);
        let engine = CredentialEngine::with_parts(
            &AppConfig::default(),
            storage,
            transport.clone() as Arc<dyn RefreshTransport>,
        );
        Self {
            engine,
            transport,
            volatile,
            durable: Some(durable),
            dir,
        }
    }
}
