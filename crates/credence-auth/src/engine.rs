//! Wires storage, refresh and the token façade from configuration.

use std::sync::Arc;

use reqwest::cookie::Jar;
use tracing::info;

use credence_core::config::AppConfig;
use credence_core::result::AppResult;
use credence_core::traits::RefreshTransport;
use credence_storage::StorageManager;

use crate::jwt::TokenCodec;
use crate::lifecycle::LifecycleWatcher;
use crate::refresh::RefreshCoordinator;
use crate::service::TokenService;
use crate::session::Session;
use crate::transport::HttpRefreshTransport;

/// The assembled credential engine.
#[derive(Debug, Clone)]
pub struct CredentialEngine {
    storage: StorageManager,
    service: TokenService,
    watcher: Arc<LifecycleWatcher>,
}

impl CredentialEngine {
    /// Build the engine from configuration, talking HTTP to the auth server.
    ///
    /// The cookie backend and the HTTP client share one cookie jar.
    pub fn from_config(config: &AppConfig) -> AppResult<Self> {
        let jar = Arc::new(Jar::default());
        let storage = StorageManager::from_config(&config.storage, Arc::clone(&jar));
        let transport = HttpRefreshTransport::new(&config.auth_server, jar)?;
        info!(refresh_url = %config.auth_server.refresh_url, "Credential engine configured");
        Ok(Self::with_parts(config, storage, Arc::new(transport)))
    }

    /// Build the engine over explicit storage and transport.
    pub fn with_parts(
        config: &AppConfig,
        storage: StorageManager,
        transport: Arc<dyn RefreshTransport>,
    ) -> Self {
        let session = Arc::new(Session::new());
        let codec = TokenCodec::new(config.refresh.expiry_skew_seconds);
        let coordinator = RefreshCoordinator::new(
            Arc::clone(&session),
            storage.clone(),
            transport,
            codec,
            config.refresh.clone(),
        );
        let service = TokenService::new(
            session,
            storage.clone(),
            coordinator,
            codec,
            config.refresh.clone(),
        );
        let watcher = Arc::new(LifecycleWatcher::new(
            service.clone(),
            storage.clone(),
            config.lifecycle.clone(),
        ));
        Self {
            storage,
            service,
            watcher,
        }
    }

    /// The token façade.
    pub fn service(&self) -> &TokenService {
        &self.service
    }

    /// The storage manager.
    pub fn storage(&self) -> &StorageManager {
        &self.storage
    }

    /// The lifecycle watcher.
    pub fn watcher(&self) -> Arc<LifecycleWatcher> {
        Arc::clone(&self.watcher)
    }
}
