//! In-process volatile credential store backed by moka.

use async_trait::async_trait;
use moka::future::Cache;
use tracing::debug;

use credence_core::config::storage::VolatileStorageConfig;
use credence_core::traits::{BackendError, StorageBackend};
use credence_core::types::{BackendKind, CredentialKey};

/// Session-scoped store living only as long as the process.
#[derive(Debug, Clone)]
pub struct VolatileBackend {
    /// The underlying moka cache.
    cache: Cache<CredentialKey, String>,
}

impl VolatileBackend {
    /// Create a new volatile store from configuration.
    pub fn new(config: &VolatileStorageConfig) -> Self {
        let cache = Cache::builder().max_capacity(config.max_capacity).build();
        Self { cache }
    }
}

impl Default for VolatileBackend {
    fn default() -> Self {
        Self::new(&VolatileStorageConfig::default())
    }
}

#[async_trait]
impl StorageBackend for VolatileBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Volatile
    }

    async fn probe(&self) -> Result<(), BackendError> {
        Ok(())
    }

    async fn get(&self, key: CredentialKey) -> Result<Option<String>, BackendError> {
        Ok(self.cache.get(&key).await)
    }

    async fn set(&self, key: CredentialKey, value: &str) -> Result<(), BackendError> {
        self.cache.insert(key, value.to_string()).await;
        Ok(())
    }

    async fn delete(&self, key: CredentialKey) -> Result<(), BackendError> {
        self.cache.remove(&key).await;
        Ok(())
    }

    /// Wipes the medium, as when the hosting session ends.
    async fn clear(&self) -> Result<(), BackendError> {
        self.cache.invalidate_all();
        debug!("Volatile credential store wiped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_get_delete() {
        let backend = VolatileBackend::default();
        backend.set(CredentialKey::RefreshToken, "r-1").await.unwrap();
        assert_eq!(
            backend.get(CredentialKey::RefreshToken).await.unwrap(),
            Some("r-1".to_string())
        );
        backend.delete(CredentialKey::RefreshToken).await.unwrap();
        assert_eq!(backend.get(CredentialKey::RefreshToken).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_clear_wipes_all_keys() {
        let backend = VolatileBackend::default();
        backend.set(CredentialKey::AccessToken, "a").await.unwrap();
        backend.set(CredentialKey::RefreshToken, "r").await.unwrap();
        backend.clear().await.unwrap();
        assert!(backend.read_set().await.unwrap().is_empty());
    }
}
