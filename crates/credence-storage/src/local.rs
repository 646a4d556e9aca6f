//! Durable credential store: one JSON document on the local filesystem.

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use credence_core::config::storage::DurableStorageConfig;
use credence_core::traits::{BackendError, StorageBackend};
use credence_core::types::{BackendKind, CredentialKey, StoredCredentialSet};

/// The on-disk document: persisted key name to value.
type Document = BTreeMap<String, String>;

/// Durable store writing a single JSON document via temp file and rename.
#[derive(Debug)]
pub struct LocalFileBackend {
    /// Path of the JSON document.
    path: PathBuf,
    /// Maximum serialized size in bytes.
    quota_bytes: u64,
    /// Prefix applied to every key.
    key_prefix: String,
    /// Serializes read-modify-write cycles within this process.
    write_lock: Mutex<()>,
}

impl LocalFileBackend {
    /// Create a durable store from configuration. No I/O happens until first use.
    pub fn new(config: &DurableStorageConfig) -> Self {
        Self::with_path(&config.path, config.quota_bytes, &config.key_prefix)
    }

    /// Create a durable store at an explicit path.
    pub fn with_path(path: impl AsRef<Path>, quota_bytes: u64, key_prefix: &str) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            quota_bytes,
            key_prefix: key_prefix.to_string(),
            write_lock: Mutex::new(()),
        }
    }

    /// Path of the backing document.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn doc_key(&self, key: CredentialKey) -> String {
        format!("{}{}", self.key_prefix, key.as_str())
    }

    async fn load(&self) -> Result<Document, BackendError> {
        match fs::read(&self.path).await {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| {
                BackendError::Corrupted(format!("{}: {e}", self.path.display()))
            }),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Document::new()),
            Err(e) => Err(BackendError::Io(format!("{}: {e}", self.path.display()))),
        }
    }

    /// Load for modification; a corrupt document is discarded and rebuilt.
    async fn load_for_update(&self) -> Result<Document, BackendError> {
        match self.load().await {
            Err(BackendError::Corrupted(reason)) => {
                warn!(path = %self.path.display(), reason, "Discarding corrupt credential document");
                Ok(Document::new())
            }
            other => other,
        }
    }

    async fn store(&self, doc: &Document) -> Result<(), BackendError> {
        let bytes =
            serde_json::to_vec_pretty(doc).map_err(|e| BackendError::Io(e.to_string()))?;
        let required = bytes.len() as u64;
        if required > self.quota_bytes {
            return Err(BackendError::QuotaExceeded {
                required,
                quota: self.quota_bytes,
            });
        }

        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, &bytes)
            .await
            .map_err(|e| BackendError::Io(format!("{}: {e}", tmp.display())))?;
        fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| BackendError::Io(format!("{}: {e}", self.path.display())))?;

        debug!(path = %self.path.display(), bytes = required, "Wrote credential document");
        Ok(())
    }

    async fn update(&self, mutate: impl FnOnce(&mut Document) -> bool) -> Result<(), BackendError> {
        let _guard = self.write_lock.lock().await;
        let mut doc = self.load_for_update().await?;
        if mutate(&mut doc) {
            self.store(&doc).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl StorageBackend for LocalFileBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Durable
    }

    async fn probe(&self) -> Result<(), BackendError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await.map_err(|e| {
                BackendError::Unsupported(format!("{}: {e}", parent.display()))
            })?;
        }
        Ok(())
    }

    async fn get(&self, key: CredentialKey) -> Result<Option<String>, BackendError> {
        Ok(self.load().await?.remove(&self.doc_key(key)))
    }

    async fn set(&self, key: CredentialKey, value: &str) -> Result<(), BackendError> {
        let doc_key = self.doc_key(key);
        self.update(|doc| {
            doc.insert(doc_key, value.to_string());
            true
        })
        .await
    }

    async fn delete(&self, key: CredentialKey) -> Result<(), BackendError> {
        let doc_key = self.doc_key(key);
        self.update(|doc| doc.remove(&doc_key).is_some()).await
    }

    async fn read_set(&self) -> Result<StoredCredentialSet, BackendError> {
        let mut doc = self.load().await?;
        let mut set = StoredCredentialSet::default();
        for key in CredentialKey::ALL {
            if let Some(value) = doc.remove(&self.doc_key(key)) {
                set.apply(key, value);
            }
        }
        Ok(set)
    }

    /// Applies the whole set in one document rewrite.
    async fn write_set(&self, set: &StoredCredentialSet) -> Result<(), BackendError> {
        let entries: Vec<(String, Option<String>)> = CredentialKey::ALL
            .iter()
            .map(|key| (self.doc_key(*key), set.value_of(*key)))
            .collect();
        self.update(|doc| {
            for (doc_key, value) in entries {
                match value {
                    Some(value) => {
                        doc.insert(doc_key, value);
                    }
                    None => {
                        doc.remove(&doc_key);
                    }
                }
            }
            true
        })
        .await
    }

    async fn clear(&self) -> Result<(), BackendError> {
        self.write_set(&StoredCredentialSet::default()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use credence_core::types::{AccessToken, RefreshToken};

    fn backend_in(dir: &tempfile::TempDir, quota: u64) -> LocalFileBackend {
        LocalFileBackend::with_path(dir.path().join("creds.json"), quota, "")
    }

    #[tokio::test]
    async fn test_values_persist_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let backend = backend_in(&dir, 16 * 1024);
        backend.probe().await.unwrap();
        backend.set(CredentialKey::RefreshToken, "r-1").await.unwrap();

        let reopened = backend_in(&dir, 16 * 1024);
        assert_eq!(
            reopened.get(CredentialKey::RefreshToken).await.unwrap(),
            Some("r-1".to_string())
        );
    }

    #[tokio::test]
    async fn test_quota_exceeded_leaves_document_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let backend = backend_in(&dir, 64);
        backend.set(CredentialKey::RefreshToken, "r").await.unwrap();

        let big = "x".repeat(128);
        let err = backend.set(CredentialKey::AccessToken, &big).await.unwrap_err();
        assert!(matches!(err, BackendError::QuotaExceeded { quota: 64, .. }));
        assert_eq!(backend.get(CredentialKey::AccessToken).await.unwrap(), None);
        assert_eq!(
            backend.get(CredentialKey::RefreshToken).await.unwrap(),
            Some("r".to_string())
        );
    }

    #[tokio::test]
    async fn test_corrupt_document_reported_then_overwritten() {
        let dir = tempfile::tempdir().unwrap();
        let backend = backend_in(&dir, 16 * 1024);
        std::fs::write(backend.path(), b"{not json").unwrap();

        let err = backend.get(CredentialKey::AccessToken).await.unwrap_err();
        assert!(matches!(err, BackendError::Corrupted(_)));

        let set = StoredCredentialSet::new(
            AccessToken::new("a"),
            RefreshToken::new("r"),
            chrono::Utc::now(),
        );
        backend.write_set(&set).await.unwrap();
        assert_eq!(backend.read_set().await.unwrap(), set);
    }

    #[tokio::test]
    async fn test_key_prefix_namespaces_document() {
        let dir = tempfile::tempdir().unwrap();
        let backend = LocalFileBackend::with_path(dir.path().join("c.json"), 4096, "app1.");
        backend.set(CredentialKey::AccessToken, "a").await.unwrap();

        let raw = std::fs::read_to_string(backend.path()).unwrap();
        assert!(raw.contains("app1.accessToken"));
    }

    #[tokio::test]
    async fn test_probe_fails_when_parent_is_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, b"").unwrap();
        let backend = LocalFileBackend::with_path(blocker.join("creds.json"), 4096, "");

        let err = backend.probe().await.unwrap_err();
        assert!(err.is_unsupported());
    }
}
