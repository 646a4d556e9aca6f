//! Storage backend trait for pluggable credential persistence media.

use std::fmt;

use async_trait::async_trait;
use thiserror::Error;

use crate::error::AppError;
use crate::types::{BackendKind, CredentialKey, StoredCredentialSet};

/// Failure of a single storage medium.
///
/// These never cross the token façade; the storage manager logs them and
/// skips the failing backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    /// The medium is not available in this process and never will be.
    #[error("backend unsupported: {0}")]
    Unsupported(String),
    /// The write would exceed the medium's quota.
    #[error("quota exceeded: {required} bytes needed, {quota} allowed")]
    QuotaExceeded {
        /// Bytes the write would occupy.
        required: u64,
        /// Configured quota in bytes.
        quota: u64,
    },
    /// The backing container (table, document) does not exist.
    #[error("container missing: {0}")]
    ContainerMissing(String),
    /// Generic I/O failure.
    #[error("I/O failure: {0}")]
    Io(String),
    /// Stored data could not be parsed.
    #[error("corrupted data: {0}")]
    Corrupted(String),
}

impl BackendError {
    /// Whether this error marks the backend as permanently absent.
    pub fn is_unsupported(&self) -> bool {
        matches!(self, Self::Unsupported(_))
    }
}

impl From<BackendError> for AppError {
    fn from(err: BackendError) -> Self {
        AppError::with_source(
            crate::error::ErrorKind::Storage,
            format!("Storage backend error: {err}"),
            err,
        )
    }
}

/// Uniform key-value contract implemented once per storage medium.
///
/// Values are strings in the persisted layout (`accessToken`,
/// `refreshToken`, `refreshExpiresAt`). Implementations are responsible for
/// key prefixing and encoding.
#[async_trait]
pub trait StorageBackend: Send + Sync + fmt::Debug + 'static {
    /// Which medium this backend represents.
    fn kind(&self) -> BackendKind;

    /// Check that the medium is usable.
    async fn probe(&self) -> Result<(), BackendError>;

    /// Read one key. `None` when absent.
    async fn get(&self, key: CredentialKey) -> Result<Option<String>, BackendError>;

    /// Write one key.
    async fn set(&self, key: CredentialKey, value: &str) -> Result<(), BackendError>;

    /// Remove one key. Removing an absent key succeeds.
    async fn delete(&self, key: CredentialKey) -> Result<(), BackendError>;

    /// Read every key into a credential set.
    async fn read_set(&self) -> Result<StoredCredentialSet, BackendError> {
        let mut set = StoredCredentialSet::default();
        for key in CredentialKey::ALL {
            if let Some(value) = self.get(key).await? {
                set.apply(key, value);
            }
        }
        Ok(set)
    }

    /// Write a whole credential set; `None` fields are deleted.
    async fn write_set(&self, set: &StoredCredentialSet) -> Result<(), BackendError> {
        for key in CredentialKey::ALL {
            match set.value_of(key) {
                Some(value) => self.set(key, &value).await?,
                None => self.delete(key).await?,
            }
        }
        Ok(())
    }

    /// Remove every key.
    async fn clear(&self) -> Result<(), BackendError> {
        for key in CredentialKey::ALL {
            self.delete(key).await?;
        }
        Ok(())
    }
}
