//! Credential storage backend configuration.

use serde::{Deserialize, Serialize};

/// Which backends are enabled and how each is set up.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// In-process session store.
    #[serde(default)]
    pub volatile: VolatileStorageConfig,
    /// Durable local JSON document.
    #[serde(default)]
    pub durable: DurableStorageConfig,
    /// Embedded SQLite store.
    #[serde(default)]
    pub embedded: EmbeddedStorageConfig,
    /// Cookie jar.
    #[serde(default)]
    pub cookie: CookieStorageConfig,
}

/// Volatile (in-memory) backend configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VolatileStorageConfig {
    /// Whether the backend participates.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Maximum number of entries held.
    #[serde(default = "default_max_capacity")]
    pub max_capacity: u64,
}

impl Default for VolatileStorageConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_capacity: default_max_capacity(),
        }
    }
}

/// Durable local document backend configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DurableStorageConfig {
    /// Whether the backend participates.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Path of the JSON document.
    #[serde(default = "default_durable_path")]
    pub path: String,
    /// Maximum serialized document size in bytes.
    #[serde(default = "default_quota_bytes")]
    pub quota_bytes: u64,
    /// Prefix applied to every persisted key.
    #[serde(default)]
    pub key_prefix: String,
}

impl Default for DurableStorageConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: default_durable_path(),
            quota_bytes: default_quota_bytes(),
            key_prefix: String::new(),
        }
    }
}

/// Embedded transactional backend configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddedStorageConfig {
    /// Whether the backend participates.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Path of the SQLite database file.
    #[serde(default = "default_embedded_path")]
    pub path: String,
    /// Name of the key-value table.
    #[serde(default = "default_table")]
    pub table: String,
}

impl Default for EmbeddedStorageConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: default_embedded_path(),
            table: default_table(),
        }
    }
}

/// Cookie jar backend configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CookieStorageConfig {
    /// Whether the backend participates.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Origin URL cookies are scoped to.
    #[serde(default = "default_origin")]
    pub origin: String,
    /// Cookie lifetime in seconds.
    #[serde(default = "default_max_age")]
    pub max_age_seconds: u64,
    /// Prefix applied to every cookie name.
    #[serde(default)]
    pub key_prefix: String,
}

impl Default for CookieStorageConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            origin: default_origin(),
            max_age_seconds: default_max_age(),
            key_prefix: String::new(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_max_capacity() -> u64 {
    64
}

fn default_durable_path() -> String {
    "data/credentials.json".to_string()
}

fn default_quota_bytes() -> u64 {
    16 * 1024
}

fn default_embedded_path() -> String {
    "data/credentials.db".to_string()
}

fn default_table() -> String {
    "credentials".to_string()
}

fn default_origin() -> String {
    "http://127.0.0.1:8080/".to_string()
}

fn default_max_age() -> u64 {
    86_400
}
