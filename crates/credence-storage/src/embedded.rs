//! Embedded transactional credential store on SQLite.
//!
//! Credentials live in a single key-value table (the container). The
//! container may disappear underneath us (first use, external eviction);
//! every operation detects that, recreates the table and retries once.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::{Connection, OptionalExtension, params};
use tracing::{debug, info, warn};

use credence_core::config::storage::EmbeddedStorageConfig;
use credence_core::traits::{BackendError, StorageBackend};
use credence_core::types::{BackendKind, CredentialKey, StoredCredentialSet};

use crate::blocking;
use crate::sync::MutexExt;

/// SQLite-backed store. The connection is opened lazily on first use.
#[derive(Debug, Clone)]
pub struct EmbeddedBackend {
    /// Path of the database file.
    path: PathBuf,
    /// Name of the key-value table.
    table: String,
    /// Lazily opened connection.
    conn: Arc<Mutex<Option<Connection>>>,
}

impl EmbeddedBackend {
    /// Create an embedded store from configuration.
    pub fn new(config: &EmbeddedStorageConfig) -> Self {
        Self::with_path(&config.path, &config.table)
    }

    /// Create an embedded store at an explicit path.
    pub fn with_path(path: impl AsRef<Path>, table: &str) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            table: table.to_string(),
            conn: Arc::new(Mutex::new(None)),
        }
    }

    /// Whether the store can currently serve reads, recreating the container
    /// if needed. Never raises.
    pub async fn is_usable(&self) -> bool {
        let table = self.table.clone();
        let result = self
            .with_container("is_usable", move |conn| {
                conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |_| Ok(()))
            })
            .await;
        if let Err(e) = &result {
            debug!(error = %e, "Embedded credential store not usable");
        }
        result.is_ok()
    }

    /// Run `op` against the table, recreating it and retrying once when the
    /// container is missing.
    async fn with_container<T, F>(&self, label: &'static str, op: F) -> Result<T, BackendError>
    where
        T: Send + 'static,
        F: Fn(&mut Connection) -> rusqlite::Result<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        let path = self.path.clone();
        let table = self.table.clone();

        blocking::run(label, move || {
            let mut guard = conn.lock_or_recover();
            let connection = open_if_needed(&mut guard, &path)?;

            match op(&mut *connection).map_err(|e| classify(&table, e)) {
                Err(BackendError::ContainerMissing(_)) => {
                    warn!(table = %table, "Credential table missing, recreating");
                    create_table(connection, &table)?;
                    op(&mut *connection).map_err(|e| classify(&table, e))
                }
                other => other,
            }
        })
        .await
    }
}

fn open_if_needed<'a>(
    slot: &'a mut Option<Connection>,
    path: &Path,
) -> Result<&'a mut Connection, BackendError> {
    if slot.is_none() {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| BackendError::Unsupported(format!("{}: {e}", parent.display())))?;
        }
        let conn = Connection::open(path)
            .map_err(|e| BackendError::Unsupported(format!("{}: {e}", path.display())))?;
        info!(path = %path.display(), "Opened embedded credential store");
        *slot = Some(conn);
    }
    slot.as_mut()
        .ok_or_else(|| BackendError::Unsupported("connection unavailable".to_string()))
}

fn create_table(conn: &Connection, table: &str) -> Result<(), BackendError> {
    conn.execute(
        &format!(
            "CREATE TABLE IF NOT EXISTS {table} (
                key TEXT PRIMARY KEY NOT NULL,
                value TEXT NOT NULL
            )"
        ),
        [],
    )
    .map(|_| ())
    .map_err(|e| BackendError::Io(e.to_string()))
}

fn classify(table: &str, err: rusqlite::Error) -> BackendError {
    let message = err.to_string();
    if message.contains("no such table") {
        BackendError::ContainerMissing(table.to_string())
    } else {
        BackendError::Io(message)
    }
}

fn is_valid_table_name(table: &str) -> bool {
    !table.is_empty()
        && table
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !table.starts_with(|c: char| c.is_ascii_digit())
}

#[async_trait]
impl StorageBackend for EmbeddedBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Embedded
    }

    async fn probe(&self) -> Result<(), BackendError> {
        if !is_valid_table_name(&self.table) {
            return Err(BackendError::Unsupported(format!(
                "invalid table name '{}'",
                self.table
            )));
        }
        let conn = Arc::clone(&self.conn);
        let path = self.path.clone();
        let table = self.table.clone();
        blocking::run("probe", move || {
            let mut guard = conn.lock_or_recover();
            let connection = open_if_needed(&mut guard, &path)?;
            create_table(connection, &table)
        })
        .await
    }

    async fn get(&self, key: CredentialKey) -> Result<Option<String>, BackendError> {
        let sql = format!("SELECT value FROM {} WHERE key = ?1", self.table);
        self.with_container("get", move |conn| {
            conn.query_row(&sql, params![key.as_str()], |row| row.get::<_, String>(0))
                .optional()
        })
        .await
    }

    async fn set(&self, key: CredentialKey, value: &str) -> Result<(), BackendError> {
        let sql = format!(
            "INSERT INTO {} (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            self.table
        );
        let value = value.to_string();
        self.with_container("set", move |conn| {
            conn.execute(&sql, params![key.as_str(), value]).map(|_| ())
        })
        .await
    }

    async fn delete(&self, key: CredentialKey) -> Result<(), BackendError> {
        let sql = format!("DELETE FROM {} WHERE key = ?1", self.table);
        self.with_container("delete", move |conn| {
            conn.execute(&sql, params![key.as_str()]).map(|_| ())
        })
        .await
    }

    /// Applies every key in one transaction.
    async fn write_set(&self, set: &StoredCredentialSet) -> Result<(), BackendError> {
        let upsert = format!(
            "INSERT INTO {} (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            self.table
        );
        let remove = format!("DELETE FROM {} WHERE key = ?1", self.table);
        let entries: Vec<(CredentialKey, Option<String>)> = CredentialKey::ALL
            .iter()
            .map(|key| (*key, set.value_of(*key)))
            .collect();

        self.with_container("write_set", move |conn| {
            let tx = conn.transaction()?;
            for (key, value) in &entries {
                match value {
                    Some(value) => tx.execute(&upsert, params![key.as_str(), value])?,
                    None => tx.execute(&remove, params![key.as_str()])?,
                };
            }
            tx.commit()
        })
        .await
    }
}
