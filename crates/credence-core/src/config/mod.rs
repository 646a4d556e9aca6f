//! Engine configuration schemas.
//!
//! All configuration structs are deserialized via the `config` crate from an
//! optional `config/default.toml`, an optional explicit file and
//! `CREDENCE__`-prefixed environment variables. Every field carries a serde
//! default so an empty source yields a working configuration.

pub mod auth_server;
pub mod lifecycle;
pub mod logging;
pub mod refresh;
pub mod storage;

use serde::{Deserialize, Serialize};

use self::auth_server::AuthServerConfig;
use self::lifecycle::LifecycleConfig;
use self::logging::LoggingConfig;
use self::refresh::RefreshConfig;
use self::storage::StorageConfig;

use crate::error::AppError;

/// Root engine configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Storage backend settings.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Refresh policy settings.
    #[serde(default)]
    pub refresh: RefreshConfig,
    /// Foreground/periodic revalidation settings.
    #[serde(default)]
    pub lifecycle: LifecycleConfig,
    /// Remote refresh endpoint settings.
    #[serde(default)]
    pub auth_server: AuthServerConfig,
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration.
    ///
    /// Merges `config/default.toml` (if present), the explicit `path` (if
    /// given, required to exist) and environment variables prefixed with
    /// `CREDENCE__`.
    pub fn load(path: Option<&str>) -> Result<Self, AppError> {
        let mut builder = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false));

        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(true));
        }

        let config = builder
            .add_source(
                config::Environment::with_prefix("CREDENCE")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| AppError::configuration(format!("Failed to build config: {e}")))?;

        config
            .try_deserialize()
            .map_err(|e| AppError::configuration(format!("Failed to deserialize config: {e}")))
    }
}
