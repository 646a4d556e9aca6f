//! Cookie-jar credential store.
//!
//! Values live as cookies scoped to the auth server origin, in the same
//! [`Jar`] the HTTP refresh transport sends requests with.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Url;
use reqwest::cookie::{CookieStore, Jar};
use tracing::debug;

use credence_core::config::storage::CookieStorageConfig;
use credence_core::traits::{BackendError, StorageBackend};
use credence_core::types::{BackendKind, CredentialKey};

/// Cookie-backed store.
#[derive(Debug, Clone)]
pub struct CookieBackend {
    /// Shared cookie jar.
    jar: Arc<Jar>,
    /// Origin the cookies are scoped to; `None` if the configured origin is invalid.
    origin: Option<Url>,
    /// Cookie lifetime in seconds.
    max_age_seconds: u64,
    /// Prefix applied to every cookie name.
    key_prefix: String,
}

impl CookieBackend {
    /// Create a cookie store writing into `jar`.
    pub fn new(config: &CookieStorageConfig, jar: Arc<Jar>) -> Self {
        let origin = Url::parse(&config.origin).ok();
        Self {
            jar,
            origin,
            max_age_seconds: config.max_age_seconds,
            key_prefix: config.key_prefix.clone(),
        }
    }

    /// The jar cookies are written to.
    pub fn jar(&self) -> Arc<Jar> {
        Arc::clone(&self.jar)
    }

    fn origin(&self) -> Result<&Url, BackendError> {
        self.origin
            .as_ref()
            .ok_or_else(|| BackendError::Unsupported("invalid cookie origin".to_string()))
    }

    fn cookie_name(&self, key: CredentialKey) -> String {
        format!("{}{}", self.key_prefix, key.as_str())
    }
}

/// Find `name` in a `Cookie` header value of the form `a=b; c=d`.
fn find_cookie<'a>(header: &'a str, name: &str) -> Option<&'a str> {
    header.split(';').find_map(|part| {
        let (k, v) = part.trim().split_once('=')?;
        (k == name).then_some(v)
    })
}

#[async_trait]
impl StorageBackend for CookieBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Cookie
    }

    async fn probe(&self) -> Result<(), BackendError> {
        let origin = self.origin()?;
        if origin.cannot_be_a_base() || origin.host_str().is_none() {
            return Err(BackendError::Unsupported(format!(
                "cookie origin {origin} has no host"
            )));
        }
        Ok(())
    }

    async fn get(&self, key: CredentialKey) -> Result<Option<String>, BackendError> {
        let origin = self.origin()?;
        let Some(header) = self.jar.cookies(origin) else {
            return Ok(None);
        };
        let header = header
            .to_str()
            .map_err(|e| BackendError::Corrupted(e.to_string()))?;

        match find_cookie(header, &self.cookie_name(key)) {
            Some(raw) if !raw.is_empty() => urlencoding::decode(raw)
                .map(|v| Some(v.into_owned()))
                .map_err(|e| BackendError::Corrupted(format!("{key}: {e}"))),
            _ => Ok(None),
        }
    }

    async fn set(&self, key: CredentialKey, value: &str) -> Result<(), BackendError> {
        let origin = self.origin()?;
        let cookie = format!(
            "{}={}; Path=/; Max-Age={}; SameSite=Strict",
            self.cookie_name(key),
            urlencoding::encode(value),
            self.max_age_seconds
        );
        self.jar.add_cookie_str(&cookie, origin);
        debug!(key = %key, "Stored credential cookie");
        Ok(())
    }

    async fn delete(&self, key: CredentialKey) -> Result<(), BackendError> {
        let origin = self.origin()?;
        let cookie = format!(
            "{}=; Path=/; Max-Age=0; Expires=Thu, 01 Jan 1970 00:00:00 GMT",
            self.cookie_name(key)
        );
        self.jar.add_cookie_str(&cookie, origin);
        Ok(())
    }
}
