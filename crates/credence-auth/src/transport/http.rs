//! HTTP client for the auth server's refresh endpoint.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use reqwest::cookie::Jar;
use serde::{Deserialize, Serialize};
use tracing::debug;

use credence_core::config::auth_server::AuthServerConfig;
use credence_core::error::{AppError, ErrorKind};
use credence_core::result::AppResult;
use credence_core::traits::{RefreshResponse, RefreshTransport, TransportError};
use credence_core::types::RefreshToken;

/// Request body sent to the refresh endpoint.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RefreshRequest<'a> {
    refresh_token: &'a str,
}

/// Timestamp as sent by the server: unix seconds or RFC 3339.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WireTimestamp {
    Seconds(i64),
    FractionalSeconds(f64),
    Text(String),
}

impl WireTimestamp {
    fn into_datetime(self, field: &str) -> Result<DateTime<Utc>, TransportError> {
        let parsed = match &self {
            Self::Seconds(secs) => DateTime::from_timestamp(*secs, 0),
            Self::FractionalSeconds(secs) => DateTime::from_timestamp(secs.floor() as i64, 0),
            Self::Text(text) => DateTime::parse_from_rfc3339(text)
                .ok()
                .map(|t| t.with_timezone(&Utc)),
        };
        parsed.ok_or_else(|| TransportError::Malformed(format!("invalid {field}: {self:?}")))
    }
}

/// Response body of the refresh endpoint.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireResponse {
    access_token: Option<String>,
    refresh_token: Option<String>,
    expires_at: Option<WireTimestamp>,
    refresh_expires_at: Option<WireTimestamp>,
}

impl WireResponse {
    fn into_response(self) -> Result<RefreshResponse, TransportError> {
        Ok(RefreshResponse {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_at: self
                .expires_at
                .map(|t| t.into_datetime("expiresAt"))
                .transpose()?,
            refresh_expires_at: self
                .refresh_expires_at
                .map(|t| t.into_datetime("refreshExpiresAt"))
                .transpose()?,
        })
    }
}

/// POSTs `{"refreshToken": ...}` as JSON to the configured URL.
#[derive(Debug, Clone)]
pub struct HttpRefreshTransport {
    client: Client,
    url: String,
}

impl HttpRefreshTransport {
    /// Creates a transport sending requests with the cookies in `jar`.
    pub fn new(config: &AuthServerConfig, jar: Arc<Jar>) -> AppResult<Self> {
        let client = Client::builder()
            .cookie_provider(jar)
            .timeout(config.timeout())
            .build()
            .map_err(|e| {
                AppError::with_source(
                    ErrorKind::Configuration,
                    "Failed to build refresh HTTP client",
                    e,
                )
            })?;
        Ok(Self {
            client,
            url: config.refresh_url.clone(),
        })
    }
}

#[async_trait]
impl RefreshTransport for HttpRefreshTransport {
    async fn refresh(&self, refresh_token: &RefreshToken) -> Result<RefreshResponse, TransportError> {
        let response = self
            .client
            .post(&self.url)
            .json(&RefreshRequest {
                refresh_token: refresh_token.as_str(),
            })
            .send()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;

        let status = response.status();
        debug!(status = status.as_u16(), url = %self.url, "Refresh endpoint responded");
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;
        let wire: WireResponse = serde_json::from_slice(&bytes)
            .map_err(|e| TransportError::Malformed(e.to_string()))?;
        wire.into_response()
    }
}
