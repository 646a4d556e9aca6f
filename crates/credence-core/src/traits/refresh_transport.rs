//! Transport trait for the auth server's refresh endpoint.

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::RefreshToken;

/// Failure talking to the refresh endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// Connection, DNS or timeout failure.
    #[error("network failure: {0}")]
    Network(String),
    /// The server answered with a non-success status.
    #[error("refresh rejected with status {status}")]
    Rejected {
        /// HTTP status code.
        status: u16,
        /// Response body, for diagnostics.
        body: String,
    },
    /// The response body could not be decoded.
    #[error("malformed refresh response: {0}")]
    Malformed(String),
}

/// A decoded but not yet validated refresh response.
///
/// Fields are optional because a misbehaving server may omit any of them;
/// validation happens in the refresh coordinator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshResponse {
    /// New access token.
    pub access_token: Option<String>,
    /// New refresh token.
    pub refresh_token: Option<String>,
    /// Access token expiry.
    pub expires_at: Option<DateTime<Utc>>,
    /// Refresh token expiry.
    pub refresh_expires_at: Option<DateTime<Utc>>,
}

/// Exchanges a refresh token for a new token pair.
#[async_trait]
pub trait RefreshTransport: Send + Sync + fmt::Debug + 'static {
    /// Perform one refresh request.
    async fn refresh(&self, refresh_token: &RefreshToken) -> Result<RefreshResponse, TransportError>;
}
