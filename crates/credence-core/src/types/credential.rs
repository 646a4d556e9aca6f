//! Credential values and the per-backend credential set.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Logical keys persisted by every storage backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CredentialKey {
    /// The short-lived access token.
    AccessToken,
    /// The long-lived refresh token.
    RefreshToken,
    /// Housekeeping stamp used to order divergent refresh tokens.
    RefreshExpiresAt,
}

impl CredentialKey {
    /// All keys, in the order they are written.
    pub const ALL: [CredentialKey; 3] = [
        CredentialKey::AccessToken,
        CredentialKey::RefreshToken,
        CredentialKey::RefreshExpiresAt,
    ];

    /// The persisted name of the key.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AccessToken => "accessToken",
            Self::RefreshToken => "refreshToken",
            Self::RefreshExpiresAt => "refreshExpiresAt",
        }
    }
}

impl fmt::Display for CredentialKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The physical media credentials are persisted to.
///
/// Declaration order is read priority: the fastest, most recently written
/// medium comes first.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// In-process session store.
    Volatile,
    /// Durable local document store.
    Durable,
    /// Embedded transactional key-value store.
    Embedded,
    /// HTTP cookie jar.
    Cookie,
}

impl BackendKind {
    /// All backend kinds in read-priority order.
    pub const ALL: [BackendKind; 4] = [
        BackendKind::Volatile,
        BackendKind::Durable,
        BackendKind::Embedded,
        BackendKind::Cookie,
    ];

    /// Short lowercase name used in logs and configuration.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Volatile => "volatile",
            Self::Durable => "durable",
            Self::Embedded => "embedded",
            Self::Cookie => "cookie",
        }
    }

    /// Whether this medium belongs to the pair sufficient for same-session
    /// operation (volatile + durable).
    pub fn is_essential(&self) -> bool {
        matches!(self, Self::Volatile | Self::Durable)
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Renders the first characters of a secret for log output.
fn redact(secret: &str) -> String {
    let prefix: String = secret.chars().take(6).collect();
    format!("{prefix}…")
}

/// An opaque signed access token (compact JWS).
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccessToken(String);

impl AccessToken {
    /// Wrap a raw token string.
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Borrow the raw token string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume the wrapper and return the raw token.
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AccessToken({})", redact(&self.0))
    }
}

/// An opaque long-lived refresh credential.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RefreshToken(String);

impl RefreshToken {
    /// Wrap a raw refresh token string.
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Borrow the raw token string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume the wrapper and return the raw token.
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Debug for RefreshToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RefreshToken({})", redact(&self.0))
    }
}

/// The credential tuple as seen in one backend.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredCredentialSet {
    /// Access token, if present.
    pub access_token: Option<AccessToken>,
    /// Refresh token, if present.
    pub refresh_token: Option<RefreshToken>,
    /// When the refresh token expires; doubles as its write stamp.
    pub refresh_expires_at: Option<DateTime<Utc>>,
}

impl StoredCredentialSet {
    /// Build a complete set from a token pair.
    pub fn new(
        access_token: AccessToken,
        refresh_token: RefreshToken,
        refresh_expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            access_token: Some(access_token),
            refresh_token: Some(refresh_token),
            refresh_expires_at: Some(refresh_expires_at),
        }
    }

    /// True when no field is present.
    pub fn is_empty(&self) -> bool {
        self.access_token.is_none()
            && self.refresh_token.is_none()
            && self.refresh_expires_at.is_none()
    }

    /// The persisted string form of one field, if present.
    pub fn value_of(&self, key: CredentialKey) -> Option<String> {
        match key {
            CredentialKey::AccessToken => self.access_token.as_ref().map(|t| t.0.clone()),
            CredentialKey::RefreshToken => self.refresh_token.as_ref().map(|t| t.0.clone()),
            CredentialKey::RefreshExpiresAt => self.refresh_expires_at.map(|t| t.to_rfc3339()),
        }
    }

    /// Apply a raw persisted value to the matching field.
    ///
    /// An unparseable `refreshExpiresAt` is treated as absent.
    pub fn apply(&mut self, key: CredentialKey, raw: String) {
        match key {
            CredentialKey::AccessToken => self.access_token = Some(AccessToken(raw)),
            CredentialKey::RefreshToken => self.refresh_token = Some(RefreshToken(raw)),
            CredentialKey::RefreshExpiresAt => {
                self.refresh_expires_at = DateTime::parse_from_rfc3339(&raw)
                    .ok()
                    .map(|t| t.with_timezone(&Utc));
            }
        }
    }
}

/// A freshly issued token pair, from login or a successful refresh.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenGrant {
    /// New access token.
    pub access_token: AccessToken,
    /// New (rotated) refresh token.
    pub refresh_token: RefreshToken,
    /// Access token expiry as reported by the issuer.
    pub expires_at: Option<DateTime<Utc>>,
    /// Refresh token expiry as reported by the issuer.
    pub refresh_expires_at: Option<DateTime<Utc>>,
}

impl TokenGrant {
    /// Convert into the set written to storage, stamping the refresh expiry
    /// with `fallback_refresh_expiry` when the issuer did not report one.
    pub fn into_credential_set(self, fallback_refresh_expiry: DateTime<Utc>) -> StoredCredentialSet {
        StoredCredentialSet::new(
            self.access_token,
            self.refresh_token,
            self.refresh_expires_at.unwrap_or(fallback_refresh_expiry),
        )
    }
}
