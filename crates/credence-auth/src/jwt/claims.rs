//! Claims carried in the access-token payload.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Decoded access-token payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Claims {
    /// Subject, usually the user ID.
    pub sub: Option<String>,
    /// Single role claim.
    pub role: Option<String>,
    /// Role list, used when `role` is absent.
    pub roles: Vec<String>,
    /// Issued-at timestamp (seconds since epoch).
    pub iat: Option<i64>,
    /// Expiration timestamp (seconds since epoch).
    pub exp: i64,
}

impl Claims {
    /// The effective role: `role`, else the first of `roles`.
    pub fn effective_role(&self) -> Option<&str> {
        self.role
            .as_deref()
            .or_else(|| self.roles.first().map(String::as_str))
    }

    /// Returns the expiration as a `DateTime<Utc>`.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.exp, 0)
    }

    /// Returns the issue time as a `DateTime<Utc>`.
    pub fn issued_at(&self) -> Option<DateTime<Utc>> {
        self.iat.and_then(|iat| DateTime::from_timestamp(iat, 0))
    }

    /// Whether the token is expired at `now`, tolerating `skew_seconds`.
    pub fn is_expired_at(&self, now: DateTime<Utc>, skew_seconds: i64) -> bool {
        self.exp <= now.timestamp() - skew_seconds
    }
}
