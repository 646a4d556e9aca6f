//! Compact-JWS payload decoding without signature verification.
//!
//! The signature is the server's concern; the client only needs the payload
//! to learn expiry and role. Every malformed input decodes to an error, and
//! callers treat an undecodable token as expired.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use serde_json::Value;
use thiserror::Error;

use super::claims::Claims;

/// Why a token could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// The token string is empty.
    #[error("token is empty")]
    Empty,
    /// The token does not have three dot-separated segments.
    #[error("expected 3 segments, found {0}")]
    Segments(usize),
    /// The payload segment is not valid base64url.
    #[error("payload is not base64url: {0}")]
    Base64(String),
    /// The payload is not a JSON object.
    #[error("payload is not a JSON object: {0}")]
    Json(String),
    /// The payload has no `exp` claim.
    #[error("missing exp claim")]
    MissingExpiry,
    /// The `exp` claim is not numeric.
    #[error("exp claim is not numeric")]
    InvalidExpiry,
}

/// Decodes access tokens and answers expiry and role questions about them.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenCodec {
    /// Tolerated clock skew in seconds.
    skew_seconds: i64,
}

impl TokenCodec {
    /// Creates a codec tolerating `skew_seconds` of clock skew.
    pub fn new(skew_seconds: i64) -> Self {
        Self { skew_seconds }
    }

    /// Decodes the payload of a compact JWS.
    pub fn decode(&self, token: &str) -> Result<Claims, DecodeError> {
        if token.is_empty() {
            return Err(DecodeError::Empty);
        }
        let segments: Vec<&str> = token.split('.').collect();
        if segments.len() != 3 {
            return Err(DecodeError::Segments(segments.len()));
        }

        let payload = URL_SAFE_NO_PAD
            .decode(segments[1].trim_end_matches('='))
            .map_err(|e| DecodeError::Base64(e.to_string()))?;
        let value: Value =
            serde_json::from_slice(&payload).map_err(|e| DecodeError::Json(e.to_string()))?;
        let object = value
            .as_object()
            .ok_or_else(|| DecodeError::Json("payload is not an object".to_string()))?;

        let exp = match object.get("exp") {
            None | Some(Value::Null) => return Err(DecodeError::MissingExpiry),
            Some(Value::Number(n)) => n
                .as_i64()
                .or_else(|| n.as_f64().map(|f| f.floor() as i64))
                .ok_or(DecodeError::InvalidExpiry)?,
            Some(_) => return Err(DecodeError::InvalidExpiry),
        };

        Ok(Claims {
            sub: object.get("sub").and_then(Value::as_str).map(str::to_string),
            role: object.get("role").and_then(Value::as_str).map(str::to_string),
            roles: object
                .get("roles")
                .and_then(Value::as_array)
                .map(|roles| {
                    roles
                        .iter()
                        .filter_map(Value::as_str)
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default(),
            iat: object.get("iat").and_then(Value::as_i64),
            exp,
        })
    }

    /// Whether `token` is expired now. Undecodable tokens are expired.
    pub fn is_expired(&self, token: &str) -> bool {
        self.is_expired_at(token, Utc::now())
    }

    /// Whether `token` is expired at `now`. Undecodable tokens are expired.
    pub fn is_expired_at(&self, token: &str, now: DateTime<Utc>) -> bool {
        match self.decode(token) {
            Ok(claims) => claims.is_expired_at(now, self.skew_seconds),
            Err(_) => true,
        }
    }

    /// The token's role, if it decodes and carries one.
    pub fn role_of(&self, token: &str) -> Option<String> {
        self.decode(token)
            .ok()
            .and_then(|claims| claims.effective_role().map(str::to_string))
    }

    /// The token's expiry, if it decodes.
    pub fn expires_at(&self, token: &str) -> Option<DateTime<Utc>> {
        self.decode(token).ok().and_then(|claims| claims.expires_at())
    }
}
