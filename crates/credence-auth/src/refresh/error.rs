//! Refresh failure taxonomy.

use thiserror::Error;

use credence_core::error::AppError;
use credence_core::traits::TransportError;

/// Why a refresh did not produce a new access token.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RefreshError {
    /// No refresh token is stored. Not retried.
    #[error("no refresh token stored")]
    NoRefreshToken,
    /// The endpoint was unreachable or failed server-side. Retried, bounded.
    #[error("network failure: {0}")]
    NetworkFailure(String),
    /// The endpoint answered with something unusable. Retried, bounded.
    #[error("invalid refresh response: {0}")]
    InvalidResponse(String),
    /// The attempt limit was reached; the session cannot be refreshed.
    #[error("refresh attempts exhausted")]
    Exhausted,
    /// The session changed (logout or new login) while the refresh ran.
    #[error("session changed during refresh")]
    Superseded,
}

impl RefreshError {
    /// Whether the failure counts toward the attempt limit.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::NetworkFailure(_) | Self::InvalidResponse(_))
    }
}

impl From<TransportError> for RefreshError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Network(reason) => Self::NetworkFailure(reason),
            TransportError::Rejected { status, .. } if status >= 500 => {
                Self::NetworkFailure(format!("server error {status}"))
            }
            TransportError::Rejected { status, body } => {
                Self::InvalidResponse(format!("rejected with status {status}: {body}"))
            }
            TransportError::Malformed(reason) => Self::InvalidResponse(reason),
        }
    }
}

impl From<RefreshError> for AppError {
    fn from(err: RefreshError) -> Self {
        match err {
            RefreshError::NetworkFailure(_) | RefreshError::InvalidResponse(_) => {
                AppError::external_service(err.to_string())
            }
            _ => AppError::authentication(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_mapping() {
        assert_eq!(
            RefreshError::from(TransportError::Network("timeout".into())),
            RefreshError::NetworkFailure("timeout".into())
        );
        assert!(matches!(
            RefreshError::from(TransportError::Rejected {
                status: 503,
                body: String::new()
            }),
            RefreshError::NetworkFailure(_)
        ));
        assert!(matches!(
            RefreshError::from(TransportError::Rejected {
                status: 401,
                body: "revoked".into()
            }),
            RefreshError::InvalidResponse(_)
        ));
        assert!(!RefreshError::NoRefreshToken.is_retryable());
        assert!(RefreshError::InvalidResponse("x".into()).is_retryable());
    }
}
