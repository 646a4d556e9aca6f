//! Refresh policy configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Attempt limits and timing for access-token refresh.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshConfig {
    /// Consecutive failed attempts before the session is expired.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Minimum seconds between two network refresh attempts.
    #[serde(default = "default_min_interval")]
    pub min_interval_seconds: u64,
    /// Seconds before access-token expiry at which the proactive refresh fires.
    #[serde(default = "default_lead")]
    pub lead_seconds: u64,
    /// Clock skew tolerated when checking expiry.
    #[serde(default)]
    pub expiry_skew_seconds: i64,
    /// Refresh-token lifetime assumed when the server does not report one.
    #[serde(default = "default_refresh_ttl")]
    pub refresh_ttl_hours: i64,
}

impl RefreshConfig {
    /// Minimum interval between attempts as a [`Duration`].
    pub fn min_interval(&self) -> Duration {
        Duration::from_secs(self.min_interval_seconds)
    }

    /// Proactive refresh lead as a [`Duration`].
    pub fn lead(&self) -> Duration {
        Duration::from_secs(self.lead_seconds)
    }

    /// Assumed refresh-token lifetime.
    pub fn refresh_ttl(&self) -> chrono::Duration {
        chrono::Duration::hours(self.refresh_ttl_hours)
    }
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            min_interval_seconds: default_min_interval(),
            lead_seconds: default_lead(),
            expiry_skew_seconds: 0,
            refresh_ttl_hours: default_refresh_ttl(),
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}

fn default_min_interval() -> u64 {
    5
}

fn default_lead() -> u64 {
    120
}

fn default_refresh_ttl() -> i64 {
    24
}
