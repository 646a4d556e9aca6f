//! Remote refresh endpoint configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Where and how to reach the auth server's refresh endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthServerConfig {
    /// Absolute URL of the refresh endpoint.
    #[serde(default = "default_refresh_url")]
    pub refresh_url: String,
    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
}

impl AuthServerConfig {
    /// Request timeout as a [`Duration`].
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

impl Default for AuthServerConfig {
    fn default() -> Self {
        Self {
            refresh_url: default_refresh_url(),
            timeout_seconds: default_timeout(),
        }
    }
}

fn default_refresh_url() -> String {
    "http://127.0.0.1:8080/api/auth/refresh".to_string()
}

fn default_timeout() -> u64 {
    10
}
