//! Lifecycle watcher configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Foreground-return and periodic revalidation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleConfig {
    /// At most one foreground revalidation per this many seconds.
    #[serde(default = "default_revalidate_window")]
    pub revalidate_window_seconds: u64,
    /// Interval of the periodic validity tick.
    #[serde(default = "default_tick_interval")]
    pub tick_interval_seconds: u64,
    /// Extra wall-clock drift over one tick that counts as a resume.
    #[serde(default = "default_suspend_threshold")]
    pub suspend_threshold_seconds: u64,
}

impl LifecycleConfig {
    /// Revalidation window as a [`Duration`].
    pub fn revalidate_window(&self) -> Duration {
        Duration::from_secs(self.revalidate_window_seconds)
    }

    /// Tick interval as a [`Duration`].
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_seconds.max(1))
    }

    /// Suspend threshold as a [`Duration`].
    pub fn suspend_threshold(&self) -> Duration {
        Duration::from_secs(self.suspend_threshold_seconds)
    }
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            revalidate_window_seconds: default_revalidate_window(),
            tick_interval_seconds: default_tick_interval(),
            suspend_threshold_seconds: default_suspend_threshold(),
        }
    }
}

fn default_revalidate_window() -> u64 {
    60
}

fn default_tick_interval() -> u64 {
    30
}

fn default_suspend_threshold() -> u64 {
    30
}
