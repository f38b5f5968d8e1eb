//! Sweep runtime configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// The sweep thread would spin without sleeping
    #[error("sweep poll interval must be greater than zero")]
    ZeroPollInterval,
}

/// Settings for the shared background sweep thread
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepConfig {
    /// How often the sweep thread wakes to check the collection epoch
    pub poll_interval_ms: u64,
    /// Run the background thread at all; when false, hosts reclaim with
    /// [`collect_now`](crate::epoch::collect_now)
    pub background: bool,
}

impl SweepConfig {
    /// Wake interval as a duration
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Reject settings the sweep thread cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::ZeroPollInterval);
        }
        Ok(())
    }
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1000,
            background: true,
        }
    }
}
