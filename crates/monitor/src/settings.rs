//! Host-side tuning for monitor instances.

use std::time::Duration;

use delaywatch_core::monitor::BASE_INTERVAL;

use crate::retry::RetryPolicy;

/// Default number of attempts per collaborator call.
const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default delay before the first retry of a collaborator call.
const DEFAULT_RETRY_INITIAL_MS: u64 = 1000;

/// Settings shared by every monitor a registry starts.
#[derive(Debug, Clone)]
pub struct MonitorSettings {
    /// Wait between cycles when no signal intervenes.
    pub poll_interval: Duration,
    /// Retry policy applied to each collaborator call.
    pub retry: RetryPolicy,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            poll_interval: BASE_INTERVAL,
            retry: RetryPolicy::default(),
        }
    }
}

impl MonitorSettings {
    /// Load settings from environment variables with defaults.
    ///
    /// | Env Var                      | Default |
    /// |------------------------------|---------|
    /// | `MONITOR_POLL_INTERVAL_SECS` | `1800`  |
    /// | `ACTIVITY_MAX_ATTEMPTS`      | `3`     |
    /// | `ACTIVITY_RETRY_INITIAL_MS`  | `1000`  |
    ///
    /// Unparseable values fall back to the default.
    pub fn from_env() -> Self {
        let poll_interval_secs: u64 = std::env::var("MONITOR_POLL_INTERVAL_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .filter(|secs| *secs > 0)
            .unwrap_or(BASE_INTERVAL.as_secs());

        let max_attempts: u32 = std::env::var("ACTIVITY_MAX_ATTEMPTS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_MAX_ATTEMPTS);

        let initial_ms: u64 = std::env::var("ACTIVITY_RETRY_INITIAL_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_RETRY_INITIAL_MS);

        Self {
            poll_interval: Duration::from_secs(poll_interval_secs),
            retry: RetryPolicy {
                max_attempts,
                initial_delay: Duration::from_millis(initial_ms),
                ..RetryPolicy::default()
            },
        }
    }
}
