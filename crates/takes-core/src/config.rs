//! Runtime configuration for session timing and the scanner.

use chrono::Duration;
use std::env;

/// Timing thresholds and limits for take sessions.
///
/// Defaults match the production deployment; individual values can be
/// overridden through `TAKESD_*` environment variables (minutes unless
/// noted). Tests construct the struct directly with short durations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TakesConfig {
    /// Default committed session length when the user gives none.
    pub session_length: Duration,

    /// Hard cap applied to elapsed-time math, guarding against a stuck
    /// open period accumulating runaway time.
    pub session_cap: Duration,

    /// Maximum time a take may sit paused before forced completion.
    pub max_pause: Duration,

    /// Remaining-time threshold for the one-shot low-time warning.
    pub low_time_warning: Duration,

    /// How long before pause expiry the one-shot warning fires.
    pub pause_expiration_warning: Duration,

    /// Scanner sweep interval.
    pub check_interval: std::time::Duration,

    /// How often the reconciliation job re-runs after startup.
    pub reconcile_interval: std::time::Duration,

    /// Maximum past takes shown by `history`.
    pub max_history_items: usize,

    /// Upload lease lifetime; an expired lease is treated as free.
    pub upload_lease_ttl: Duration,
}

impl Default for TakesConfig {
    fn default() -> Self {
        let session_length = Duration::minutes(90);
        Self {
            session_length,
            session_cap: session_length,
            max_pause: Duration::minutes(45),
            low_time_warning: Duration::minutes(10),
            pause_expiration_warning: Duration::minutes(5),
            check_interval: std::time::Duration::from_secs(5),
            reconcile_interval: std::time::Duration::from_secs(6 * 60 * 60),
            max_history_items: 5,
            upload_lease_ttl: Duration::minutes(10),
        }
    }
}

impl TakesConfig {
    /// Builds a config from the environment, falling back to defaults for
    /// unset or unparsable variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let session_length =
            env_minutes("TAKESD_SESSION_MINUTES").unwrap_or(defaults.session_length);

        Self {
            session_length,
            session_cap: env_minutes("TAKESD_SESSION_CAP_MINUTES").unwrap_or(session_length),
            max_pause: env_minutes("TAKESD_MAX_PAUSE_MINUTES").unwrap_or(defaults.max_pause),
            low_time_warning: env_minutes("TAKESD_LOW_TIME_WARNING_MINUTES")
                .unwrap_or(defaults.low_time_warning),
            pause_expiration_warning: env_minutes("TAKESD_PAUSE_WARNING_MINUTES")
                .unwrap_or(defaults.pause_expiration_warning),
            check_interval: env_secs("TAKESD_CHECK_INTERVAL_SECS")
                .unwrap_or(defaults.check_interval),
            reconcile_interval: env_secs("TAKESD_RECONCILE_INTERVAL_SECS")
                .unwrap_or(defaults.reconcile_interval),
            max_history_items: env::var("TAKESD_MAX_HISTORY_ITEMS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_history_items),
            upload_lease_ttl: env_minutes("TAKESD_UPLOAD_LEASE_MINUTES")
                .unwrap_or(defaults.upload_lease_ttl),
        }
    }
}

fn env_minutes(key: &str) -> Option<Duration> {
    let minutes: i64 = env::var(key).ok()?.parse().ok()?;
    (minutes > 0).then(|| Duration::minutes(minutes))
}

fn env_secs(key: &str) -> Option<std::time::Duration> {
    let secs: u64 = env::var(key).ok()?.parse().ok()?;
    (secs > 0).then(|| std::time::Duration::from_secs(secs))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TakesConfig::default();
        assert_eq!(config.session_length, Duration::minutes(90));
        assert_eq!(config.session_cap, config.session_length);
        assert_eq!(config.max_pause, Duration::minutes(45));
        assert_eq!(config.max_history_items, 5);
    }

    #[test]
    fn test_env_minutes_rejects_garbage() {
        // Unset and non-numeric keys fall back to None.
        assert!(env_minutes("TAKESD_TEST_UNSET_KEY").is_none());
        std::env::set_var("TAKESD_TEST_BAD_KEY", "not-a-number");
        assert!(env_minutes("TAKESD_TEST_BAD_KEY").is_none());
        std::env::remove_var("TAKESD_TEST_BAD_KEY");
    }
}
