//! Human-readable duration formatting for user-facing messages.

use chrono::Duration;

/// Formats a duration the way session messages phrase it.
///
/// Examples: "45 seconds", "12 minutes", "2 hours", "1 hours and 30 minutes".
/// The unit word is always plural, "1 hours" included; these exact strings
/// are user-facing and pinned by tests, so changing the grammar changes
/// the message wording.
/// Durations under two minutes are given in seconds so short sessions don't
/// round down to "0 minutes".
pub fn pretty_duration(duration: Duration) -> String {
    let ms = duration.num_milliseconds().max(0);
    let hours = ms / 3_600_000;
    let minutes = (ms % 3_600_000) / 60_000;

    if hours > 0 && minutes > 5 {
        format!("{hours} hours and {minutes} minutes")
    } else if hours > 0 {
        format!("{hours} hours")
    } else if minutes < 2 {
        let seconds = (ms as f64 / 1000.0).round() as i64;
        format!("{seconds} seconds")
    } else {
        format!("{minutes} minutes")
    }
}

/// Compact form for logs and list views: "35s", "12m", "2h".
pub fn compact_duration(duration: Duration) -> String {
    let secs = duration.num_seconds().max(0);
    if secs < 60 {
        format!("{secs}s")
    } else if secs < 3600 {
        format!("{}m", secs / 60)
    } else {
        format!("{}h", secs / 3600)
    }
}
