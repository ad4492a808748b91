//! Time formatting for session and cache displays.

use std::time::Duration;

use chrono::{DateTime, Utc};

/// Countdown from `now` to `target`, e.g. `in 1h 5m`. Past targets read
/// `expired`.
#[must_use]
pub fn format_countdown_from(target: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let remaining = target.signed_duration_since(now);
    let Ok(remaining) = remaining.to_std() else {
        return "expired".to_string();
    };
    if remaining.is_zero() {
        return "expired".to_string();
    }
    format!("in {}", format_duration(remaining))
}

/// Countdown to `target` from the current time.
#[must_use]
pub fn format_countdown(target: DateTime<Utc>) -> String {
    format_countdown_from(target, Utc::now())
}

/// Compact duration: `2d 3h`, `1h 5m`, `4m 10s`, `12s`, `250ms`.
#[must_use]
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    let (days, hours, minutes, seconds) = (
        secs / 86_400,
        (secs % 86_400) / 3600,
        (secs % 3600) / 60,
        secs % 60,
    );

    if days > 0 {
        format!("{days}d {hours}h")
    } else if hours > 0 {
        format!("{hours}h {minutes}m")
    } else if minutes > 0 {
        format!("{minutes}m {seconds}s")
    } else if seconds > 0 {
        format!("{seconds}s")
    } else {
        format!("{}ms", duration.as_millis())
    }
}
