//! Status-bar rendering of rate limits.
//!
//! Output looks like `Codex: 5h:2h30m(5%) | 7d:3d12h(11%)`, or just the
//! 5h part when the agent reports no secondary window.

use chrono::{DateTime, Utc};

use crate::models::{RateLimitWindow, RateLimits};

/// Printed whenever the rate limits could not be fetched.
pub const FALLBACK_OUTPUT: &str = "Codex: 5h:--(-%) | 7d:--(-%)";

/// One window, ready for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResetInfo {
    pub time_remaining: String,
    pub usage: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResetTimes {
    pub five_hour: ResetInfo,
    pub seven_day: Option<ResetInfo>,
}

/// Compact duration such as `2h30m`, `3d12h` or `45m`.
///
/// Shows the two most significant units and drops a zero second unit.
pub fn format_duration(ms: i64) -> String {
    if ms <= 0 {
        return "0m".to_string();
    }

    let minutes = ms / 1000 / 60;
    let hours = minutes / 60;
    let days = hours / 24;

    let remaining_hours = hours % 24;
    let remaining_minutes = minutes % 60;

    if days > 0 {
        if remaining_hours > 0 {
            format!("{days}d{remaining_hours}h")
        } else {
            format!("{days}d")
        }
    } else if hours > 0 {
        if remaining_minutes > 0 {
            format!("{hours}h{remaining_minutes}m")
        } else {
            format!("{hours}h")
        }
    } else {
        format!("{remaining_minutes}m")
    }
}

/// Time left until `resets_at` (Unix seconds), or `reset!` once it passed.
pub fn time_remaining(resets_at: i64, now: DateTime<Utc>) -> String {
    let remaining = resets_at
        .saturating_mul(1000)
        .saturating_sub(now.timestamp_millis());

    if remaining <= 0 {
        return "reset!".to_string();
    }
    format_duration(remaining)
}

/// Whole percent, rounding halves up.
pub fn usage_percentage(used_percent: f64) -> i64 {
    (used_percent + 0.5).floor() as i64
}

fn reset_info(window: &RateLimitWindow, now: DateTime<Utc>) -> ResetInfo {
    ResetInfo {
        time_remaining: time_remaining(window.resets_at, now),
        usage: usage_percentage(window.used_percent),
    }
}

pub fn reset_times(limits: &RateLimits, now: DateTime<Utc>) -> ResetTimes {
    ResetTimes {
        five_hour: reset_info(&limits.primary, now),
        seven_day: limits.secondary.as_ref().map(|w| reset_info(w, now)),
    }
}

pub fn render(times: &ResetTimes) -> String {
    let five_hour = format!(
        "5h:{}({}%)",
        times.five_hour.time_remaining, times.five_hour.usage
    );

    match &times.seven_day {
        Some(seven_day) => format!(
            "Codex: {five_hour} | 7d:{}({}%)",
            seven_day.time_remaining, seven_day.usage
        ),
        None => format!("Codex: {five_hour}"),
    }
}
