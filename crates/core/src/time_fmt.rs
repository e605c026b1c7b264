// SPDX-License-Identifier: MIT

//! Compact duration formatting for status lines.

/// Format a duration in milliseconds as a compact human string.
///
/// Shows the two most significant units: "2d 3h", "3h 12m", "12m 5s", "45s".
pub fn format_duration_ms(ms: u64) -> String {
    let secs = ms / 1000;
    let days = secs / 86_400;
    let hours = (secs % 86_400) / 3600;
    let mins = (secs % 3600) / 60;
    let s = secs % 60;

    if days > 0 {
        format!("{days}d {hours}h")
    } else if hours > 0 {
        format!("{hours}h {mins}m")
    } else if mins > 0 {
        format!("{mins}m {s}s")
    } else {
        format!("{s}s")
    }
}

/// Format a deadline relative to now: "ready" once due, otherwise "in 3h 12m".
pub fn format_eta_ms(now_ms: u64, at_ms: u64) -> String {
    if at_ms <= now_ms {
        "ready".to_string()
    } else {
        format!("in {}", format_duration_ms(at_ms - now_ms))
    }
}

#[cfg(test)]
#[path = "time_fmt_tests.rs"]
mod tests;
