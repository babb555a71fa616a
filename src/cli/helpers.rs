//! Shared helper functions for CLI commands.

use std::time::Duration;

/// Truncate a string to `max_chars` characters, marking the cut with "...".
pub fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    let kept: String = s.chars().take(max_chars.saturating_sub(3)).collect();
    format!("{}...", kept)
}

/// Human-readable delay, e.g. "2.000s" or "none".
pub fn format_delay(delay: Duration) -> String {
    if delay.is_zero() {
        "none".to_string()
    } else {
        format!("{:.3}s", delay.as_secs_f64())
    }
}

/// Human-readable byte size.
pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;

    if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}
