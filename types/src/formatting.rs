//! Centralized display formatting utilities.
//!
//! All numeric display formatting goes through this module so the CLI and
//! any future overlay render timers and rates the same way.

/// Format a duration in seconds as `m:ss`, or `XhYYm` once it exceeds an hour.
///
/// # Examples
/// ```
/// use everlog_types::formatting::format_duration;
/// assert_eq!(format_duration(0.0), "0:00");
/// assert_eq!(format_duration(75.0), "1:15");
/// assert_eq!(format_duration(3900.0), "1h05m");
/// ```
pub fn format_duration(seconds: f64) -> String {
    if seconds <= 0.0 {
        return "0:00".to_string();
    }
    let total = seconds as u64;
    if total >= 3600 {
        let h = total / 3600;
        let m = (total % 3600) / 60;
        format!("{h}h{m:02}m")
    } else {
        let m = total / 60;
        let s = total % 60;
        format!("{m}:{s:02}")
    }
}

/// Format a damage total with K/M suffix for compact display.
///
/// # Examples
/// ```
/// use everlog_types::formatting::format_compact;
/// assert_eq!(format_compact(500), "500");
/// assert_eq!(format_compact(1_500), "1.50K");
/// assert_eq!(format_compact(2_250_000), "2.25M");
/// ```
pub fn format_compact(n: i64) -> String {
    if n >= 1_000_000 {
        format!("{:.2}M", n as f64 / 1_000_000.0)
    } else if n >= 1_000 {
        format!("{:.2}K", n as f64 / 1_000.0)
    } else {
        format!("{n}")
    }
}

/// Format a per-second rate with one decimal place.
pub fn format_rate(rate: f64) -> String {
    format!("{rate:.1}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn durations_under_an_hour_use_minutes() {
        assert_eq!(format_duration(59.9), "0:59");
        assert_eq!(format_duration(600.0), "10:00");
    }

    #[test]
    fn negative_duration_clamps_to_zero() {
        assert_eq!(format_duration(-5.0), "0:00");
    }

    #[test]
    fn compact_boundaries() {
        assert_eq!(format_compact(999), "999");
        assert_eq!(format_compact(1_000), "1.00K");
        assert_eq!(format_compact(1_000_000), "1.00M");
    }
}
