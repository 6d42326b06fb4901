//! Formatting helpers for front ends.

use chrono::{DateTime, Duration, Utc};

/// Format a timestamp relative to `now` (e.g., "2m ago").
pub fn format_relative_time(ts: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let duration = now.signed_duration_since(ts);

    if duration.num_seconds() < 0 {
        "just now".to_string()
    } else if duration.num_seconds() < 60 {
        format!("{}s ago", duration.num_seconds())
    } else if duration.num_minutes() < 60 {
        format!("{}m ago", duration.num_minutes())
    } else if duration.num_hours() < 24 {
        format!("{}h ago", duration.num_hours())
    } else if duration.num_days() < 7 {
        format!("{}d ago", duration.num_days())
    } else {
        ts.format("%b %d").to_string()
    }
}

/// Same as [`format_relative_time`], or "-" if missing.
pub fn format_relative_time_opt(ts: Option<DateTime<Utc>>, now: DateTime<Utc>) -> String {
    match ts {
        Some(ts) => format_relative_time(ts, now),
        None => "-".to_string(),
    }
}

/// Compact elapsed time: "45s", "12m 05s", "2h 03m".
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.num_seconds().max(0);
    let (h, m, s) = (secs / 3600, (secs % 3600) / 60, secs % 60);

    if h > 0 {
        format!("{}h {:02}m", h, m)
    } else if m > 0 {
        format!("{}m {:02}s", m, s)
    } else {
        format!("{}s", s)
    }
}

/// Shorten text to `max` characters, appending "..." when cut.
pub fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let kept: String = text.chars().take(max.saturating_sub(3)).collect();
    format!("{}...", kept)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_relative_time() {
        let now = Utc.with_ymd_and_hms(2025, 3, 20, 12, 0, 0).unwrap();
        assert_eq!(format_relative_time(now + Duration::seconds(5), now), "just now");
        assert_eq!(format_relative_time(now - Duration::seconds(42), now), "42s ago");
        assert_eq!(format_relative_time(now - Duration::minutes(3), now), "3m ago");
        assert_eq!(format_relative_time(now - Duration::hours(5), now), "5h ago");
        assert_eq!(format_relative_time(now - Duration::days(2), now), "2d ago");
        assert_eq!(format_relative_time(now - Duration::days(30), now), "Feb 18");
        assert_eq!(format_relative_time_opt(None, now), "-");
    }

    #[test]
    fn test_duration() {
        assert_eq!(format_duration(Duration::seconds(45)), "45s");
        assert_eq!(format_duration(Duration::seconds(725)), "12m 05s");
        assert_eq!(format_duration(Duration::seconds(7380)), "2h 03m");
        assert_eq!(format_duration(Duration::seconds(-3)), "0s");
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("a much longer line", 10), "a much ...");
    }
}
