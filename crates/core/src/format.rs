/// Format a depth percentage the way records carry it, e.g. `"37.5"`.
pub fn format_depth(pct: f64) -> String {
    format!("{:.1}", pct)
}

/// Round to one decimal place, keeping order (a <= b implies round(a) <= round(b)).
pub fn round_tenth(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Format milliseconds as MM:SS
pub fn format_dwell(ms: u64) -> String {
    let total_secs = ms / 1000;
    format!("{:02}:{:02}", total_secs / 60, total_secs % 60)
}

/// Keep at most `max` characters, respecting char boundaries.
pub fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

/// Collapse every whitespace run into a single space, trim, then truncate.
pub fn collapse_whitespace(text: &str, max: usize) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    truncate_chars(&collapsed, max)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn depth_has_one_decimal() {
        assert_eq!(format_depth(0.0), "0.0");
        assert_eq!(format_depth(37.54), "37.5");
        assert_eq!(format_depth(100.0), "100.0");
    }

    #[test]
    fn round_tenth_keeps_one_decimal() {
        assert_eq!(round_tenth(12.345), 12.3);
        assert_eq!(round_tenth(-0.06), -0.1);
    }

    #[test]
    fn dwell_as_minutes_and_seconds() {
        assert_eq!(format_dwell(0), "00:00");
        assert_eq!(format_dwell(61_999), "01:01");
    }

    #[test]
    fn collapse_joins_runs_and_truncates_on_chars() {
        assert_eq!(collapse_whitespace("  hot \n\t topic  ", 50), "hot topic");
        assert_eq!(collapse_whitespace("微博热搜 话题", 3), "微博热");
    }
}
