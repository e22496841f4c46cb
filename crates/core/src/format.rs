//! Human-readable labels for durations, hours and weekdays.

use chrono::Weekday;

/// `0 min`, `45 min`, `2h 5m`.
pub fn format_minutes(mins: i64) -> String {
    let mins = mins.max(0);
    if mins >= 60 {
        format!("{}h {}m", mins / 60, mins % 60)
    } else {
        format!("{} min", mins)
    }
}

/// `42 sec`, `5 min`, `2h`, `2h 5m`.
pub fn format_duration(secs: i64) -> String {
    let secs = secs.max(0);
    if secs < 60 {
        return format!("{} sec", secs);
    }
    let mins = secs / 60;
    if mins < 60 {
        return format!("{} min", mins);
    }
    let (h, m) = (mins / 60, mins % 60);
    if m == 0 {
        format!("{}h", h)
    } else {
        format!("{}h {}m", h, m)
    }
}

/// `09:00`, or `N/A` when there is no data.
pub fn format_hour(hour: Option<u32>) -> String {
    match hour {
        Some(h) => format!("{:02}:00", h),
        None => "N/A".to_string(),
    }
}

/// Full English weekday name, or `N/A`.
pub fn format_weekday(day: Option<Weekday>) -> String {
    let Some(day) = day else {
        return "N/A".to_string();
    };
    match day {
        Weekday::Mon => "Monday",
        Weekday::Tue => "Tuesday",
        Weekday::Wed => "Wednesday",
        Weekday::Thu => "Thursday",
        Weekday::Fri => "Friday",
        Weekday::Sat => "Saturday",
        Weekday::Sun => "Sunday",
    }
    .to_string()
}

/// Integer division that yields 0 for an empty denominator.
pub fn safe_div(numerator: i64, denominator: i64) -> i64 {
    if denominator == 0 {
        0
    } else {
        numerator / denominator
    }
}
