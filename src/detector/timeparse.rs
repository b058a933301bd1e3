//! Resolution of human-readable reset expressions into absolute local times.
//!
//! Tried in order: 12-hour clock, 24-hour clock, date-qualified forms, then
//! relative durations ("in 3 hours", "45 minutes from now"). A wall-clock
//! time that already passed today rolls forward one day.

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime};
use regex::Regex;
use std::sync::LazyLock;

static TIME_12H: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(\d{1,2})(?::(\d{2}))?\s*([ap])\.?m\.?\b")
        .expect("Failed to compile 12-hour time regex")
});

static TIME_24H: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(\d{1,2}):(\d{2})\b").expect("Failed to compile 24-hour time regex")
});

static MONTH_DAY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(jan|feb|mar|apr|may|jun|jul|aug|sep|oct|nov|dec)[a-z]*\.?\s+(\d{1,2})\b")
        .expect("Failed to compile month-day regex")
});

static TOMORROW: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\btomorrow\b").expect("Failed to compile tomorrow regex")
});

static RELATIVE_HOURS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:in\s+)?(\d+)\s*(?:hours?|hrs?|hr|h)\b(?:\s*(?:and\s+)?(\d+)\s*(?:minutes?|mins?|min)\b)?")
        .expect("Failed to compile relative hours regex")
});

static RELATIVE_MINUTES: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:in\s+)?(\d+)\s*(?:minutes?|mins?|min)\b")
        .expect("Failed to compile relative minutes regex")
});

fn parse_12h(expr: &str) -> Option<NaiveTime> {
    let caps = TIME_12H.captures(expr)?;
    let hour: u32 = caps.get(1)?.as_str().parse().ok()?;
    if !(1..=12).contains(&hour) {
        return None;
    }
    let minute: u32 = caps
        .get(2)
        .map_or(Some(0), |m| m.as_str().parse().ok())?;
    if minute > 59 {
        return None;
    }
    let pm = caps.get(3)?.as_str().eq_ignore_ascii_case("p");
    let hour24 = match (hour, pm) {
        (12, false) => 0,
        (12, true) => 12,
        (h, false) => h,
        (h, true) => h + 12,
    };
    NaiveTime::from_hms_opt(hour24, minute, 0)
}

fn parse_24h(expr: &str) -> Option<NaiveTime> {
    // Skip when an am/pm marker is present — the 12-hour rule owns those
    if TIME_12H.is_match(expr) {
        return None;
    }
    let caps = TIME_24H.captures(expr)?;
    let hour: u32 = caps.get(1)?.as_str().parse().ok()?;
    let minute: u32 = caps.get(2)?.as_str().parse().ok()?;
    NaiveTime::from_hms_opt(hour, minute, 0)
}

fn month_number(name: &str) -> Option<u32> {
    let lowered = name.to_ascii_lowercase();
    let idx = [
        "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
    ]
    .iter()
    .position(|m| *m == lowered)?;
    Some(idx as u32 + 1)
}

fn parse_explicit_date(expr: &str, now: NaiveDateTime) -> Option<NaiveDate> {
    let caps = MONTH_DAY.captures(expr)?;
    let month = month_number(caps.get(1)?.as_str())?;
    let day: u32 = caps.get(2)?.as_str().parse().ok()?;
    NaiveDate::from_ymd_opt(now.year(), month, day)
}

fn parse_relative(expr: &str) -> Option<Duration> {
    if let Some(caps) = RELATIVE_HOURS.captures(expr) {
        let hours: i64 = caps.get(1)?.as_str().parse().ok()?;
        let minutes: i64 = caps
            .get(2)
            .map_or(Some(0), |m| m.as_str().parse().ok())?;
        return Some(Duration::hours(hours) + Duration::minutes(minutes));
    }
    if let Some(caps) = RELATIVE_MINUTES.captures(expr) {
        let minutes: i64 = caps.get(1)?.as_str().parse().ok()?;
        return Some(Duration::minutes(minutes));
    }
    None
}

/// Resolve a reset expression to an absolute wall-clock instant.
///
/// Returns `None` when the expression carries no recognizable time — the
/// caller then reports the limit as confirmed with an unknown reset.
pub fn resolve_reset_time(expr: &str, now: NaiveDateTime) -> Option<NaiveDateTime> {
    let time = parse_12h(expr).or_else(|| parse_24h(expr));

    if TOMORROW.is_match(expr) {
        let t = time.unwrap_or_else(|| NaiveTime::from_hms_opt(0, 0, 0).unwrap());
        return Some((now.date() + Duration::days(1)).and_time(t));
    }

    if let Some(date) = parse_explicit_date(expr, now) {
        let t = time.unwrap_or_else(|| NaiveTime::from_hms_opt(0, 0, 0).unwrap());
        let mut candidate = date.and_time(t);
        // A month/day with no year that already passed means next year
        if candidate <= now {
            candidate = NaiveDate::from_ymd_opt(date.year() + 1, date.month(), date.day())?
                .and_time(t);
        }
        return Some(candidate);
    }

    if let Some(t) = time {
        let mut candidate = now.date().and_time(t);
        if candidate <= now {
            candidate += Duration::days(1);
        }
        return Some(candidate);
    }

    parse_relative(expr).map(|delta| now + delta)
}
