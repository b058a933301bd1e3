use super::*;
use chrono::NaiveDate;

fn at(h: u32, mi: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2025, 6, 10)
        .unwrap()
        .and_hms_opt(h, mi, 0)
        .unwrap()
}

#[test]
fn test_five_hour_banner_with_future_time() {
    let detector = LimitDetector::new();
    let result = detector.detect_at("5-hour limit reached ∙ resets 2:30 PM", at(9, 0));

    assert!(result.detected);
    assert_eq!(result.kind, LimitKind::FiveHour);
    assert!(result.parsed_ok);
    assert_eq!(result.reset_time_text.as_deref(), Some("2:30 PM"));
    assert_eq!(result.reset_time.unwrap(), at(14, 30));
    let hours = result.hours_until_reset.unwrap();
    assert!((hours - 5.5).abs() < 0.01, "expected ~5.5h, got {}", hours);
}

#[test]
fn test_past_time_rolls_to_next_day() {
    let detector = LimitDetector::new();
    // Observed at 14:35, banner says 2:30 PM — reset is tomorrow 14:30
    let result = detector.detect_at("5-hour limit reached ∙ resets 2:30 PM", at(14, 35));

    assert!(result.detected);
    assert!(result.parsed_ok);
    let expected = NaiveDate::from_ymd_opt(2025, 6, 11)
        .unwrap()
        .and_hms_opt(14, 30, 0)
        .unwrap();
    assert_eq!(result.reset_time.unwrap(), expected);
}

#[test]
fn test_daily_banner() {
    let detector = LimitDetector::new();
    let result = detector.detect_at("Daily usage limit exceeded. Resets at 9:00 AM", at(12, 0));

    assert!(result.detected);
    assert_eq!(result.kind, LimitKind::Daily);
    assert!(result.parsed_ok);
    // 9 AM already passed at noon — next day
    let expected = NaiveDate::from_ymd_opt(2025, 6, 11)
        .unwrap()
        .and_hms_opt(9, 0, 0)
        .unwrap();
    assert_eq!(result.reset_time.unwrap(), expected);
}

#[test]
fn test_generic_rate_limit_without_time() {
    let detector = LimitDetector::new();
    let result = detector.detect_at("Error: rate limited, please slow down", at(9, 0));

    assert!(result.detected);
    assert_eq!(result.kind, LimitKind::RateLimit);
    assert!(!result.parsed_ok);
    assert!(result.reset_time.is_none());
    assert!(result.hours_until_reset.is_none());
}

#[test]
fn test_matched_but_unparsable_time() {
    let detector = LimitDetector::new();
    let result = detector.detect_at("5-hour limit reached ∙ resets soon", at(9, 0));

    // Limit confirmed, reset unknown — not "no limit"
    assert!(result.detected);
    assert!(!result.parsed_ok);
    assert_eq!(result.reset_time_text.as_deref(), Some("soon"));
    assert!(result.reset_time.is_none());
}

#[test]
fn test_priority_hourly_over_generic() {
    let detector = LimitDetector::new();
    // Contains both "usage limit" vocabulary and the hourly family —
    // hourly wins
    let result = detector.detect_at("5 hour usage limit reached (rate limit)", at(9, 0));
    assert_eq!(result.kind, LimitKind::FiveHour);
}

#[test]
fn test_case_and_glyph_tolerance() {
    let detector = LimitDetector::new();
    for banner in [
        "5-HOUR LIMIT REACHED · RESETS 3PM",
        "5 hour limit reached | resets 3:00 pm",
        "5-hour limit hit — resets at 3 p.m.",
    ] {
        let result = detector.detect_at(banner, at(9, 0));
        assert!(result.detected, "not detected: {}", banner);
        assert!(result.parsed_ok, "not parsed: {}", banner);
        assert_eq!(result.reset_time.unwrap(), at(15, 0), "banner: {}", banner);
    }
}

#[test]
fn test_relative_reset_clause() {
    let detector = LimitDetector::new();
    let result = detector.detect_at("Usage limit reached, resets in 2 hours", at(9, 0));

    assert!(result.detected);
    assert!(result.parsed_ok);
    assert_eq!(result.reset_time.unwrap(), at(11, 0));
    assert!((result.hours_until_reset.unwrap() - 2.0).abs() < 0.01);
}

#[test]
fn test_plain_output_not_detected() {
    let detector = LimitDetector::new();
    for text in [
        "Compiling paneguard v0.3.0",
        "All tests passed in 2:30",
        "",
        "The speed limit is 55 mph",
    ] {
        let result = detector.detect_at(text, at(9, 0));
        assert!(!result.detected, "false positive on: {}", text);
        assert_eq!(result.kind, LimitKind::Unknown);
    }
}

#[test]
fn test_reset_text_trims_trailing_noise() {
    let detector = LimitDetector::new();
    let result = detector.detect_at("daily limit reached ∙ resets 2:30 PM ∙ upgrade now", at(9, 0));
    assert_eq!(result.reset_time_text.as_deref(), Some("2:30 PM"));
    assert_eq!(result.reset_time.unwrap(), at(14, 30));
}

#[test]
fn test_detect_uses_wall_clock() {
    // Smoke test for the non-injected entry point
    let detector = LimitDetector::new();
    let result = detector.detect("5-hour limit reached ∙ resets in 1 hour");
    assert!(result.detected);
    assert!(result.parsed_ok);
    assert!(result.hours_until_reset.unwrap() > 0.9);
}
