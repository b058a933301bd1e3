use super::*;
use crate::config::FrequencyConfig;

fn tracker(window_seconds: u64, threshold: usize) -> FrequencyTracker {
    FrequencyTracker::new(FrequencyConfig {
        window_seconds,
        threshold,
        ..FrequencyConfig::default()
    })
}

/// Shift every record's age by `secs` so eviction behavior can be tested
/// without real sleeps.
fn age_records(t: &FrequencyTracker, secs: u64) {
    let mut records = t.records.lock().unwrap();
    for r in records.iter_mut() {
        r.recorded_at -= Duration::from_secs(secs);
    }
}

#[test]
fn test_two_calls_within_window_trigger() {
    let t = tracker(30, 1);
    t.record("pane:0", "send", "continue working");
    age_records(&t, 5);
    t.record("pane:0", "send", "continue working");
    assert!(t.should_trigger());
}

#[test]
fn test_two_calls_outside_window_do_not_trigger() {
    let t = tracker(30, 1);
    t.record("pane:0", "send", "continue working");
    age_records(&t, 40);
    t.record("pane:0", "send", "continue working");
    assert!(!t.should_trigger(), "first call should have been evicted");
}

#[test]
fn test_bypass_never_counts() {
    let t = tracker(300, 1);
    // Any volume of bypass calls contributes nothing
    for _ in 0..10 {
        t.record("pane:0", "send", "hi");
    }
    assert!(!t.should_trigger());

    // Mixed sequence: only the non-bypass calls count
    t.record("pane:0", "send", "do the thing");
    assert!(!t.should_trigger(), "1 counted call is not > threshold 1");
    t.record("pane:0", "send", "do the thing again");
    assert!(t.should_trigger());

    let stats = t.stats();
    assert_eq!(stats.counted_calls, 2);
    assert_eq!(stats.bypass_calls, 10);
}

#[test]
fn test_bypass_match_is_case_insensitive_and_trimmed() {
    let t = tracker(300, 0);
    t.record("pane:0", "send", "  HI  ");
    t.record("pane:0", "send", "Hi");
    assert!(!t.should_trigger());
}

#[test]
fn test_reset_clears_window() {
    let t = tracker(300, 1);
    t.record("pane:0", "send", "a");
    t.record("pane:0", "send", "b");
    assert!(t.should_trigger());

    t.reset();
    assert!(!t.should_trigger());
    assert_eq!(t.stats().counted_calls, 0);
}

#[test]
fn test_threshold_is_exclusive() {
    let t = tracker(300, 3);
    for i in 0..3 {
        t.record("pane:0", "send", &format!("msg {}", i));
    }
    assert!(!t.should_trigger(), "count == threshold must not trigger");
    t.record("pane:0", "send", "msg 3");
    assert!(t.should_trigger());
}

#[test]
fn test_record_returns_unique_ids() {
    let t = tracker(300, 5);
    let a = t.record("pane:0", "send", "x");
    let b = t.record("pane:1", "send", "x");
    assert_ne!(a, b);
}

#[test]
fn test_stats_reports_trigger_state() {
    let t = tracker(30, 1);
    t.record("pane:0", "send", "a");
    t.record("pane:0", "send", "b");
    let stats = t.stats();
    assert!(stats.triggered);
    assert_eq!(stats.window_seconds, 30);
    assert_eq!(stats.threshold, 1);
}
