//! Detection of usage-limit banners in raw terminal output.
//!
//! The target process prints a human-readable banner when it hits a quota
//! ("5-hour limit reached ∙ resets 2:30 PM"). `LimitDetector` turns that
//! unstructured text into a limit kind plus an absolute reset time.

pub mod timeparse;

use chrono::{Local, NaiveDateTime};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LimitKind {
    FiveHour,
    Daily,
    RateLimit,
    Unknown,
}

impl LimitKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LimitKind::FiveHour => "five_hour",
            LimitKind::Daily => "daily",
            LimitKind::RateLimit => "rate_limit",
            LimitKind::Unknown => "unknown",
        }
    }
}

/// Outcome of one `detect` call. Immutable; a fresh value per call.
///
/// `detected=true, parsed_ok=false` means the banner matched but the reset
/// time could not be resolved — callers must treat this as "limit confirmed,
/// reset unknown", never as "no limit".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitDetectionResult {
    pub detected: bool,
    pub kind: LimitKind,
    #[serde(rename = "rawText")]
    pub raw_text: String,
    #[serde(rename = "resetTimeText")]
    pub reset_time_text: Option<String>,
    #[serde(rename = "resetTime")]
    pub reset_time: Option<NaiveDateTime>,
    #[serde(rename = "parsedOk")]
    pub parsed_ok: bool,
    #[serde(rename = "hoursUntilReset")]
    pub hours_until_reset: Option<f64>,
}

impl LimitDetectionResult {
    fn none(raw_text: &str) -> Self {
        Self {
            detected: false,
            kind: LimitKind::Unknown,
            raw_text: raw_text.to_string(),
            reset_time_text: None,
            reset_time: None,
            parsed_ok: false,
            hours_until_reset: None,
        }
    }
}

// Banner families in priority order. Case-insensitive and tolerant of the
// glyph separating the limit phrase from the reset phrase (∙, ·, -, |, ...).
static HOURLY_LIMIT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b\d+\s*[-– ]?\s*hour\s+(?:usage\s+)?limit\s+(?:reached|hit|exceeded)")
        .expect("Failed to compile hourly limit regex")
});

static DAILY_LIMIT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bdaily\s+(?:usage\s+)?limit\b").expect("Failed to compile daily limit regex")
});

static GENERIC_LIMIT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\brate\s*[-_ ]?\s*limit(?:ed)?\b|\busage\s+limit\b|\btoo\s+many\s+requests\b|\bquota\s+exceeded\b")
        .expect("Failed to compile generic limit regex")
});

// Trailing "resets <expression>" clause, shared by all families.
static RESETS_AT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bresets?\s+(?:at\s+|in\s+)?([^\n]+)")
        .expect("Failed to compile reset clause regex")
});

/// Strip separator glyphs and trailing punctuation from a captured reset
/// expression, keeping only the leading time-bearing fragment.
fn clean_reset_text(raw: &str) -> String {
    let cut = raw
        .find(['∙', '·', '•', '|'])
        .unwrap_or(raw.len());
    raw[..cut]
        .trim()
        .trim_end_matches(['.', ',', ';', '!', ')'])
        .trim()
        .to_string()
}

#[derive(Debug, Default)]
pub struct LimitDetector;

impl LimitDetector {
    pub fn new() -> Self {
        Self
    }

    /// Scan raw terminal text for a usage-limit banner, resolving any reset
    /// expression against the local wall clock.
    pub fn detect(&self, text: &str) -> LimitDetectionResult {
        self.detect_at(text, Local::now().naive_local())
    }

    /// Same as [`detect`](Self::detect) with an injectable `now`.
    pub fn detect_at(&self, text: &str, now: NaiveDateTime) -> LimitDetectionResult {
        let kind = if HOURLY_LIMIT.is_match(text) {
            LimitKind::FiveHour
        } else if DAILY_LIMIT.is_match(text) {
            LimitKind::Daily
        } else if GENERIC_LIMIT.is_match(text) {
            LimitKind::RateLimit
        } else {
            return LimitDetectionResult::none(text);
        };

        let reset_time_text = RESETS_AT
            .captures(text)
            .and_then(|c| c.get(1))
            .map(|m| clean_reset_text(m.as_str()))
            .filter(|t| !t.is_empty());

        let reset_time = reset_time_text
            .as_deref()
            .and_then(|expr| timeparse::resolve_reset_time(expr, now));

        let parsed_ok = reset_time.is_some();
        if !parsed_ok {
            debug!(
                "Limit banner matched ({}) but reset time unresolved: {:?}",
                kind.as_str(),
                reset_time_text
            );
        }

        let hours_until_reset = reset_time.map(|reset| {
            let secs = (reset - now).num_seconds();
            secs as f64 / 3600.0
        });

        LimitDetectionResult {
            detected: true,
            kind,
            raw_text: text.to_string(),
            reset_time_text,
            reset_time,
            parsed_ok,
            hours_until_reset,
        }
    }
}

#[cfg(test)]
mod tests;
