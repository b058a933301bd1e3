//! Sliding-window call counter for retry-storm detection.
//!
//! Records every send attempt against a target and trips once the surviving
//! count within the window exceeds the threshold. A configured bypass payload
//! is recorded but never counted, so a manual unblock can never be throttled.
//! Memory is intentionally ephemeral — a restart clears the window.

use crate::config::FrequencyConfig;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::debug;
use uuid::Uuid;

/// One observed call inside the window. Never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateWindowRecord {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub source: String,
    pub kind: String,
    #[serde(rename = "isBypass")]
    pub is_bypass: bool,
    #[serde(skip, default = "Instant::now")]
    recorded_at: Instant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrequencyStats {
    #[serde(rename = "windowSeconds")]
    pub window_seconds: u64,
    pub threshold: usize,
    /// Non-bypass records currently inside the window.
    #[serde(rename = "countedCalls")]
    pub counted_calls: usize,
    #[serde(rename = "bypassCalls")]
    pub bypass_calls: usize,
    pub triggered: bool,
}

pub struct FrequencyTracker {
    config: FrequencyConfig,
    window: Duration,
    records: Mutex<Vec<RateWindowRecord>>,
}

impl FrequencyTracker {
    pub fn new(config: FrequencyConfig) -> Self {
        let window = Duration::from_secs(config.window_seconds);
        Self {
            config,
            window,
            records: Mutex::new(Vec::new()),
        }
    }

    fn is_bypass(&self, payload: &str) -> bool {
        payload
            .trim()
            .eq_ignore_ascii_case(&self.config.bypass_sentinel)
    }

    /// Record one call. Returns the record id.
    pub fn record(&self, source: &str, kind: &str, payload: &str) -> String {
        let is_bypass = self.is_bypass(payload);
        let record = RateWindowRecord {
            id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            source: source.to_string(),
            kind: kind.to_string(),
            is_bypass,
            recorded_at: Instant::now(),
        };
        let id = record.id.clone();

        let mut records = self
            .records
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        Self::evict(&mut records, self.window);
        records.push(record);
        if is_bypass {
            debug!("Recorded bypass call from '{}' (not counted)", source);
        }
        id
    }

    fn evict(records: &mut Vec<RateWindowRecord>, window: Duration) {
        let now = Instant::now();
        records.retain(|r| now.duration_since(r.recorded_at) <= window);
    }

    /// Whether the surviving non-bypass count exceeds the threshold.
    ///
    /// Callers must `reset()` right after a successful synthetic send or the
    /// tracker re-triggers indefinitely.
    pub fn should_trigger(&self) -> bool {
        let mut records = self
            .records
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        Self::evict(&mut records, self.window);
        let counted = records.iter().filter(|r| !r.is_bypass).count();
        counted > self.config.threshold
    }

    /// Drop every record in the window.
    pub fn reset(&self) {
        self.records
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clear();
        debug!("Frequency window cleared");
    }

    pub fn stats(&self) -> FrequencyStats {
        let mut records = self
            .records
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        Self::evict(&mut records, self.window);
        let counted = records.iter().filter(|r| !r.is_bypass).count();
        let bypass = records.len() - counted;
        FrequencyStats {
            window_seconds: self.config.window_seconds,
            threshold: self.config.threshold,
            counted_calls: counted,
            bypass_calls: bypass,
            triggered: counted > self.config.threshold,
        }
    }

    /// The configured synthetic keep-alive payload.
    pub fn keepalive_message(&self) -> &str {
        &self.config.keepalive_message
    }
}

#[cfg(test)]
mod tests;
