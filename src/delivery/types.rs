use crate::config::DeliveryConfig;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MessagePriority {
    Low,
    #[default]
    Normal,
    High,
    Urgent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Pending,
    Queued,
    Sending,
    Sent,
    Failed,
    Cancelled,
}

impl DeliveryStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DeliveryStatus::Sent | DeliveryStatus::Failed | DeliveryStatus::Cancelled
        )
    }
}

/// An outbound message awaiting delivery. The id is stable across retries —
/// a failed attempt re-queues the same request with a bumped `attempts`
/// counter, so callers keep one identity per logical message end-to-end.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageRequest {
    pub id: String,
    pub content: String,
    pub target: String,
    #[serde(default)]
    pub priority: MessagePriority,
    #[serde(rename = "notBefore")]
    pub not_before: DateTime<Utc>,
    #[serde(rename = "maxAttempts")]
    pub max_attempts: u32,
    #[serde(rename = "timeoutSeconds")]
    pub timeout_seconds: u64,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
}

impl MessageRequest {
    pub fn new(content: String, target: String) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            content,
            target,
            priority: MessagePriority::Normal,
            not_before: Utc::now(),
            max_attempts: 3,
            timeout_seconds: 30,
            created_at: Utc::now(),
        }
    }

    /// Like [`new`](Self::new), with attempt and timeout limits taken from
    /// the queue configuration instead of the built-in fallbacks.
    pub fn with_defaults(content: String, target: String, config: &DeliveryConfig) -> Self {
        Self {
            max_attempts: config.default_max_attempts,
            timeout_seconds: config.send_timeout_seconds,
            ..Self::new(content, target)
        }
    }

    pub fn with_priority(mut self, priority: MessagePriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_not_before(mut self, not_before: DateTime<Utc>) -> Self {
        self.not_before = not_before;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }
}

/// Delivery outcome, tracked per request id. Every enqueued request reaches
/// exactly one terminal status — never silently lost.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResult {
    #[serde(rename = "requestId")]
    pub request_id: String,
    pub status: DeliveryStatus,
    #[serde(rename = "sentAt")]
    pub sent_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub attempts: u32,
    pub error: Option<String>,
    #[serde(rename = "latencyMs")]
    pub latency_ms: Option<u64>,
    /// When a terminal status was reached. Drives dead-letter retention.
    #[serde(rename = "finishedAt")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl MessageResult {
    pub fn queued(request_id: &str) -> Self {
        Self {
            request_id: request_id.to_string(),
            status: DeliveryStatus::Queued,
            sent_at: None,
            attempts: 0,
            error: None,
            latency_ms: None,
            finished_at: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct QueueStats {
    pub queued: usize,
    #[serde(rename = "inFlight")]
    pub in_flight: usize,
    pub sent: usize,
    pub failed: usize,
    pub cancelled: usize,
}
