use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Scheduled,
    Executing,
    Done,
    Failed,
    Cancelled,
}

impl TaskStatus {
    /// Terminal statuses admit no further transition.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Done | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RetryStrategy {
    Immediate,
    #[default]
    Scheduled,
    Exponential,
    Fixed,
}

impl RetryStrategy {
    /// Delay before the next attempt, given how many attempts already failed.
    pub fn retry_delay(&self, attempts: u32) -> Duration {
        match self {
            RetryStrategy::Immediate => Duration::seconds(30),
            RetryStrategy::Exponential => {
                let minutes = 2i64.saturating_pow(attempts).min(60);
                Duration::minutes(minutes)
            }
            RetryStrategy::Fixed => Duration::minutes(5),
            RetryStrategy::Scheduled => Duration::minutes(10),
        }
    }
}

/// A unit of "run again at time T under policy P" work. Created by
/// `schedule()`, mutated in place by the scheduler loop, garbage-collected
/// after a configurable age once terminal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryTask {
    pub id: String,
    #[serde(rename = "dueAt")]
    pub due_at: DateTime<Utc>,
    pub payload: String,
    pub target: String,
    pub status: TaskStatus,
    pub strategy: RetryStrategy,
    #[serde(default)]
    pub attempts: u32,
    #[serde(rename = "maxAttempts")]
    pub max_attempts: u32,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "lastAttemptAt")]
    pub last_attempt_at: Option<DateTime<Utc>>,
    #[serde(rename = "nextDueAt")]
    pub next_due_at: Option<DateTime<Utc>>,
    #[serde(rename = "lastError")]
    pub last_error: Option<String>,
}

impl RetryTask {
    /// The instant the task should next fire: the rescheduled time when one
    /// exists, otherwise the original due time.
    pub fn effective_due(&self) -> DateTime<Utc> {
        self.next_due_at.unwrap_or(self.due_at)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RetryStats {
    pub total: usize,
    pub scheduled: usize,
    pub executing: usize,
    pub done: usize,
    pub failed: usize,
    pub cancelled: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_statuses() {
        assert!(TaskStatus::Done.is_terminal());
        assert!(TaskStatus::Failed.is_terminal());
        assert!(TaskStatus::Cancelled.is_terminal());
        assert!(!TaskStatus::Pending.is_terminal());
        assert!(!TaskStatus::Scheduled.is_terminal());
        assert!(!TaskStatus::Executing.is_terminal());
    }

    #[test]
    fn test_exponential_delay_doubles_and_caps() {
        let s = RetryStrategy::Exponential;
        assert_eq!(s.retry_delay(1), Duration::minutes(2));
        assert_eq!(s.retry_delay(2), Duration::minutes(4));
        assert_eq!(s.retry_delay(3), Duration::minutes(8));
        // min(2^attempts, 60) minutes
        assert_eq!(s.retry_delay(6), Duration::minutes(60));
        assert_eq!(s.retry_delay(30), Duration::minutes(60));
    }

    #[test]
    fn test_fixed_strategy_delays() {
        assert_eq!(RetryStrategy::Immediate.retry_delay(1), Duration::seconds(30));
        assert_eq!(RetryStrategy::Fixed.retry_delay(7), Duration::minutes(5));
        assert_eq!(RetryStrategy::Scheduled.retry_delay(2), Duration::minutes(10));
    }

    #[test]
    fn test_default_strategy_is_scheduled() {
        assert_eq!(RetryStrategy::default(), RetryStrategy::Scheduled);
    }

    #[test]
    fn test_effective_due_prefers_reschedule() {
        let now = Utc::now();
        let mut task = RetryTask {
            id: "t1".to_string(),
            due_at: now,
            payload: "continue".to_string(),
            target: "pane:0".to_string(),
            status: TaskStatus::Scheduled,
            strategy: RetryStrategy::Exponential,
            attempts: 0,
            max_attempts: 3,
            created_at: now,
            last_attempt_at: None,
            next_due_at: None,
            last_error: None,
        };
        assert_eq!(task.effective_due(), now);
        let later = now + Duration::minutes(2);
        task.next_due_at = Some(later);
        assert_eq!(task.effective_due(), later);
    }
}
