use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Sliding-window retry-storm detection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrequencyConfig {
    #[serde(default = "default_window_seconds", rename = "windowSeconds")]
    pub window_seconds: u64,
    #[serde(default = "default_threshold")]
    pub threshold: usize,
    /// Payload exempt from counting — the operator convention for manually
    /// unblocking a stuck loop.
    #[serde(default = "default_bypass_sentinel", rename = "bypassSentinel")]
    pub bypass_sentinel: String,
    /// Content of the synthetic keep-alive sent when the window trips.
    #[serde(default = "default_keepalive_message", rename = "keepaliveMessage")]
    pub keepalive_message: String,
}

fn default_window_seconds() -> u64 {
    300
}

fn default_threshold() -> usize {
    5
}

fn default_bypass_sentinel() -> String {
    "hi".to_string()
}

fn default_keepalive_message() -> String {
    "hi".to_string()
}

impl Default for FrequencyConfig {
    fn default() -> Self {
        Self {
            window_seconds: default_window_seconds(),
            threshold: default_threshold(),
            bypass_sentinel: default_bypass_sentinel(),
            keepalive_message: default_keepalive_message(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateConfig {
    /// Root directory for state files and backups. Empty means
    /// `$PANEGUARD_HOME/state` resolved at startup.
    #[serde(default, rename = "rootDir")]
    pub root_dir: Option<PathBuf>,
    #[serde(default = "default_max_backups", rename = "maxBackups")]
    pub max_backups: usize,
}

fn default_max_backups() -> usize {
    5
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            root_dir: None,
            max_backups: default_max_backups(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_check_interval", rename = "checkIntervalSeconds")]
    pub check_interval_seconds: u64,
    #[serde(default = "default_max_concurrent_tasks", rename = "maxConcurrentTasks")]
    pub max_concurrent_tasks: usize,
    #[serde(default = "default_max_tasks", rename = "maxTasks")]
    pub max_tasks: usize,
    #[serde(default = "default_retry_max_attempts", rename = "defaultMaxAttempts")]
    pub default_max_attempts: u32,
    /// Terminal tasks older than this are garbage-collected.
    #[serde(default = "default_gc_age", rename = "gcAgeSeconds")]
    pub gc_age_seconds: u64,
}

fn default_check_interval() -> u64 {
    30
}

fn default_max_concurrent_tasks() -> usize {
    3
}

fn default_max_tasks() -> usize {
    500
}

fn default_retry_max_attempts() -> u32 {
    3
}

fn default_gc_age() -> u64 {
    86_400
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            check_interval_seconds: default_check_interval(),
            max_concurrent_tasks: default_max_concurrent_tasks(),
            max_tasks: default_max_tasks(),
            default_max_attempts: default_retry_max_attempts(),
            gc_age_seconds: default_gc_age(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryConfig {
    #[serde(default = "default_batch_size", rename = "batchSize")]
    pub batch_size: usize,
    #[serde(default = "default_max_concurrent_sends", rename = "maxConcurrentSends")]
    pub max_concurrent_sends: usize,
    #[serde(default = "default_max_queue_size", rename = "maxQueueSize")]
    pub max_queue_size: usize,
    #[serde(default = "default_delivery_max_attempts", rename = "defaultMaxAttempts")]
    pub default_max_attempts: u32,
    #[serde(default = "default_send_timeout", rename = "sendTimeoutSeconds")]
    pub send_timeout_seconds: u64,
    #[serde(default = "default_wake_interval", rename = "wakeIntervalSeconds")]
    pub wake_interval_seconds: u64,
    /// Terminal results older than this are pruned from the results map.
    #[serde(default = "default_result_retention", rename = "resultRetentionSeconds")]
    pub result_retention_seconds: u64,
}

fn default_batch_size() -> usize {
    10
}

fn default_max_concurrent_sends() -> usize {
    3
}

fn default_max_queue_size() -> usize {
    200
}

fn default_delivery_max_attempts() -> u32 {
    3
}

fn default_send_timeout() -> u64 {
    30
}

fn default_wake_interval() -> u64 {
    5
}

fn default_result_retention() -> u64 {
    3_600
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            max_concurrent_sends: default_max_concurrent_sends(),
            max_queue_size: default_max_queue_size(),
            default_max_attempts: default_delivery_max_attempts(),
            send_timeout_seconds: default_send_timeout(),
            wake_interval_seconds: default_wake_interval(),
            result_retention_seconds: default_result_retention(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub frequency: FrequencyConfig,
    #[serde(default)]
    pub state: StateConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub delivery: DeliveryConfig,
}
