use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The state kinds the store owns, one JSON file each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StateKind {
    RateLimit,
    RetryTasks,
    MessageQueue,
    DetectionHistory,
}

impl StateKind {
    pub const ALL: [StateKind; 4] = [
        StateKind::RateLimit,
        StateKind::RetryTasks,
        StateKind::MessageQueue,
        StateKind::DetectionHistory,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StateKind::RateLimit => "rate_limit",
            StateKind::RetryTasks => "retry_tasks",
            StateKind::MessageQueue => "message_queue",
            StateKind::DetectionHistory => "detection_history",
        }
    }

    pub fn file_name(&self) -> String {
        format!("{}.json", self.as_str())
    }
}

/// On-disk envelope, one per kind. The store exclusively owns this form;
/// other components only ever hold the inner `data`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub kind: StateKind,
    pub data: Value,
    #[serde(rename = "updatedAt")]
    pub updated_at: DateTime<Utc>,
}

/// Metadata written alongside every backup directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupInfo {
    pub name: String,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "filesCount")]
    pub files_count: usize,
    #[serde(rename = "totalSize")]
    pub total_size: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateKindSummary {
    pub kind: StateKind,
    pub exists: bool,
    #[serde(rename = "sizeBytes")]
    pub size_bytes: u64,
    #[serde(rename = "updatedAt")]
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateSummary {
    pub kinds: Vec<StateKindSummary>,
    #[serde(rename = "backupsCount")]
    pub backups_count: usize,
    #[serde(rename = "totalSize")]
    pub total_size: u64,
}
