use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Component health, ordered from best to worst. System health is the worst
/// observed across components.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthLevel {
    Healthy,
    Warning,
    Error,
    Critical,
}

/// The resettable components, as addressed by control operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentKind {
    Detector,
    Frequency,
    State,
    Retry,
    Delivery,
}

impl ComponentKind {
    pub const ALL: [ComponentKind; 5] = [
        ComponentKind::Detector,
        ComponentKind::Frequency,
        ComponentKind::State,
        ComponentKind::Retry,
        ComponentKind::Delivery,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ComponentKind::Detector => "detector",
            ComponentKind::Frequency => "frequency",
            ComponentKind::State => "state",
            ComponentKind::Retry => "retry",
            ComponentKind::Delivery => "delivery",
        }
    }
}

/// Read-only view of one component, computed on demand. Never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentStatus {
    pub component: ComponentKind,
    pub health: HealthLevel,
    pub message: Option<String>,
    /// Component stats, present only for detailed status queries.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemStatus {
    #[serde(rename = "overallHealth")]
    pub overall_health: HealthLevel,
    #[serde(rename = "uptimeSeconds")]
    pub uptime_seconds: u64,
    pub components: Vec<ComponentStatus>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub healthy: bool,
    #[serde(rename = "fsWritable")]
    pub fs_writable: bool,
    #[serde(rename = "detectorOk")]
    pub detector_ok: bool,
    #[serde(rename = "checkedAt")]
    pub checked_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_ordering_worst_wins() {
        assert!(HealthLevel::Critical > HealthLevel::Error);
        assert!(HealthLevel::Error > HealthLevel::Warning);
        assert!(HealthLevel::Warning > HealthLevel::Healthy);
        let worst = [HealthLevel::Healthy, HealthLevel::Warning, HealthLevel::Healthy]
            .into_iter()
            .max()
            .unwrap();
        assert_eq!(worst, HealthLevel::Warning);
    }

    #[test]
    fn test_component_kind_names() {
        assert_eq!(ComponentKind::Retry.as_str(), "retry");
        assert_eq!(
            serde_json::to_string(&ComponentKind::Delivery).unwrap(),
            "\"delivery\""
        );
    }
}
