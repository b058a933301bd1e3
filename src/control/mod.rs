//! Composition and supervision of the recovery subsystem.
//!
//! The `ControlPlane` is the single owner of every component — no globals,
//! no hidden cross-test state. It wires detection into scheduling and
//! delivery, aggregates health, and performs confirmed resets.

pub mod types;

use crate::config::Config;
use crate::delivery::{MessageDeliveryQueue, MessagePriority, MessageRequest, Sender};
use crate::detector::{LimitDetectionResult, LimitDetector};
use crate::errors::{PaneguardError, PaneguardResult};
use crate::frequency::FrequencyTracker;
use crate::retry::{RetryScheduler, RetryStrategy};
use crate::state::{StateKind, StateStore};
use crate::utils::get_paneguard_home;
use anyhow::{Context, Result};
use chrono::{Local, TimeZone, Utc};
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::{info, warn};
pub use types::{ComponentKind, ComponentStatus, HealthLevel, HealthReport, SystemStatus};

const CONTINUE_PAYLOAD: &str = "continue";
const MAX_DETECTION_HISTORY: usize = 100;
// Known banner used by the health probe round-trip
const PROBE_BANNER: &str = "5-hour limit reached ∙ resets 2:30 PM";

pub struct ControlPlane {
    config: Config,
    detector: LimitDetector,
    frequency: Arc<FrequencyTracker>,
    store: Arc<StateStore>,
    retry: Arc<RetryScheduler>,
    delivery: Arc<MessageDeliveryQueue>,
    started_at: Mutex<Instant>,
}

impl ControlPlane {
    pub fn new(config: Config, sender: Arc<dyn Sender>) -> Result<Self> {
        let root = match &config.state.root_dir {
            Some(dir) => dir.clone(),
            None => get_paneguard_home()?.join("state"),
        };
        let store = Arc::new(StateStore::new(root, config.state.max_backups)?);
        let frequency = Arc::new(FrequencyTracker::new(config.frequency.clone()));
        let retry = Arc::new(RetryScheduler::new(config.retry.clone(), store.clone()));
        let delivery = Arc::new(MessageDeliveryQueue::new(
            config.delivery.clone(),
            store.clone(),
            sender,
        ));
        Ok(Self {
            config,
            detector: LimitDetector::new(),
            frequency,
            store,
            retry,
            delivery,
            started_at: Mutex::new(Instant::now()),
        })
    }

    pub fn detector(&self) -> &LimitDetector {
        &self.detector
    }

    pub fn frequency(&self) -> &FrequencyTracker {
        &self.frequency
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    pub fn retry(&self) -> &RetryScheduler {
        &self.retry
    }

    pub fn delivery(&self) -> &MessageDeliveryQueue {
        &self.delivery
    }

    /// Start both background loops and wire retry execution into delivery:
    /// a due retry task becomes an urgent message to its target.
    pub async fn start(&self) -> Result<()> {
        let delivery = self.delivery.clone();
        let delivery_config = self.config.delivery.clone();
        self.retry
            .set_on_task(move |task| {
                let delivery = delivery.clone();
                let config = delivery_config.clone();
                Box::pin(async move {
                    let request =
                        MessageRequest::with_defaults(task.payload, task.target, &config)
                            .with_priority(MessagePriority::Urgent);
                    delivery.enqueue(request).await?;
                    Ok(())
                })
            })
            .await;

        self.delivery.start().await?;
        self.retry.start().await?;
        info!("Control plane started (paneguard {})", crate::VERSION);
        Ok(())
    }

    pub async fn stop(&self) {
        self.retry.stop().await;
        self.delivery.stop().await;
        self.store.shutdown().await;
        info!("Control plane stopped");
    }

    /// Feed raw terminal output from `target` through the detector. On a
    /// detected limit the latest status and a capped history are persisted,
    /// and — when the reset time resolved — a continuation is scheduled.
    pub async fn observe_output(&self, target: &str, text: &str) -> Result<LimitDetectionResult> {
        let result = self.detector.detect(text);
        if !result.detected {
            return Ok(result);
        }

        info!(
            "Usage limit detected on {} (kind {}, parsed_ok {})",
            target,
            result.kind.as_str(),
            result.parsed_ok
        );

        let status = json!({
            "target": target,
            "detection": result,
            "observedAt": Utc::now(),
        });
        if let Err(e) = self.store.save(StateKind::RateLimit, status, true).await {
            warn!("Failed to persist rate-limit status: {}", e);
        }
        self.append_detection_history(&result).await;

        if let Some(reset_naive) = result.reset_time {
            let due_at = Local
                .from_local_datetime(&reset_naive)
                .earliest()
                .map_or_else(Utc::now, |local| local.with_timezone(&Utc));

            // The banner stays on screen across observations — only one
            // continuation per target and due time
            let duplicate = self.retry.pending().await.into_iter().any(|t| {
                t.target == target
                    && t.payload == CONTINUE_PAYLOAD
                    && (t.effective_due() - due_at).num_seconds().abs() < 60
            });
            if !duplicate {
                match self
                    .retry
                    .schedule(
                        due_at,
                        CONTINUE_PAYLOAD.to_string(),
                        target.to_string(),
                        RetryStrategy::Scheduled,
                        None,
                    )
                    .await
                {
                    Ok(id) => info!("Scheduled continuation {} for {} at {}", id, target, due_at),
                    Err(e) => warn!("Failed to schedule continuation for {}: {}", target, e),
                }
            }
        }
        Ok(result)
    }

    async fn append_detection_history(&self, result: &LimitDetectionResult) {
        let mut history = match self.store.load(StateKind::DetectionHistory, true).await {
            Ok(Some(serde_json::Value::Array(entries))) => entries,
            Ok(_) => Vec::new(),
            Err(e) => {
                warn!("Failed to load detection history: {}", e);
                Vec::new()
            }
        };
        match serde_json::to_value(result) {
            Ok(entry) => history.push(entry),
            Err(e) => {
                warn!("Failed to serialize detection result: {}", e);
                return;
            }
        }
        if history.len() > MAX_DETECTION_HISTORY {
            let excess = history.len() - MAX_DETECTION_HISTORY;
            history.drain(..excess);
        }
        // History is advisory — async write is fine
        if let Err(e) = self
            .store
            .save(StateKind::DetectionHistory, serde_json::Value::Array(history), false)
            .await
        {
            warn!("Failed to persist detection history: {}", e);
        }
    }

    /// Record one send against the frequency window. When the window trips,
    /// a synthetic keep-alive is enqueued and the window resets. Returns
    /// whether a keep-alive was triggered.
    pub async fn record_send(&self, source: &str, payload: &str) -> Result<bool> {
        self.frequency.record(source, "send", payload);
        if !self.frequency.should_trigger() {
            return Ok(false);
        }

        info!(
            "Retry storm detected on {} — sending synthetic keep-alive",
            source
        );
        let request = MessageRequest::with_defaults(
            self.frequency.keepalive_message().to_string(),
            source.to_string(),
            &self.config.delivery,
        )
        .with_priority(MessagePriority::High);

        match self.delivery.enqueue(request).await {
            Ok(_) => {
                // Without this reset the tracker re-triggers indefinitely
                self.frequency.reset();
                Ok(true)
            }
            Err(e) => {
                warn!("Failed to enqueue keep-alive for {}: {}", source, e);
                Ok(false)
            }
        }
    }

    /// Aggregated system view. `detailed=true` attaches per-component stats.
    pub async fn status(&self, detailed: bool) -> SystemStatus {
        let mut components = Vec::with_capacity(ComponentKind::ALL.len());

        // Detector is stateless — healthy as long as its probe parses
        let probe = self.detector.detect(PROBE_BANNER);
        components.push(ComponentStatus {
            component: ComponentKind::Detector,
            health: if probe.detected && probe.parsed_ok {
                HealthLevel::Healthy
            } else {
                HealthLevel::Error
            },
            message: None,
            detail: None,
        });

        let freq_stats = self.frequency.stats();
        components.push(ComponentStatus {
            component: ComponentKind::Frequency,
            health: if freq_stats.triggered {
                HealthLevel::Warning
            } else {
                HealthLevel::Healthy
            },
            message: freq_stats
                .triggered
                .then(|| "window tripped, keep-alive pending".to_string()),
            detail: detailed.then(|| serde_json::to_value(&freq_stats).unwrap_or_default()),
        });

        let (state_health, state_message, state_detail) = match self.store.summary().await {
            Ok(summary) => (
                HealthLevel::Healthy,
                None,
                detailed.then(|| serde_json::to_value(&summary).unwrap_or_default()),
            ),
            Err(e) => (
                HealthLevel::Critical,
                Some(format!("state summary failed: {}", e)),
                None,
            ),
        };
        components.push(ComponentStatus {
            component: ComponentKind::State,
            health: state_health,
            message: state_message,
            detail: state_detail,
        });

        let retry_stats = self.retry.stats().await;
        components.push(ComponentStatus {
            component: ComponentKind::Retry,
            health: if retry_stats.failed > 0 {
                HealthLevel::Warning
            } else {
                HealthLevel::Healthy
            },
            message: (retry_stats.failed > 0)
                .then(|| format!("{} tasks terminally failed", retry_stats.failed)),
            detail: detailed.then(|| serde_json::to_value(&retry_stats).unwrap_or_default()),
        });

        let queue_stats = self.delivery.queue_stats().await;
        let delivery_health = if queue_stats.failed > queue_stats.sent && queue_stats.failed > 0 {
            HealthLevel::Error
        } else if queue_stats.failed > 0 {
            HealthLevel::Warning
        } else {
            HealthLevel::Healthy
        };
        components.push(ComponentStatus {
            component: ComponentKind::Delivery,
            health: delivery_health,
            message: (queue_stats.failed > 0)
                .then(|| format!("{} messages terminally failed", queue_stats.failed)),
            detail: detailed.then(|| serde_json::to_value(&queue_stats).unwrap_or_default()),
        });

        let overall_health = components
            .iter()
            .map(|c| c.health)
            .max()
            .unwrap_or(HealthLevel::Healthy);
        SystemStatus {
            overall_health,
            uptime_seconds: self.started_at.lock().await.elapsed().as_secs(),
            components,
        }
    }

    /// Probe filesystem writability and a detector round-trip.
    pub async fn health_check(&self) -> HealthReport {
        let probe_path = self.store.root().join(".health_probe");
        let fs_writable = std::fs::write(&probe_path, b"ok")
            .and_then(|()| std::fs::remove_file(&probe_path))
            .is_ok();

        let probe = self.detector.detect(PROBE_BANNER);
        let detector_ok = probe.detected && probe.parsed_ok;

        HealthReport {
            healthy: fs_writable && detector_ok,
            fs_writable,
            detector_ok,
            checked_at: Utc::now(),
        }
    }

    /// Reset one component: stop its loop (if any) and drop its state.
    /// In-flight work is discarded, so confirmation is required.
    pub async fn reset(&self, component: ComponentKind, confirm: bool) -> PaneguardResult<()> {
        if !confirm {
            return Err(PaneguardError::ConfirmationRequired(format!(
                "reset of {} discards in-flight work",
                component.as_str()
            )));
        }
        match component {
            // Stateless — nothing to drop
            ComponentKind::Detector => {}
            ComponentKind::Frequency => self.frequency.reset(),
            ComponentKind::State => {
                self.store
                    .clear()
                    .await
                    .context("Failed to clear state store")?;
            }
            ComponentKind::Retry => self.retry.reset().await,
            ComponentKind::Delivery => self.delivery.reset().await,
        }
        info!("Component {} reset", component.as_str());
        Ok(())
    }

    /// Reset every component and restart the uptime clock.
    pub async fn reset_all(&self, confirm: bool) -> PaneguardResult<()> {
        if !confirm {
            return Err(PaneguardError::ConfirmationRequired(
                "reset of all components discards in-flight work".to_string(),
            ));
        }
        for component in ComponentKind::ALL {
            self.reset(component, true).await?;
        }
        *self.started_at.lock().await = Instant::now();
        info!("All components reset");
        Ok(())
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}
