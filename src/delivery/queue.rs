use crate::config::DeliveryConfig;
use crate::delivery::sender::Sender;
use crate::delivery::types::{DeliveryStatus, MessageRequest, MessageResult, QueueStats};
use crate::errors::{PaneguardError, PaneguardResult};
use crate::state::{StateKind, StateStore};
use crate::utils::task_tracker::TaskTracker;
use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, Semaphore};
use tracing::{debug, info, warn};

const MIN_SLEEP_MS: i64 = 250;

/// Persisted queue state: waiting requests, requests dispatched but not yet
/// resolved, and the per-id result table.
#[derive(Debug, Default, Serialize, Deserialize)]
struct QueueState {
    #[serde(default)]
    pending: Vec<MessageRequest>,
    #[serde(default, rename = "inFlight")]
    in_flight: Vec<MessageRequest>,
    #[serde(default)]
    results: HashMap<String, MessageResult>,
}

/// Delay before retrying a failed send, given attempts already made.
fn send_retry_delay(attempts: u32) -> Duration {
    Duration::seconds(i64::from(((attempts + 1) * 10).min(30)))
}

/// Delay/priority queue for outbound messages with bounded concurrency and
/// auto-retry.
///
/// A background loop batches due requests each wake; a request moves
/// pending → in-flight before its send and out (with a result) after,
/// regardless of outcome, so every enqueued request reaches exactly one
/// terminal status. In-flight sends are bounded by a semaphore sized to
/// `max_concurrent_sends`. Retries keep the request id and bump its attempt
/// counter. Every transition is persisted for a restart-safe rebuild.
#[derive(Clone)]
pub struct MessageDeliveryQueue {
    config: DeliveryConfig,
    store: Arc<StateStore>,
    sender: Arc<dyn Sender>,
    pending: Arc<Mutex<Vec<MessageRequest>>>,
    in_flight: Arc<Mutex<HashMap<String, MessageRequest>>>,
    results: Arc<Mutex<HashMap<String, MessageResult>>>,
    running: Arc<Mutex<bool>>,
    semaphore: Arc<Semaphore>,
    task_tracker: Arc<TaskTracker>,
}

impl MessageDeliveryQueue {
    pub fn new(config: DeliveryConfig, store: Arc<StateStore>, sender: Arc<dyn Sender>) -> Self {
        let max_concurrent = config.max_concurrent_sends.max(1);
        Self {
            config,
            store,
            sender,
            pending: Arc::new(Mutex::new(Vec::new())),
            in_flight: Arc::new(Mutex::new(HashMap::new())),
            results: Arc::new(Mutex::new(HashMap::new())),
            running: Arc::new(Mutex::new(false)),
            semaphore: Arc::new(Semaphore::new(max_concurrent)),
            task_tracker: Arc::new(TaskTracker::new()),
        }
    }

    /// Rebuild queue state from the store. Requests that were in flight when
    /// the previous process died are re-queued — delivery is at-least-once.
    pub async fn load_state(&self) -> Result<()> {
        let Some(data) = self.store.load(StateKind::MessageQueue, false).await? else {
            return Ok(());
        };
        let mut state: QueueState = serde_json::from_value(data)?;
        if !state.in_flight.is_empty() {
            info!(
                "Re-queueing {} requests that were in flight at shutdown",
                state.in_flight.len()
            );
            for req in state.in_flight.drain(..) {
                if let Some(result) = state.results.get_mut(&req.id) {
                    result.status = DeliveryStatus::Queued;
                }
                state.pending.push(req);
            }
        }
        let count = state.pending.len();
        *self.pending.lock().await = state.pending;
        *self.results.lock().await = state.results;
        debug!("Restored delivery queue with {} pending requests", count);
        Ok(())
    }

    /// Persist the queue. Disk trouble is logged, never surfaced to callers.
    async fn persist(&self) {
        let state = QueueState {
            pending: self.pending.lock().await.clone(),
            in_flight: self.in_flight.lock().await.values().cloned().collect(),
            results: self.results.lock().await.clone(),
        };
        let data = match serde_json::to_value(&state) {
            Ok(v) => v,
            Err(e) => {
                warn!("Failed to serialize delivery queue: {}", e);
                return;
            }
        };
        if let Err(e) = self.store.save(StateKind::MessageQueue, data, true).await {
            warn!("Failed to persist delivery queue: {}", e);
        }
    }

    /// Add a request. Fails fast when the queue is at capacity.
    pub async fn enqueue(&self, request: MessageRequest) -> PaneguardResult<String> {
        let id = request.id.clone();
        {
            let mut pending = self.pending.lock().await;
            if pending.len() >= self.config.max_queue_size {
                return Err(PaneguardError::Capacity(format!(
                    "delivery queue full ({} requests)",
                    pending.len()
                )));
            }
            pending.push(request);
        }
        self.results
            .lock()
            .await
            .insert(id.clone(), MessageResult::queued(&id));
        self.persist().await;
        debug!("Enqueued message {} for delivery", id);
        Ok(id)
    }

    /// Cancel a queued request. An already-dispatched send completes and
    /// keeps its outcome; only the next run is prevented.
    pub async fn cancel(&self, id: &str) -> bool {
        let removed = {
            let mut pending = self.pending.lock().await;
            let before = pending.len();
            pending.retain(|r| r.id != id);
            pending.len() != before
        };
        if removed {
            let mut results = self.results.lock().await;
            if let Some(result) = results.get_mut(id) {
                result.status = DeliveryStatus::Cancelled;
                result.finished_at = Some(Utc::now());
            }
            drop(results);
            self.persist().await;
            info!("Cancelled message {}", id);
        }
        removed
    }

    pub async fn status(&self, id: &str) -> Option<MessageResult> {
        self.results.lock().await.get(id).cloned()
    }

    pub async fn queue_stats(&self) -> QueueStats {
        let queued = self.pending.lock().await.len();
        let in_flight = self.in_flight.lock().await.len();
        let results = self.results.lock().await;
        let mut stats = QueueStats {
            queued,
            in_flight,
            ..QueueStats::default()
        };
        for result in results.values() {
            match result.status {
                DeliveryStatus::Sent => stats.sent += 1,
                DeliveryStatus::Failed => stats.failed += 1,
                DeliveryStatus::Cancelled => stats.cancelled += 1,
                _ => {}
            }
        }
        stats
    }

    pub async fn start(&self) -> Result<()> {
        self.load_state().await?;
        *self.running.lock().await = true;
        let service = self.clone();
        let tracker = self.task_tracker.clone();

        let handle = tokio::spawn(async move {
            loop {
                if !*service.running.lock().await {
                    break;
                }
                let sleep_ms = service.tick().await;
                tokio::time::sleep(tokio::time::Duration::from_millis(sleep_ms)).await;
            }
        });
        tracker.spawn("delivery_queue".to_string(), handle).await;
        info!(
            "Message delivery queue started (batch {}, up to {} concurrent sends)",
            self.config.batch_size, self.config.max_concurrent_sends
        );
        Ok(())
    }

    /// One wake cycle. Returns how long to sleep before the next one.
    async fn tick(&self) -> u64 {
        let now = Utc::now();
        let mut batch: Vec<MessageRequest> = Vec::new();
        let mut next_due: Option<DateTime<Utc>> = None;

        {
            let mut pending = self.pending.lock().await;
            // Urgent first among due requests, then earliest not_before
            pending.sort_by_key(|r| (Reverse(r.priority), r.not_before));
            let mut rest = Vec::with_capacity(pending.len());
            for req in pending.drain(..) {
                if req.not_before <= now && batch.len() < self.config.batch_size {
                    batch.push(req);
                } else {
                    next_due = Some(next_due.map_or(req.not_before, |n| n.min(req.not_before)));
                    rest.push(req);
                }
            }
            *pending = rest;
        }

        if !batch.is_empty() {
            {
                let mut in_flight = self.in_flight.lock().await;
                let mut results = self.results.lock().await;
                for req in &batch {
                    let entry = results
                        .entry(req.id.clone())
                        .or_insert_with(|| MessageResult::queued(&req.id));
                    entry.status = DeliveryStatus::Sending;
                    entry.attempts += 1;
                    in_flight.insert(req.id.clone(), req.clone());
                }
            }
            self.persist().await;

            for req in batch {
                let service = self.clone();
                self.task_tracker
                    .spawn_auto_cleanup(format!("send_{}", req.id), async move {
                        service.dispatch(req).await;
                    })
                    .await;
            }
        }

        self.prune_results(now).await;

        let interval_ms = self.config.wake_interval_seconds.max(1) * 1000;
        match next_due {
            Some(due) => {
                let until = (due - Utc::now()).num_milliseconds().max(MIN_SLEEP_MS) as u64;
                until.min(interval_ms)
            }
            None => interval_ms,
        }
    }

    /// Perform one send under the concurrency bound and record its outcome.
    async fn dispatch(&self, request: MessageRequest) {
        let Ok(_permit) = self.semaphore.acquire().await else {
            return;
        };
        let started = std::time::Instant::now();
        let timeout = std::time::Duration::from_secs(request.timeout_seconds.max(1));
        let outcome =
            tokio::time::timeout(timeout, self.sender.send(&request.target, &request.content))
                .await;
        let latency_ms = started.elapsed().as_millis() as u64;

        let error = match outcome {
            Ok(Ok(true)) => None,
            Ok(Ok(false)) => Some("sender returned false".to_string()),
            Ok(Err(e)) => Some(e.to_string()),
            Err(_) => Some(format!("send timed out after {:?}", timeout)),
        };
        self.complete(request, error, latency_ms).await;
    }

    async fn complete(&self, mut request: MessageRequest, error: Option<String>, latency_ms: u64) {
        let now = Utc::now();
        let id = request.id.clone();
        self.in_flight.lock().await.remove(&id);

        match error {
            None => {
                let mut results = self.results.lock().await;
                if let Some(result) = results.get_mut(&id) {
                    result.status = DeliveryStatus::Sent;
                    result.sent_at = Some(now);
                    result.finished_at = Some(now);
                    result.latency_ms = Some(latency_ms);
                    result.error = None;
                }
                debug!("Message {} sent in {}ms", id, latency_ms);
            }
            Some(err) => {
                let attempts = {
                    let results = self.results.lock().await;
                    results.get(&id).map_or(1, |r| r.attempts)
                };
                if attempts < request.max_attempts {
                    let delay = send_retry_delay(attempts);
                    request.not_before = now + delay;
                    warn!(
                        "Send of {} failed ({}), retry {}/{} in {}s",
                        id,
                        err,
                        attempts + 1,
                        request.max_attempts,
                        delay.num_seconds()
                    );
                    self.pending.lock().await.push(request);
                    let mut results = self.results.lock().await;
                    if let Some(result) = results.get_mut(&id) {
                        result.status = DeliveryStatus::Queued;
                        result.error = Some(err);
                    }
                } else {
                    warn!(
                        "Message {} terminally failed after {} attempts: {}",
                        id, attempts, err
                    );
                    let mut results = self.results.lock().await;
                    if let Some(result) = results.get_mut(&id) {
                        result.status = DeliveryStatus::Failed;
                        result.error = Some(err);
                        result.finished_at = Some(now);
                    }
                }
            }
        }
        self.persist().await;
    }

    /// Age out terminal results past the retention window. Failed results
    /// stay queryable (the dead-letter surface) until this sweep removes them.
    async fn prune_results(&self, now: DateTime<Utc>) {
        let cutoff = now - Duration::seconds(self.config.result_retention_seconds as i64);
        let mut results = self.results.lock().await;
        let before = results.len();
        results.retain(|_, r| {
            !(r.status.is_terminal() && r.finished_at.is_some_and(|t| t < cutoff))
        });
        if results.len() != before {
            debug!("Pruned {} aged delivery results", before - results.len());
        }
    }

    pub async fn stop(&self) {
        *self.running.lock().await = false;
        self.task_tracker
            .shutdown(std::time::Duration::from_secs(5))
            .await;
        self.task_tracker.cancel_all().await;
    }

    /// Idempotent clear: stop the loop and drop queue state. In-flight work
    /// is abandoned, matching the destructive-reset contract.
    pub async fn reset(&self) {
        self.stop().await;
        self.pending.lock().await.clear();
        self.in_flight.lock().await.clear();
        self.results.lock().await.clear();
        self.persist().await;
        info!("Message delivery queue reset");
    }
}
