use crate::config::RetryConfig;
use crate::errors::{PaneguardError, PaneguardResult};
use crate::retry::types::{RetryStats, RetryStrategy, RetryTask, TaskStatus};
use crate::state::{StateKind, StateStore};
use crate::utils::task_tracker::TaskTracker;
use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tokio::sync::{Mutex, Semaphore};
use tracing::{debug, error, info, warn};

const MIN_SLEEP_MS: i64 = 1000;

/// Async callback that executes a due [`RetryTask`].
type TaskCallback = Arc<
    dyn Fn(RetryTask) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<()>> + Send>>
        + Send
        + Sync,
>;

/// Generic "run again at time T under policy P" engine.
///
/// A background loop wakes at the next due timestamp (floored at 1s, capped
/// at the check interval), marks due tasks `executing` under the lock, and
/// fires them outside it with concurrency bounded by a semaphore. Every
/// decision is persisted through the [`StateStore`], so a restart resumes the
/// task table; a task already overdue at restart fires on the next tick.
#[derive(Clone)]
pub struct RetryScheduler {
    config: RetryConfig,
    store: Arc<StateStore>,
    tasks: Arc<Mutex<Vec<RetryTask>>>,
    on_task: Arc<Mutex<Option<TaskCallback>>>,
    running: Arc<Mutex<bool>>,
    semaphore: Arc<Semaphore>,
    task_tracker: Arc<TaskTracker>,
}

/// Apply an execution outcome to a task. Failure with attempts remaining
/// reschedules at the strategy's delay; otherwise the task goes terminal.
fn apply_completion(task: &mut RetryTask, outcome: &Result<()>, now: DateTime<Utc>) {
    match outcome {
        Ok(()) => {
            task.status = TaskStatus::Done;
            task.last_error = None;
        }
        Err(e) => {
            task.last_error = Some(e.to_string());
            if task.attempts < task.max_attempts {
                task.status = TaskStatus::Scheduled;
                task.next_due_at = Some(now + task.strategy.retry_delay(task.attempts));
            } else {
                task.status = TaskStatus::Failed;
            }
        }
    }
}

impl RetryScheduler {
    pub fn new(config: RetryConfig, store: Arc<StateStore>) -> Self {
        let max_concurrent = config.max_concurrent_tasks.max(1);
        Self {
            config,
            store,
            tasks: Arc::new(Mutex::new(Vec::new())),
            on_task: Arc::new(Mutex::new(None)),
            running: Arc::new(Mutex::new(false)),
            semaphore: Arc::new(Semaphore::new(max_concurrent)),
            task_tracker: Arc::new(TaskTracker::new()),
        }
    }

    pub async fn set_on_task<F>(&self, callback: F)
    where
        F: Fn(
                RetryTask,
            )
                -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<()>> + Send>>
            + Send
            + Sync
            + 'static,
    {
        *self.on_task.lock().await = Some(Arc::new(callback));
    }

    /// Rebuild the task table from the store. Tasks found `executing` were
    /// in flight when the previous process died — demote them so they fire
    /// again (lateness tolerated, not retroactively corrected).
    pub async fn load_tasks(&self) -> Result<()> {
        let Some(data) = self.store.load(StateKind::RetryTasks, false).await? else {
            return Ok(());
        };
        let mut restored: Vec<RetryTask> = serde_json::from_value(data)?;
        let mut demoted = 0;
        for task in &mut restored {
            if task.status == TaskStatus::Executing {
                task.status = TaskStatus::Scheduled;
                demoted += 1;
            }
        }
        if demoted > 0 {
            info!("Demoted {} in-flight retry tasks after restart", demoted);
        }
        let count = restored.len();
        *self.tasks.lock().await = restored;
        debug!("Restored {} retry tasks from disk", count);
        Ok(())
    }

    /// Persist the task table. Disk trouble is logged, never surfaced — the
    /// in-memory table stays authoritative.
    async fn persist(&self) {
        let data = {
            let tasks = self.tasks.lock().await;
            match serde_json::to_value(&*tasks) {
                Ok(v) => v,
                Err(e) => {
                    warn!("Failed to serialize retry task table: {}", e);
                    return;
                }
            }
        };
        if let Err(e) = self.store.save(StateKind::RetryTasks, data, true).await {
            warn!("Failed to persist retry task table: {}", e);
        }
    }

    /// Register a task. Fails fast when the table is at capacity.
    pub async fn schedule(
        &self,
        due_at: DateTime<Utc>,
        payload: String,
        target: String,
        strategy: RetryStrategy,
        max_attempts: Option<u32>,
    ) -> PaneguardResult<String> {
        let task = RetryTask {
            id: uuid::Uuid::new_v4().to_string(),
            due_at,
            payload,
            target,
            status: TaskStatus::Scheduled,
            strategy,
            attempts: 0,
            max_attempts: max_attempts.unwrap_or(self.config.default_max_attempts),
            created_at: Utc::now(),
            last_attempt_at: None,
            next_due_at: None,
            last_error: None,
        };
        let id = task.id.clone();

        {
            let mut tasks = self.tasks.lock().await;
            let active = tasks.iter().filter(|t| !t.status.is_terminal()).count();
            if active >= self.config.max_tasks {
                return Err(PaneguardError::Capacity(format!(
                    "retry task table full ({} active tasks)",
                    active
                )));
            }
            tasks.push(task);
        }
        self.persist().await;
        info!("Scheduled retry task {} due at {}", id, due_at);
        Ok(id)
    }

    /// Cancel a task. Only prevents the *next* run — an already-dispatched
    /// execution completes, and its outcome is then discarded.
    pub async fn cancel(&self, id: &str) -> bool {
        let cancelled = {
            let mut tasks = self.tasks.lock().await;
            match tasks
                .iter_mut()
                .find(|t| t.id == id && !t.status.is_terminal())
            {
                Some(task) => {
                    task.status = TaskStatus::Cancelled;
                    true
                }
                None => false,
            }
        };
        if cancelled {
            self.persist().await;
            info!("Cancelled retry task {}", id);
        }
        cancelled
    }

    /// Non-terminal tasks ordered by due time.
    pub async fn pending(&self) -> Vec<RetryTask> {
        let tasks = self.tasks.lock().await;
        let mut pending: Vec<RetryTask> = tasks
            .iter()
            .filter(|t| !t.status.is_terminal())
            .cloned()
            .collect();
        pending.sort_by_key(RetryTask::effective_due);
        pending
    }

    pub async fn status(&self, id: &str) -> Option<RetryTask> {
        self.tasks.lock().await.iter().find(|t| t.id == id).cloned()
    }

    pub async fn stats(&self) -> RetryStats {
        let tasks = self.tasks.lock().await;
        let mut stats = RetryStats {
            total: tasks.len(),
            ..RetryStats::default()
        };
        for task in tasks.iter() {
            match task.status {
                TaskStatus::Pending | TaskStatus::Scheduled => stats.scheduled += 1,
                TaskStatus::Executing => stats.executing += 1,
                TaskStatus::Done => stats.done += 1,
                TaskStatus::Failed => stats.failed += 1,
                TaskStatus::Cancelled => stats.cancelled += 1,
            }
        }
        stats
    }

    pub async fn start(&self) -> Result<()> {
        self.load_tasks().await?;
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
        tracker.spawn("retry_scheduler".to_string(), handle).await;
        info!(
            "Retry scheduler started (up to {} concurrent tasks)",
            self.config.max_concurrent_tasks
        );
        Ok(())
    }

    /// One wake cycle. Returns how long to sleep before the next one.
    async fn tick(&self) -> u64 {
        let now = Utc::now();
        let callback_opt = self.on_task.lock().await.clone();

        let mut to_fire: Vec<RetryTask> = Vec::new();
        let mut next_due: Option<DateTime<Utc>> = None;
        let mut dirty = false;

        {
            let mut tasks = self.tasks.lock().await;

            // GC terminal tasks past the retention age
            let gc_cutoff = now - Duration::seconds(self.config.gc_age_seconds as i64);
            let before = tasks.len();
            tasks.retain(|t| {
                !(t.status.is_terminal()
                    && t.last_attempt_at.unwrap_or(t.created_at) < gc_cutoff)
            });
            if tasks.len() != before {
                debug!("GC removed {} terminal retry tasks", before - tasks.len());
                dirty = true;
            }

            // Without a callback nothing can complete an executing task, so
            // due tasks stay scheduled until one is registered
            if callback_opt.is_some() {
                let mut due: Vec<&mut RetryTask> = tasks
                    .iter_mut()
                    .filter(|t| {
                        matches!(t.status, TaskStatus::Pending | TaskStatus::Scheduled)
                            && t.effective_due() <= now
                    })
                    .collect();
                due.sort_by_key(|t| t.effective_due());

                for task in due {
                    // Mark before firing so the task cannot double-dispatch
                    task.status = TaskStatus::Executing;
                    task.attempts += 1;
                    task.last_attempt_at = Some(now);
                    dirty = true;
                    to_fire.push(task.clone());
                }
            }

            for task in tasks.iter().filter(|t| !t.status.is_terminal()) {
                if task.status == TaskStatus::Executing {
                    continue;
                }
                let d = task.effective_due();
                next_due = Some(next_due.map_or(d, |n| n.min(d)));
            }
        }

        if dirty {
            self.persist().await;
        }

        if let Some(callback) = callback_opt {
            for task in to_fire {
                let callback = callback.clone();
                let service = self.clone();
                let task_id = task.id.clone();
                self.task_tracker
                    .spawn_auto_cleanup(format!("retry_task_{}", task_id), async move {
                        // Bound concurrent executions across ticks
                        let Ok(_permit) = service.semaphore.acquire().await else {
                            return;
                        };
                        let outcome = callback(task).await;
                        service.complete(&task_id, outcome).await;
                    })
                    .await;
            }
        }

        let interval_ms = self.config.check_interval_seconds.max(1) * 1000;
        match next_due {
            Some(due) => {
                let until = (due - Utc::now()).num_milliseconds().max(MIN_SLEEP_MS) as u64;
                until.min(interval_ms)
            }
            None => interval_ms,
        }
    }

    async fn complete(&self, task_id: &str, outcome: Result<()>) {
        let now = Utc::now();
        match &outcome {
            Ok(()) => debug!("Retry task {} succeeded", task_id),
            Err(e) => error!("Retry task {} failed: {}", task_id, e),
        }
        {
            let mut tasks = self.tasks.lock().await;
            // A task cancelled while in flight keeps its cancelled status
            if let Some(task) = tasks
                .iter_mut()
                .find(|t| t.id == task_id && t.status == TaskStatus::Executing)
            {
                apply_completion(task, &outcome, now);
                if task.status == TaskStatus::Failed {
                    warn!(
                        "Retry task {} terminally failed after {} attempts",
                        task_id, task.attempts
                    );
                }
            }
        }
        self.persist().await;
    }

    pub async fn stop(&self) {
        *self.running.lock().await = false;
        self.task_tracker
            .shutdown(std::time::Duration::from_secs(5))
            .await;
        self.task_tracker.cancel_all().await;
    }

    /// Idempotent clear: stop the loop and drop the task table. In-flight
    /// work is abandoned, matching the destructive-reset contract.
    pub async fn reset(&self) {
        self.stop().await;
        self.tasks.lock().await.clear();
        self.persist().await;
        info!("Retry scheduler reset");
    }
}
