//! Tracker for named background tasks.
//!
//! Every long-running loop and fire-and-forget write in paneguard is spawned
//! through one of these, so shutdown can join or abort everything it owns.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub struct TaskTracker {
    tasks: Arc<Mutex<HashMap<String, JoinHandle<()>>>>,
}

impl TaskTracker {
    pub fn new() -> Self {
        Self {
            tasks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Spawn a tracked background task. A task already registered under the
    /// same name is aborted and replaced.
    pub async fn spawn(&self, name: String, handle: JoinHandle<()>) {
        let mut tasks = self.tasks.lock().await;
        if let Some(old_handle) = tasks.remove(&name) {
            warn!("Aborting existing task '{}' before spawning new one", name);
            old_handle.abort();
        }
        tasks.insert(name, handle);
    }

    /// Spawn a tracked task that unregisters itself when the future completes.
    pub async fn spawn_auto_cleanup<F>(&self, name: String, future: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let tasks = self.tasks.clone();
        let name_clone = name.clone();

        // Hold the lock across spawn + insert: the task removes itself on
        // completion, so the handle must be registered before it can finish.
        let mut tasks_guard = self.tasks.lock().await;
        let handle = tokio::spawn(async move {
            future.await;
            tasks.lock().await.remove(&name_clone);
            debug!("Task '{}' completed and removed from tracker", name_clone);
        });
        tasks_guard.insert(name, handle);
    }

    /// Abort all tracked tasks immediately.
    pub async fn cancel_all(&self) {
        let tasks: HashMap<String, JoinHandle<()>> = {
            let mut guard = self.tasks.lock().await;
            guard.drain().collect()
        };
        let count = tasks.len();
        for (name, handle) in tasks {
            handle.abort();
            debug!("Cancelled task '{}'", name);
        }
        if count > 0 {
            info!("Cancelled {} tracked tasks", count);
        }
    }

    /// Bounded join: give every tracked task up to `timeout` (total) to finish
    /// on its own, then abort whatever is still running.
    pub async fn shutdown(&self, timeout: Duration) {
        let tasks: HashMap<String, JoinHandle<()>> = {
            let mut guard = self.tasks.lock().await;
            guard.drain().collect()
        };
        if tasks.is_empty() {
            return;
        }

        let deadline = tokio::time::Instant::now() + timeout;
        for (name, handle) in tasks {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                handle.abort();
                debug!("Shutdown budget exhausted, aborted task '{}'", name);
                continue;
            }
            match tokio::time::timeout(remaining, handle).await {
                Ok(_) => debug!("Task '{}' joined cleanly on shutdown", name),
                Err(_) => {
                    // timeout() drops the JoinHandle, which does not abort the
                    // task — it keeps running detached. That is acceptable
                    // here because every loop also watches its stop flag.
                    warn!("Task '{}' did not finish within shutdown budget", name);
                }
            }
        }
    }

    #[cfg(test)]
    pub async fn tracked_count(&self) -> usize {
        self.tasks.lock().await.len()
    }
}

impl Default for TaskTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_spawn_and_cancel_all() {
        let tracker = TaskTracker::new();
        let handle = tokio::spawn(async {
            tokio::time::sleep(Duration::from_secs(60)).await;
        });
        tracker.spawn("long_task".to_string(), handle).await;
        assert_eq!(tracker.tracked_count().await, 1);

        tracker.cancel_all().await;
        assert_eq!(tracker.tracked_count().await, 0);
    }

    #[tokio::test]
    async fn test_spawn_replaces_existing_by_name() {
        let tracker = TaskTracker::new();
        let h1 = tokio::spawn(async {
            tokio::time::sleep(Duration::from_secs(60)).await;
        });
        tracker.spawn("loop".to_string(), h1).await;
        let h2 = tokio::spawn(async {
            tokio::time::sleep(Duration::from_secs(60)).await;
        });
        tracker.spawn("loop".to_string(), h2).await;

        assert_eq!(tracker.tracked_count().await, 1);
        tracker.cancel_all().await;
    }

    #[tokio::test]
    async fn test_spawn_auto_cleanup_unregisters_itself() {
        let tracker = TaskTracker::new();
        tracker
            .spawn_auto_cleanup("quick".to_string(), async {})
            .await;

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(
            tracker.tracked_count().await,
            0,
            "auto-cleanup task should remove itself on completion"
        );
    }

    #[tokio::test]
    async fn test_shutdown_joins_fast_tasks() {
        let tracker = TaskTracker::new();
        let handle = tokio::spawn(async {
            tokio::time::sleep(Duration::from_millis(10)).await;
        });
        tracker.spawn("fast".to_string(), handle).await;

        tracker.shutdown(Duration::from_secs(1)).await;
        assert_eq!(tracker.tracked_count().await, 0);
    }

    #[tokio::test]
    async fn test_shutdown_gives_up_on_stuck_tasks() {
        let tracker = TaskTracker::new();
        let handle = tokio::spawn(async {
            tokio::time::sleep(Duration::from_secs(60)).await;
        });
        tracker.spawn("stuck".to_string(), handle).await;

        let started = tokio::time::Instant::now();
        tracker.shutdown(Duration::from_millis(50)).await;
        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(tracker.tracked_count().await, 0);
    }
}
