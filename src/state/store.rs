use crate::errors::{PaneguardError, PaneguardResult};
use crate::state::types::{BackupInfo, StateKind, StateKindSummary, StateSnapshot, StateSummary};
use crate::utils::task_tracker::TaskTracker;
use crate::utils::{atomic_write, ensure_dir, safe_filename};
use anyhow::{Context, Result};
use chrono::Utc;
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

const BACKUP_META_FILE: &str = "backup_meta.json";

/// Typed, file-backed persistence with an in-memory cache.
///
/// One JSON document per [`StateKind`] under the root directory. The store
/// exclusively owns the on-disk form; components hold only cached copies and
/// call back here to persist mutations. Single writer per kind — concurrent
/// external mutation of the files is out of scope.
pub struct StateStore {
    root: PathBuf,
    backups_dir: PathBuf,
    max_backups: usize,
    cache: Mutex<HashMap<StateKind, Value>>,
    task_tracker: Arc<TaskTracker>,
}

fn write_snapshot(path: &Path, kind: StateKind, data: &Value) -> Result<()> {
    let snapshot = StateSnapshot {
        kind,
        data: data.clone(),
        updated_at: Utc::now(),
    };
    let content = serde_json::to_string_pretty(&snapshot)?;
    atomic_write(path, &content)
}

impl StateStore {
    pub fn new(root: PathBuf, max_backups: usize) -> Result<Self> {
        ensure_dir(&root)?;
        let backups_dir = root.join("backups");
        ensure_dir(&backups_dir)?;
        Ok(Self {
            root,
            backups_dir,
            max_backups,
            cache: Mutex::new(HashMap::new()),
            task_tracker: Arc::new(TaskTracker::new()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn kind_path(&self, kind: StateKind) -> PathBuf {
        self.root.join(kind.file_name())
    }

    /// Persist one kind. `durable=true` writes before returning;
    /// `durable=false` dispatches the write on a background task, trading a
    /// small durability window for latency — never use it for data whose
    /// loss breaks a caller invariant. The cache may transiently diverge
    /// from disk while an async write is in flight.
    pub async fn save(&self, kind: StateKind, data: Value, durable: bool) -> Result<()> {
        {
            let mut cache = self.cache.lock().await;
            cache.insert(kind, data.clone());
        }

        let path = self.kind_path(kind);
        if durable {
            write_snapshot(&path, kind, &data)
                .with_context(|| format!("Failed to persist state kind '{}'", kind.as_str()))?;
            return Ok(());
        }

        self.task_tracker
            .spawn_auto_cleanup(format!("state_write_{}", kind.as_str()), async move {
                if let Err(e) = write_snapshot(&path, kind, &data) {
                    warn!(
                        "Async write of state kind '{}' failed: {}",
                        kind.as_str(),
                        e
                    );
                }
            })
            .await;
        Ok(())
    }

    /// Load one kind, read-through. `use_cache=false` forces a disk read.
    pub async fn load(&self, kind: StateKind, use_cache: bool) -> Result<Option<Value>> {
        if use_cache {
            let cache = self.cache.lock().await;
            if let Some(data) = cache.get(&kind) {
                return Ok(Some(data.clone()));
            }
        }

        let path = self.kind_path(kind);
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read state from {}", path.display()))?;
        let snapshot: StateSnapshot = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse state from {}", path.display()))?;

        let mut cache = self.cache.lock().await;
        cache.insert(kind, snapshot.data.clone());
        Ok(Some(snapshot.data))
    }

    /// Remove one kind from cache and disk. Returns whether a file existed.
    pub async fn delete(&self, kind: StateKind) -> Result<bool> {
        self.cache.lock().await.remove(&kind);
        let path = self.kind_path(kind);
        if path.exists() {
            std::fs::remove_file(&path)
                .with_context(|| format!("Failed to delete {}", path.display()))?;
            return Ok(true);
        }
        Ok(false)
    }

    /// Remove every kind. Used by resets.
    pub async fn clear(&self) -> Result<()> {
        for kind in StateKind::ALL {
            self.delete(kind).await?;
        }
        Ok(())
    }

    /// Write every cached kind durably. Called before backups so the copy
    /// reflects in-flight async writes.
    async fn flush(&self) -> Result<()> {
        let cache = self.cache.lock().await;
        for (kind, data) in cache.iter() {
            write_snapshot(&self.kind_path(*kind), *kind, data)?;
        }
        Ok(())
    }

    /// Copy every kind into a timestamped backup directory with metadata,
    /// then prune the oldest backups beyond the retention count.
    pub async fn backup(&self, name: Option<&str>) -> Result<BackupInfo> {
        self.flush().await?;

        let created_at = Utc::now();
        let dir_name = match name {
            Some(n) => safe_filename(n),
            None => format!("backup_{}", created_at.format("%Y%m%d_%H%M%S")),
        };
        let backup_dir = self.backups_dir.join(&dir_name);
        ensure_dir(&backup_dir)?;

        let mut files_count = 0;
        let mut total_size = 0u64;
        for kind in StateKind::ALL {
            let src = self.kind_path(kind);
            if !src.exists() {
                continue;
            }
            let dst = backup_dir.join(kind.file_name());
            std::fs::copy(&src, &dst)
                .with_context(|| format!("Failed to copy {} into backup", src.display()))?;
            files_count += 1;
            total_size += std::fs::metadata(&dst).map(|m| m.len()).unwrap_or(0);
        }

        let meta = BackupInfo {
            name: dir_name.clone(),
            created_at,
            files_count,
            total_size,
        };
        atomic_write(
            &backup_dir.join(BACKUP_META_FILE),
            &serde_json::to_string_pretty(&meta)?,
        )?;
        info!(
            "Backup '{}' created ({} files, {} bytes)",
            dir_name, files_count, total_size
        );

        if let Err(e) = self.prune_backups() {
            warn!("Backup retention pruning failed: {}", e);
        }
        Ok(meta)
    }

    pub async fn list_backups(&self) -> Result<Vec<BackupInfo>> {
        let mut backups = Vec::new();
        for entry in std::fs::read_dir(&self.backups_dir)? {
            let entry = entry?;
            if !entry.path().is_dir() {
                continue;
            }
            let meta_path = entry.path().join(BACKUP_META_FILE);
            if let Ok(content) = std::fs::read_to_string(&meta_path)
                && let Ok(meta) = serde_json::from_str::<BackupInfo>(&content)
            {
                backups.push(meta);
            }
        }
        backups.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(backups)
    }

    fn prune_backups(&self) -> Result<()> {
        let mut dirs: Vec<(std::time::SystemTime, PathBuf)> = Vec::new();
        for entry in std::fs::read_dir(&self.backups_dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.is_dir() {
                let modified = entry
                    .metadata()
                    .and_then(|m| m.modified())
                    .unwrap_or(std::time::SystemTime::UNIX_EPOCH);
                dirs.push((modified, path));
            }
        }
        if dirs.len() <= self.max_backups {
            return Ok(());
        }
        dirs.sort_by(|a, b| b.0.cmp(&a.0));
        for (_, path) in dirs.split_off(self.max_backups) {
            std::fs::remove_dir_all(&path)
                .with_context(|| format!("Failed to remove old backup {}", path.display()))?;
            debug!("Pruned old backup {}", path.display());
        }
        Ok(())
    }

    /// Wipe current state and replace it with the named backup. Destructive,
    /// so it requires explicit confirmation. Returns the restored file count.
    pub async fn restore(&self, name: &str, confirm: bool) -> PaneguardResult<usize> {
        if !confirm {
            return Err(PaneguardError::ConfirmationRequired(format!(
                "restore from backup '{}' wipes current state",
                name
            )));
        }
        let backup_dir = self.backups_dir.join(safe_filename(name));
        if !backup_dir.is_dir() {
            return Err(PaneguardError::NotFound(format!("backup '{}'", name)));
        }

        // Wipe first so kinds absent from the backup do not survive
        self.cache.lock().await.clear();
        for kind in StateKind::ALL {
            let path = self.kind_path(kind);
            if path.exists() {
                std::fs::remove_file(&path)
                    .with_context(|| format!("Failed to remove {}", path.display()))?;
            }
        }

        let mut restored = 0;
        for kind in StateKind::ALL {
            let src = backup_dir.join(kind.file_name());
            if !src.exists() {
                continue;
            }
            std::fs::copy(&src, self.kind_path(kind))
                .with_context(|| format!("Failed to restore {}", src.display()))?;
            restored += 1;
        }
        info!("Restored {} state files from backup '{}'", restored, name);
        Ok(restored)
    }

    pub async fn summary(&self) -> Result<StateSummary> {
        let mut kinds = Vec::new();
        let mut total_size = 0u64;
        for kind in StateKind::ALL {
            let path = self.kind_path(kind);
            if path.exists() {
                let meta = std::fs::metadata(&path)?;
                let size = meta.len();
                total_size += size;
                let updated_at = std::fs::read_to_string(&path)
                    .ok()
                    .and_then(|c| serde_json::from_str::<StateSnapshot>(&c).ok())
                    .map(|s| s.updated_at);
                kinds.push(StateKindSummary {
                    kind,
                    exists: true,
                    size_bytes: size,
                    updated_at,
                });
            } else {
                kinds.push(StateKindSummary {
                    kind,
                    exists: false,
                    size_bytes: 0,
                    updated_at: None,
                });
            }
        }
        let backups_count = self.list_backups().await?.len();
        Ok(StateSummary {
            kinds,
            backups_count,
            total_size,
        })
    }

    /// Wait for in-flight async writes, bounded.
    pub async fn shutdown(&self) {
        self.task_tracker
            .shutdown(std::time::Duration::from_secs(5))
            .await;
    }
}

#[cfg(test)]
mod tests;
