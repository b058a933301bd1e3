use super::*;
use serde_json::json;

fn store_in(tmp: &tempfile::TempDir) -> StateStore {
    StateStore::new(tmp.path().join("state"), 3).unwrap()
}

#[tokio::test]
async fn test_save_load_roundtrip_durable() {
    let tmp = tempfile::TempDir::new().unwrap();
    let store = store_in(&tmp);

    store
        .save(StateKind::RateLimit, json!({"detected": true}), true)
        .await
        .unwrap();

    // Through cache
    let cached = store.load(StateKind::RateLimit, true).await.unwrap();
    assert_eq!(cached.unwrap()["detected"], true);

    // From disk
    let from_disk = store.load(StateKind::RateLimit, false).await.unwrap();
    assert_eq!(from_disk.unwrap()["detected"], true);
}

#[tokio::test]
async fn test_disk_file_has_envelope() {
    let tmp = tempfile::TempDir::new().unwrap();
    let store = store_in(&tmp);
    store
        .save(StateKind::RetryTasks, json!([{"id": "t1"}]), true)
        .await
        .unwrap();

    let content =
        std::fs::read_to_string(tmp.path().join("state").join("retry_tasks.json")).unwrap();
    let snapshot: StateSnapshot = serde_json::from_str(&content).unwrap();
    assert_eq!(snapshot.kind, StateKind::RetryTasks);
    assert_eq!(snapshot.data[0]["id"], "t1");
}

#[tokio::test]
async fn test_async_save_eventually_reaches_disk() {
    let tmp = tempfile::TempDir::new().unwrap();
    let store = store_in(&tmp);
    store
        .save(StateKind::MessageQueue, json!({"pending": []}), false)
        .await
        .unwrap();

    // Cache is immediately authoritative
    let cached = store.load(StateKind::MessageQueue, true).await.unwrap();
    assert!(cached.is_some());

    // The background write lands shortly after
    store.shutdown().await;
    let path = tmp.path().join("state").join("message_queue.json");
    assert!(path.exists());
}

#[tokio::test]
async fn test_load_missing_kind_is_none() {
    let tmp = tempfile::TempDir::new().unwrap();
    let store = store_in(&tmp);
    assert!(
        store
            .load(StateKind::DetectionHistory, false)
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
async fn test_delete_removes_cache_and_file() {
    let tmp = tempfile::TempDir::new().unwrap();
    let store = store_in(&tmp);
    store
        .save(StateKind::RateLimit, json!({"a": 1}), true)
        .await
        .unwrap();

    assert!(store.delete(StateKind::RateLimit).await.unwrap());
    assert!(store.load(StateKind::RateLimit, true).await.unwrap().is_none());
    assert!(!store.delete(StateKind::RateLimit).await.unwrap());
}

#[tokio::test]
async fn test_backup_restore_reproduces_file_set() {
    let tmp = tempfile::TempDir::new().unwrap();
    let store = store_in(&tmp);
    store
        .save(StateKind::RateLimit, json!({"kind": "daily"}), true)
        .await
        .unwrap();
    store
        .save(StateKind::RetryTasks, json!([{"id": "t1"}]), true)
        .await
        .unwrap();

    let info = store.backup(Some("before-change")).await.unwrap();
    assert_eq!(info.files_count, 2);
    assert!(info.total_size > 0);

    // Mutate and grow the state after the backup
    store
        .save(StateKind::RateLimit, json!({"kind": "five_hour"}), true)
        .await
        .unwrap();
    store
        .save(StateKind::MessageQueue, json!({"pending": [1]}), true)
        .await
        .unwrap();

    let restored = store.restore("before-change", true).await.unwrap();
    assert_eq!(restored, 2);

    // Exactly the backed-up file set survives
    let summary = store.summary().await.unwrap();
    let existing: Vec<_> = summary
        .kinds
        .iter()
        .filter(|k| k.exists)
        .map(|k| k.kind)
        .collect();
    assert_eq!(existing, vec![StateKind::RateLimit, StateKind::RetryTasks]);

    let rate = store.load(StateKind::RateLimit, false).await.unwrap().unwrap();
    assert_eq!(rate["kind"], "daily");
}

#[tokio::test]
async fn test_restore_requires_confirmation() {
    let tmp = tempfile::TempDir::new().unwrap();
    let store = store_in(&tmp);
    store.backup(Some("b1")).await.unwrap();

    let err = store.restore("b1", false).await.unwrap_err();
    assert!(matches!(err, PaneguardError::ConfirmationRequired(_)));
}

#[tokio::test]
async fn test_restore_unknown_backup_fails() {
    let tmp = tempfile::TempDir::new().unwrap();
    let store = store_in(&tmp);
    let err = store.restore("no-such-backup", true).await.unwrap_err();
    assert!(matches!(err, PaneguardError::NotFound(_)));
}

#[tokio::test]
async fn test_backup_retention_prunes_oldest() {
    let tmp = tempfile::TempDir::new().unwrap();
    let store = store_in(&tmp); // max_backups = 3
    store
        .save(StateKind::RateLimit, json!({"a": 1}), true)
        .await
        .unwrap();

    for i in 0..5 {
        store.backup(Some(&format!("b{}", i))).await.unwrap();
        // Distinct mtimes so retention ordering is deterministic
        tokio::time::sleep(std::time::Duration::from_millis(30)).await;
    }

    let backups = store.list_backups().await.unwrap();
    assert_eq!(backups.len(), 3);
    let names: Vec<_> = backups.iter().map(|b| b.name.as_str()).collect();
    assert!(names.contains(&"b4"));
    assert!(names.contains(&"b3"));
    assert!(names.contains(&"b2"));
}

#[tokio::test]
async fn test_summary_counts_backups() {
    let tmp = tempfile::TempDir::new().unwrap();
    let store = store_in(&tmp);
    store
        .save(StateKind::RateLimit, json!({"x": 1}), true)
        .await
        .unwrap();
    store.backup(None).await.unwrap();

    let summary = store.summary().await.unwrap();
    assert_eq!(summary.backups_count, 1);
    assert!(summary.total_size > 0);
}

#[tokio::test]
async fn test_backup_name_is_sanitized() {
    let tmp = tempfile::TempDir::new().unwrap();
    let store = store_in(&tmp);
    let info = store.backup(Some("pre/launch:1")).await.unwrap();
    assert_eq!(info.name, "pre_launch_1");
    assert!(store.restore("pre/launch:1", true).await.is_ok());
}
