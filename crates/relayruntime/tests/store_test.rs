// crates/relayruntime/tests/store_test.rs

use relaycore::{RunMode, RunStatus, RunStore, StoreError};
use relayruntime::{InMemoryRunStore, JsonFileRunStore};
use serde_json::{json, Map, Value};
use std::path::PathBuf;
use uuid::Uuid;

fn temp_dir() -> PathBuf {
    std::env::temp_dir().join(format!("relay-test-{}", Uuid::new_v4()))
}

fn extra(key: &str, value: Value) -> Map<String, Value> {
    let mut map = Map::new();
    map.insert(key.to_string(), value);
    map
}

#[tokio::test]
async fn test_json_file_store_survives_reopen() {
    let dir = temp_dir();
    let workflow_id = Uuid::new_v4();

    let run_id = {
        let store = JsonFileRunStore::open(&dir).await.unwrap();
        let record = store
            .create(workflow_id, RunMode::Webhook, RunStatus::Pending, extra("triggeredBy", json!("u1")))
            .await
            .unwrap();
        store
            .update_status(record.run_id, RunStatus::Running, Map::new())
            .await
            .unwrap();
        store
            .update_status(record.run_id, RunStatus::Completed, extra("executionOrder", json!(["a"])))
            .await
            .unwrap();
        record.run_id
    };

    let reopened = JsonFileRunStore::open(&dir).await.unwrap();
    let record = reopened.find_by_id(run_id).await.unwrap().expect("record on disk");
    assert_eq!(record.status, RunStatus::Completed);
    assert_eq!(record.mode, RunMode::Webhook);
    assert_eq!(record.metadata["triggeredBy"], "u1");
    assert_eq!(record.metadata["executionOrder"], json!(["a"]));
    assert!(record.completed_at.is_some());

    let runs = reopened.find_by_workflow(workflow_id).await.unwrap();
    assert_eq!(runs.len(), 1);
    assert!(reopened.find_by_workflow(Uuid::new_v4()).await.unwrap().is_empty());

    let _ = tokio::fs::remove_dir_all(&dir).await;
}

#[tokio::test]
async fn test_status_only_moves_forward() {
    let store = InMemoryRunStore::new();
    let record = store
        .create(Uuid::new_v4(), RunMode::Manual, RunStatus::Pending, Map::new())
        .await
        .unwrap();

    store
        .update_status(record.run_id, RunStatus::Running, Map::new())
        .await
        .unwrap();
    store
        .update_status(record.run_id, RunStatus::Failed, Map::new())
        .await
        .unwrap();

    let err = store
        .update_status(record.run_id, RunStatus::Running, Map::new())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        StoreError::InvalidTransition {
            from: RunStatus::Failed,
            to: RunStatus::Running,
            ..
        }
    ));

    let err = store
        .update_status(record.run_id, RunStatus::Completed, Map::new())
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::InvalidTransition { .. }));

    let stored = store.find_by_id(record.run_id).await.unwrap().unwrap();
    assert_eq!(stored.status, RunStatus::Failed);
}

#[tokio::test]
async fn test_repeated_terminal_update_merges_metadata() {
    let store = InMemoryRunStore::new();
    let record = store
        .create(Uuid::new_v4(), RunMode::Manual, RunStatus::Pending, Map::new())
        .await
        .unwrap();

    let cancelled = store
        .update_status(record.run_id, RunStatus::Cancelled, extra("stoppedAt", json!("now")))
        .await
        .unwrap();
    let completed_at = cancelled.completed_at;

    let again = store
        .update_status(record.run_id, RunStatus::Cancelled, extra("runData", json!({})))
        .await
        .unwrap();
    assert_eq!(again.status, RunStatus::Cancelled);
    assert_eq!(again.completed_at, completed_at);
    assert_eq!(again.metadata["stoppedAt"], "now");
    assert_eq!(again.metadata["runData"], json!({}));
}

#[tokio::test]
async fn test_unknown_run_is_not_found() {
    let store = InMemoryRunStore::new();
    let missing = Uuid::new_v4();

    assert!(store.find_by_id(missing).await.unwrap().is_none());
    let err = store
        .update_status(missing, RunStatus::Running, Map::new())
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::NotFound(id) if id == missing));
}
