use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use batchloom::bridge::{BridgeError, SuspensionBridge};
use batchloom::config::{EventBusConfig, RunConfig};
use batchloom::item::ItemStatus;
use batchloom::runtime::{CheckpointStore, JobRunner};
use batchloom::worker::{WorkerError, worker_fn};
use serde_json::{Value, json};
use tempfile::tempdir;

fn quiet_config(items: Vec<Value>, checkpoint: &Path) -> RunConfig {
    RunConfig::from_data(items, checkpoint.to_path_buf())
        .without_interrupt_trap()
        .with_event_bus(EventBusConfig::new(0, vec![]))
}

/// First run: the worker suspends item-0 with a one-message prompt.
async fn run_suspending(cp_path: &Path) {
    let mut runner = JobRunner::new(quiet_config(vec![json!({"q": "hi"})], cp_path));
    let worker = worker_fn(|_data, _ctx| async move {
        Err(WorkerError::suspend(
            json!([{"role": "user", "content": "hi"}]),
        ))
    });
    let summary = runner.run(Arc::new(worker)).await.unwrap();
    assert_eq!(summary.awaiting, 1);
}

#[tokio::test]
async fn pending_lists_awaiting_items_with_their_prompts() {
    let dir = tempdir().unwrap();
    let cp_path = dir.path().join("checkpoint.json");
    run_suspending(&cp_path).await;

    let bridge = SuspensionBridge::open(cp_path);
    let pending = bridge.pending().unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].item_id, "item-0");
    assert_eq!(pending[0].prompt[0]["content"], "hi");
}

#[tokio::test]
async fn fulfilled_items_are_skipped_on_the_next_run() {
    let dir = tempdir().unwrap();
    let cp_path = dir.path().join("checkpoint.json");
    run_suspending(&cp_path).await;

    let bridge = SuspensionBridge::open(cp_path.clone());
    bridge.fulfill("item-0", json!("answer")).unwrap();

    let cp = CheckpointStore::new(cp_path.clone()).load().unwrap().unwrap();
    assert_eq!(cp.items[0].status, ItemStatus::Completed);
    assert_eq!(cp.items[0].output, Some(json!("answer")));
    assert_eq!(cp.items[0].pending_prompt, None);
    assert_eq!(cp.completed_count, 1);

    let calls = Arc::new(AtomicUsize::new(0));
    let mut runner = JobRunner::new(quiet_config(vec![], &cp_path));
    let calls_handle = Arc::clone(&calls);
    let worker = worker_fn(move |_data, _ctx| {
        let calls = Arc::clone(&calls_handle);
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(json!(null))
        }
    });
    let summary = runner.run(Arc::new(worker)).await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(summary.completed, 1);
}

#[tokio::test]
async fn reprocessed_items_run_again_with_rewritten_data() {
    let dir = tempdir().unwrap();
    let cp_path = dir.path().join("checkpoint.json");
    run_suspending(&cp_path).await;

    let bridge = SuspensionBridge::open(cp_path.clone());
    bridge
        .reprocess("item-0", Some(json!({"q": "rewritten"})))
        .unwrap();

    let cp = CheckpointStore::new(cp_path.clone()).load().unwrap().unwrap();
    assert_eq!(cp.items[0].status, ItemStatus::Pending);
    assert_eq!(cp.items[0].pending_prompt, None);

    let mut runner = JobRunner::new(quiet_config(vec![], &cp_path));
    let worker = worker_fn(|data: Value, _ctx| async move { Ok(data) });
    let summary = runner.run(Arc::new(worker)).await.unwrap();
    assert_eq!(summary.completed, 1);

    let cp = CheckpointStore::new(cp_path).load().unwrap().unwrap();
    assert_eq!(cp.items[0].output, Some(json!({"q": "rewritten"})));
    // The earlier suspension rolled its attempt back; only the fresh
    // invocation counts.
    assert_eq!(cp.items[0].attempts, 1);
}

#[tokio::test]
async fn bridge_rejects_items_that_are_not_awaiting() {
    let dir = tempdir().unwrap();
    let cp_path = dir.path().join("checkpoint.json");

    // Complete the single item normally.
    let mut runner = JobRunner::new(quiet_config(vec![json!(1)], &cp_path));
    let worker = worker_fn(|_data, _ctx| async move { Ok(json!("done")) });
    runner.run(Arc::new(worker)).await.unwrap();

    let bridge = SuspensionBridge::open(cp_path);
    let err = bridge.fulfill("item-0", json!("late")).unwrap_err();
    assert!(matches!(err, BridgeError::NotAwaiting { .. }), "{err:?}");

    let err = bridge.fulfill("item-99", json!("nope")).unwrap_err();
    assert!(matches!(err, BridgeError::UnknownItem { .. }), "{err:?}");
}

#[tokio::test]
async fn bridge_requires_an_existing_checkpoint() {
    let dir = tempdir().unwrap();
    let bridge = SuspensionBridge::open(dir.path().join("absent.json"));
    let err = bridge.pending().unwrap_err();
    assert!(matches!(err, BridgeError::Missing { .. }), "{err:?}");
}
