use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use batchloom::config::{EventBusConfig, RunConfig};
use batchloom::item::ItemStatus;
use batchloom::runtime::{CheckpointStore, JobRunner};
use batchloom::worker::worker_fn;
use serde_json::{Value, json};
use tempfile::tempdir;

fn quiet_config(items: Vec<Value>, checkpoint: &Path) -> RunConfig {
    RunConfig::from_data(items, checkpoint.to_path_buf())
        .without_interrupt_trap()
        .with_event_bus(EventBusConfig::new(0, vec![]))
}

#[tokio::test]
async fn in_flight_invocations_never_exceed_the_concurrency_bound() {
    let dir = tempdir().unwrap();
    let cp_path = dir.path().join("checkpoint.json");
    let items: Vec<Value> = (0..10).map(|n| json!({"n": n})).collect();
    let config = quiet_config(items, &cp_path).with_concurrency(3);

    let current = Arc::new(AtomicUsize::new(0));
    let high_water = Arc::new(AtomicUsize::new(0));

    let mut runner = JobRunner::new(config);
    let current_handle = Arc::clone(&current);
    let high_water_handle = Arc::clone(&high_water);
    let worker = worker_fn(move |_data, _ctx| {
        let current = Arc::clone(&current_handle);
        let high_water = Arc::clone(&high_water_handle);
        async move {
            let now = current.fetch_add(1, Ordering::SeqCst) + 1;
            high_water.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(100)).await;
            current.fetch_sub(1, Ordering::SeqCst);
            Ok(json!(null))
        }
    });
    let summary = runner.run(Arc::new(worker)).await.unwrap();

    assert_eq!(summary.completed, 10);
    let peak = high_water.load(Ordering::SeqCst);
    assert!(peak <= 3, "concurrency bound violated: {peak}");
    assert!(peak >= 2, "invocations never overlapped: {peak}");

    let cp = CheckpointStore::new(cp_path).load().unwrap().unwrap();
    assert_eq!(cp.completed_count, 10);
    assert!(
        cp.items
            .iter()
            .all(|item| item.status == ItemStatus::Completed && item.attempts == 1)
    );
}

#[tokio::test]
async fn serial_jobs_dispatch_in_input_order() {
    let dir = tempdir().unwrap();
    let cp_path = dir.path().join("checkpoint.json");
    let items: Vec<Value> = (0..5).map(|n| json!({"n": n})).collect();
    let config = quiet_config(items, &cp_path); // concurrency 1

    let order = Arc::new(std::sync::Mutex::new(Vec::<String>::new()));
    let mut runner = JobRunner::new(config);
    let order_handle = Arc::clone(&order);
    let worker = worker_fn(move |_data, ctx: batchloom::worker::WorkerCtx| {
        let order = Arc::clone(&order_handle);
        async move {
            order.lock().unwrap().push(ctx.item_id().to_string());
            Ok(json!(null))
        }
    });
    runner.run(Arc::new(worker)).await.unwrap();

    let observed = order.lock().unwrap().clone();
    assert_eq!(
        observed,
        vec!["item-0", "item-1", "item-2", "item-3", "item-4"]
    );
}
