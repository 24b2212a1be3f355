//! The execution engine: durable checkpointing, the worker invoker, and the
//! bounded-concurrency scheduler.
//!
//! # Architecture
//!
//! - [`CheckpointStore`] — crash-safe load/save of the whole-job snapshot
//! - [`Invoker`] — binds one item to the worker, races the timeout,
//!   classifies the result into an [`Outcome`]
//! - [`JobRunner`] — selects eligible items, keeps at most `concurrency`
//!   invocations in flight, applies state-machine entry actions, and flushes
//!   after every transition
//!
//! # Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use batchloom::config::RunConfig;
//! use batchloom::runtime::JobRunner;
//! use batchloom::worker::worker_fn;
//! use serde_json::json;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = RunConfig::from_data(vec![json!({"x": 1})], "state/checkpoint.json");
//! let mut runner = JobRunner::new(config);
//! let summary = runner
//!     .run(Arc::new(worker_fn(|data, _ctx| async move { Ok(data) })))
//!     .await?;
//! println!("completed: {}", summary.completed);
//! # Ok(())
//! # }
//! ```

pub mod checkpoint;
pub mod invoker;
pub mod runner;

pub use checkpoint::{Checkpoint, CheckpointError, CheckpointStore, JobCounts};
pub use invoker::{Invoker, Outcome};
pub use runner::{JobInit, JobRunner, RunSummary, RunnerError};
