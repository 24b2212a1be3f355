//! # Batchloom: Fault-Tolerant Batch Orchestration for Agent Tasks
//!
//! Batchloom executes a user-supplied worker across a finite, ordered list
//! of input items with bounded parallelism, per-item timeouts, a bounded
//! retry budget, durable checkpointing after every state transition, and
//! crash-restart resumption. A secondary state — *awaiting agent* — lets a
//! worker suspend an item for out-of-band fulfillment by an external
//! supervisor without consuming its retry budget.
//!
//! ## Core Concepts
//!
//! - **Items**: one element of the input array plus its execution metadata
//!   (status, attempts, logs, output)
//! - **Workers**: async functions mapping an item's data to a result value,
//!   an error, or the suspension signal
//! - **Checkpoint**: a single JSON file holding the entire job's state,
//!   flushed atomically after every transition
//! - **Runner**: the cooperative driver keeping at most `concurrency`
//!   invocations in flight
//! - **Suspension bridge**: the between-runs contract by which a supervising
//!   agent fulfills pending prompts
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use batchloom::config::RunConfig;
//! use batchloom::runtime::JobRunner;
//! use batchloom::worker::{worker_fn, WorkerError};
//! use serde_json::json;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = RunConfig::from_data(
//!     vec![json!({"x": 1}), json!({"x": 2})],
//!     "state/checkpoint.json",
//! )
//! .with_concurrency(2);
//!
//! let worker = worker_fn(|data: serde_json::Value, ctx| async move {
//!     ctx.log("multiplying");
//!     let x = data["x"].as_i64().ok_or_else(|| WorkerError::failed("missing x"))?;
//!     Ok(json!(x * 10))
//! });
//!
//! let mut runner = JobRunner::new(config);
//! let summary = runner.run(Arc::new(worker)).await?;
//! println!("completed: {}", summary.completed);
//! # Ok(())
//! # }
//! ```
//!
//! Re-running the same configuration resumes from the checkpoint: completed
//! and awaiting items are skipped, failed items retry until their budget is
//! spent, and items stranded mid-flight by a crash run again (workers must
//! be idempotent).
//!
//! ## Suspension
//!
//! A worker that needs an external brain raises
//! [`worker::WorkerError::Suspend`] (conveniently via
//! [`worker::WorkerError::suspend_with_messages`]). The engine parks the
//! item in `awaiting_agent` with the prompt payload, and a supervisor
//! fulfills it between runs through [`bridge::SuspensionBridge`].
//!
//! ## Failure semantics
//!
//! Worker errors and timeouts are absorbed into item state (`last_error`,
//! attempt counting) and never abort a run. Infrastructure errors —
//! unreadable input, an unparseable or unwritable checkpoint — abort with
//! [`runtime::RunnerError`]; map that to a non-zero exit in your binary.
//! A run that merely leaves items failed or awaiting finishes normally.
//!
//! ## Module Guide
//!
//! - [`config`] - Run configuration and event-bus wiring
//! - [`item`] - Item state machine and lifecycle predicates
//! - [`worker`] - Worker trait, context, and error taxonomy
//! - [`runtime`] - Checkpoint store, invoker, and the scheduler
//! - [`bridge`] - Supervisor-side suspension fulfillment
//! - [`message`] - Chat-message payload convention for prompts
//! - [`event_bus`] - Structured engine logging and sinks
//! - [`telemetry`] - Line formatting and tracing bootstrap

pub mod bridge;
pub mod config;
pub mod event_bus;
pub mod item;
#[cfg(feature = "llm")]
pub mod llm;
pub mod message;
pub mod runtime;
pub mod telemetry;
pub mod worker;
