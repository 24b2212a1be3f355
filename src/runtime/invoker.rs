//! Binds one item to the worker: timeout race, outcome classification.
//!
//! The invoker never mutates the item or the checkpoint; it returns an
//! [`Outcome`] and lets the runner apply the state-machine entry actions.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::watch;

use crate::worker::{Worker, WorkerCtx, WorkerError};

/// Classified result of one worker invocation.
#[derive(Clone, Debug, PartialEq)]
pub enum Outcome {
    /// The worker returned a value to persist as the item's output.
    Success(Value),
    /// The worker raised the suspension signal with this prompt payload.
    Suspend(Value),
    /// Any other failure, including timeout; the message becomes
    /// `last_error`.
    Fail(String),
}

/// Runs the worker against a single item with an optional timeout.
#[derive(Clone)]
pub struct Invoker {
    worker: Arc<dyn Worker>,
    timeout: Option<Duration>,
}

impl Invoker {
    pub fn new(worker: Arc<dyn Worker>, timeout: Option<Duration>) -> Self {
        Self { worker, timeout }
    }

    /// Invoke the worker on `data` and classify the result.
    ///
    /// When the timeout wins the race, the worker future is dropped and
    /// `cancel` is flipped so sub-tasks holding the context can observe the
    /// request; in-flight I/O may continue until it does.
    pub async fn invoke(&self, data: Value, ctx: WorkerCtx, cancel: watch::Sender<bool>) -> Outcome {
        match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, self.worker.run(data, ctx)).await {
                Ok(result) => classify(result),
                Err(_elapsed) => {
                    let _ = cancel.send(true);
                    Outcome::Fail(format!("Operation timed out after {}ms", limit.as_millis()))
                }
            },
            None => classify(self.worker.run(data, ctx).await),
        }
    }
}

fn classify(result: Result<Value, WorkerError>) -> Outcome {
    match result {
        Ok(value) => Outcome::Success(value),
        Err(WorkerError::Suspend { prompt }) => Outcome::Suspend(prompt),
        Err(err) => Outcome::Fail(err.to_string()),
    }
}
