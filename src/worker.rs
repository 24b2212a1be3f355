//! The worker contract: the user-supplied per-item function, its execution
//! context, and the error taxonomy the engine classifies.
//!
//! A worker maps an item's opaque `data` to a result value. It can fail
//! (consuming an attempt), or raise the suspension signal
//! ([`WorkerError::Suspend`]) to delegate the item to an external agent
//! without consuming the retry budget. Classification is by pattern match on
//! the sum type; there is no downcasting.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use miette::Diagnostic;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::watch;

use crate::event_bus::{Event, EventEmitter};
use crate::message::Message;

/// A unit of user-supplied work, invoked once per attempt on an item.
///
/// # Obligations
///
/// - **Idempotence**: a crash can re-run an invocation that already had side
///   effects; the engine never rolls anything back.
/// - **Cooperative cancellation**: on timeout the engine drops the worker
///   future and flips the context's cancel token. I/O the worker spawned
///   elsewhere continues until it observes [`WorkerCtx::is_cancelled`].
#[async_trait]
pub trait Worker: Send + Sync {
    /// Process one item's data, returning the output value to persist.
    async fn run(&self, data: Value, ctx: WorkerCtx) -> Result<Value, WorkerError>;
}

/// Adapter turning an async closure into a [`Worker`].
///
/// ```
/// use batchloom::worker::{worker_fn, WorkerError};
/// use serde_json::{json, Value};
///
/// let worker = worker_fn(|data: Value, _ctx| async move {
///     let x = data["x"].as_i64().ok_or_else(|| WorkerError::failed("missing x"))?;
///     Ok(json!(x * 10))
/// });
/// # let _ = worker;
/// ```
pub fn worker_fn<F, Fut>(f: F) -> FnWorker
where
    F: Fn(Value, WorkerCtx) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, WorkerError>> + Send + 'static,
{
    let wrapped = move |data: Value, ctx: WorkerCtx| -> BoxFuture<'static, Result<Value, WorkerError>> {
        Box::pin(f(data, ctx))
    };
    FnWorker {
        f: Box::new(wrapped),
    }
}

type BoxedWorkerFn =
    Box<dyn Fn(Value, WorkerCtx) -> BoxFuture<'static, Result<Value, WorkerError>> + Send + Sync>;

/// See [`worker_fn`].
pub struct FnWorker {
    f: BoxedWorkerFn,
}

#[async_trait]
impl Worker for FnWorker {
    async fn run(&self, data: Value, ctx: WorkerCtx) -> Result<Value, WorkerError> {
        (self.f)(data, ctx).await
    }
}

/// A worker-log line queued for the driver to append onto the owning item.
#[derive(Clone, Debug)]
pub(crate) struct ItemLog {
    pub item_id: String,
    pub line: String,
}

/// Execution context handed to each worker invocation.
///
/// `log` writes the line twice: to the engine log (with an `[item-id]`
/// prefix) and onto a queue the driver drains into the item's durable `logs`
/// before every checkpoint flush. The context is cheap to clone into
/// sub-tasks the worker spawns.
#[derive(Clone, Debug)]
pub struct WorkerCtx {
    item_id: String,
    emitter: Arc<dyn EventEmitter>,
    log_tx: flume::Sender<ItemLog>,
    cancelled: watch::Receiver<bool>,
}

impl WorkerCtx {
    pub(crate) fn new(
        item_id: String,
        emitter: Arc<dyn EventEmitter>,
        log_tx: flume::Sender<ItemLog>,
        cancelled: watch::Receiver<bool>,
    ) -> Self {
        Self {
            item_id,
            emitter,
            log_tx,
            cancelled,
        }
    }

    /// The id of the item this invocation is bound to.
    #[must_use]
    pub fn item_id(&self) -> &str {
        &self.item_id
    }

    /// Append a line to the engine log and to the item's own log sequence.
    pub fn log(&self, message: impl Into<String>) {
        let line = message.into();
        let _ = self.emitter.emit(Event::item(&self.item_id, line.clone()));
        let _ = self.log_tx.send(ItemLog {
            item_id: self.item_id.clone(),
            line,
        });
    }

    /// Whether the engine has asked this invocation to stop (timeout fired).
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.cancelled.borrow()
    }

    /// Resolve when cancellation is requested. Long-running workers can race
    /// this against their own I/O.
    pub async fn cancelled(&mut self) {
        while !*self.cancelled.borrow() {
            if self.cancelled.changed().await.is_err() {
                return;
            }
        }
    }
}

/// Errors a worker can raise, classified by the invoker.
///
/// [`WorkerError::Suspend`] is the agent-bridge sentinel: it carries the
/// prompt payload, drives the `awaiting_agent` transition, and does not
/// consume an attempt. Every other variant consumes an attempt and is
/// persisted as the item's `last_error`.
#[derive(Debug, Error, Diagnostic)]
pub enum WorkerError {
    /// The worker needs an external agent; `prompt` describes what it wants.
    #[error("awaiting external agent")]
    #[diagnostic(
        code(batchloom::worker::suspend),
        help("Fulfill the pending prompt through the suspension bridge, then re-run the job.")
    )]
    Suspend { prompt: Value },

    /// External provider or service error.
    #[error("provider error ({provider}): {message}")]
    #[diagnostic(code(batchloom::worker::provider))]
    Provider {
        provider: &'static str,
        message: String,
    },

    /// JSON serialization/deserialization error inside the worker.
    #[error(transparent)]
    #[diagnostic(code(batchloom::worker::serde_json))]
    Serde(#[from] serde_json::Error),

    /// Any other failure, stringified.
    #[error("{0}")]
    #[diagnostic(code(batchloom::worker::failed))]
    Failed(String),
}

impl WorkerError {
    /// Plain failure with a message.
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }

    /// Raise the suspension signal with an arbitrary JSON payload.
    pub fn suspend(prompt: impl Into<Value>) -> Self {
        Self::Suspend {
            prompt: prompt.into(),
        }
    }

    /// Raise the suspension signal with a chat-message prompt, the
    /// conventional payload shape.
    pub fn suspend_with_messages(messages: &[Message]) -> Self {
        Self::Suspend {
            prompt: serde_json::to_value(messages).unwrap_or(Value::Null),
        }
    }

    /// Whether this error is the suspension sentinel.
    #[must_use]
    pub fn is_suspension(&self) -> bool {
        matches!(self, Self::Suspend { .. })
    }
}
