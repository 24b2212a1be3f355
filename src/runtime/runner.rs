//! The scheduler: drives every eligible item through the state machine with
//! bounded concurrency, flushing the checkpoint after each transition.

use std::collections::VecDeque;
use std::io;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;

use futures_util::FutureExt;
use miette::Diagnostic;
use rustc_hash::FxHashMap;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::{JoinError, JoinSet};
use tracing::instrument;

use crate::config::{InputSource, RunConfig};
use crate::event_bus::{Event, EventBus, EventStream, FileSink};
use crate::item::ItemStatus;
use crate::runtime::checkpoint::{Checkpoint, CheckpointError, CheckpointStore};
use crate::runtime::invoker::{Invoker, Outcome};
use crate::worker::{Worker, WorkerCtx};

/// Whether this run created the job or picked up an existing checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobInit {
    Fresh,
    Resumed,
}

/// Terminal report of one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub job_id: String,
    /// Items with status `completed`.
    pub completed: usize,
    /// Items with status `failed` and an exhausted retry budget.
    pub failed: usize,
    /// Items parked in `awaiting_agent` for an external supervisor.
    pub awaiting: usize,
    pub init: JobInit,
}

#[derive(Debug, Error, Diagnostic)]
pub enum RunnerError {
    #[error("failed to read input {}: {source}", .path.display())]
    #[diagnostic(code(batchloom::runner::input_io))]
    Input {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("input at {} is not valid JSON: {source}", .path.display())]
    #[diagnostic(code(batchloom::runner::input_parse))]
    InputParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("input must be a JSON array")]
    #[diagnostic(
        code(batchloom::runner::input_shape),
        help("The engine consumes an opaque JSON array; each element becomes one item.")
    )]
    InputShape,

    #[error(transparent)]
    #[diagnostic(code(batchloom::runner::checkpoint))]
    Checkpoint(#[from] CheckpointError),

    #[error("worker task join error: {0}")]
    #[diagnostic(code(batchloom::runner::join))]
    Join(#[from] JoinError),

    #[error("interrupt received; checkpoint flushed")]
    #[diagnostic(
        code(batchloom::runner::interrupted),
        help("Re-run the job to resume from the flushed checkpoint.")
    )]
    Interrupted,
}

type InterruptFuture = Pin<Box<dyn std::future::Future<Output = io::Result<()>> + Send>>;

/// Drives one job: loads or ingests the checkpoint, filters eligible items,
/// and fans worker invocations out through a [`JoinSet`] capped at the
/// configured concurrency. All checkpoint mutation happens on the driver;
/// workers communicate only through their [`Outcome`] and the context's log
/// queue.
pub struct JobRunner {
    config: RunConfig,
    store: CheckpointStore,
    event_bus: EventBus,
    log_tx: flume::Sender<crate::worker::ItemLog>,
    log_rx: flume::Receiver<crate::worker::ItemLog>,
    file_sink_attached: bool,
    event_stream_taken: bool,
}

impl JobRunner {
    /// Build a runner with the bus described by the config, listening
    /// immediately.
    #[must_use]
    pub fn new(config: RunConfig) -> Self {
        let bus = config.event_bus.build_event_bus();
        Self::with_bus(config, bus, true)
    }

    /// Build a runner around a custom event bus (streaming sinks, test
    /// capture). `start_listener` controls whether sink workers spawn now.
    #[must_use]
    pub fn with_bus(config: RunConfig, event_bus: EventBus, start_listener: bool) -> Self {
        if start_listener {
            event_bus.listen_for_events();
        }
        let store = CheckpointStore::new(config.checkpoint_path.clone());
        let (log_tx, log_rx) = flume::unbounded();
        Self {
            config,
            store,
            event_bus,
            log_tx,
            log_rx,
            file_sink_attached: false,
            event_stream_taken: false,
        }
    }

    /// Subscribe to the engine's event stream. May be called once per
    /// runner.
    pub fn event_stream(&mut self) -> EventStream {
        if self.event_stream_taken {
            panic!("event stream already requested for this runner");
        }
        self.event_stream_taken = true;
        self.event_bus.subscribe()
    }

    /// The checkpoint store this runner flushes through.
    #[must_use]
    pub fn store(&self) -> &CheckpointStore {
        &self.store
    }

    /// Execute one full run: process every eligible item to a
    /// terminal-for-this-run state, flushing the checkpoint after every
    /// transition.
    ///
    /// Worker failures are absorbed into item state and never abort the run;
    /// infrastructure failures (unreadable input, unwritable checkpoint) do.
    #[instrument(skip(self, worker), fields(checkpoint = %self.config.checkpoint_path.display()), err)]
    pub async fn run(&mut self, worker: Arc<dyn Worker>) -> Result<RunSummary, RunnerError> {
        let (mut checkpoint, init) = self.load_or_ingest()?;
        checkpoint.recount(self.config.max_retries);
        self.store.save(&checkpoint)?;
        self.attach_file_sink(&checkpoint.job_id);

        let emitter = self.event_bus.get_emitter();
        let index_of: FxHashMap<String, usize> = checkpoint
            .items
            .iter()
            .enumerate()
            .map(|(idx, item)| (item.id.clone(), idx))
            .collect();
        let mut queue: VecDeque<usize> = checkpoint
            .items
            .iter()
            .enumerate()
            .filter(|(_, item)| item.is_eligible(self.config.max_retries))
            .map(|(idx, _)| idx)
            .collect();

        let _ = emitter.emit(Event::diagnostic(
            "runner",
            format!(
                "job {}: dispatching {} of {} items (concurrency {})",
                checkpoint.job_id,
                queue.len(),
                checkpoint.items.len(),
                self.config.concurrency
            ),
        ));

        let invoker = Invoker::new(worker, self.config.item_timeout);
        let mut in_flight: JoinSet<(usize, Outcome)> = JoinSet::new();
        let mut interrupt: Option<InterruptFuture> = if self.config.trap_interrupt {
            Some(Box::pin(tokio::signal::ctrl_c()))
        } else {
            None
        };

        loop {
            while in_flight.len() < self.config.concurrency {
                let Some(idx) = queue.pop_front() else { break };
                self.begin_item(&mut checkpoint, idx)?;
                let item = &checkpoint.items[idx];
                let (cancel_tx, cancel_rx) = watch::channel(false);
                let ctx = WorkerCtx::new(
                    item.id.clone(),
                    self.event_bus.get_emitter(),
                    self.log_tx.clone(),
                    cancel_rx,
                );
                let data = item.data.clone();
                let task_invoker = invoker.clone();
                in_flight.spawn(async move {
                    let outcome = std::panic::AssertUnwindSafe(
                        task_invoker.invoke(data, ctx, cancel_tx),
                    )
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|_| Outcome::Fail("worker panicked".to_string()));
                    (idx, outcome)
                });
            }

            if in_flight.is_empty() {
                break;
            }

            let joined = match interrupt.as_mut() {
                Some(signal) => {
                    tokio::select! {
                        biased;
                        _ = signal => {
                            self.drain_worker_logs(&mut checkpoint, &index_of);
                            checkpoint.recount(self.config.max_retries);
                            self.store.save(&checkpoint)?;
                            let _ = emitter.emit(Event::error(
                                "runner",
                                "interrupt received; checkpoint flushed",
                            ));
                            return Err(RunnerError::Interrupted);
                        }
                        joined = in_flight.join_next() => joined,
                    }
                }
                None => in_flight.join_next().await,
            };

            let Some(joined) = joined else { continue };
            let (idx, outcome) = joined?;
            self.drain_worker_logs(&mut checkpoint, &index_of);
            self.apply_outcome(&mut checkpoint, idx, outcome)?;
        }

        self.drain_worker_logs(&mut checkpoint, &index_of);
        checkpoint.recount(self.config.max_retries);
        self.store.save(&checkpoint)?;

        let counts = checkpoint.counts(self.config.max_retries);
        let _ = emitter.emit(Event::diagnostic(
            "summary",
            format!(
                "job {} finished: {} completed, {} failed, {} awaiting agent",
                checkpoint.job_id, counts.completed, counts.failed, counts.awaiting
            ),
        ));
        if counts.awaiting > 0 {
            let _ = emitter.emit(Event::diagnostic(
                "bridge",
                format!(
                    "{} item(s) awaiting an external agent; fulfill pending prompts and re-run",
                    counts.awaiting
                ),
            ));
        }

        Ok(RunSummary {
            job_id: checkpoint.job_id,
            completed: counts.completed,
            failed: counts.failed,
            awaiting: counts.awaiting,
            init,
        })
    }

    fn load_or_ingest(&self) -> Result<(Checkpoint, JobInit), RunnerError> {
        if let Some(existing) = self.store.load()? {
            return Ok((existing, JobInit::Resumed));
        }
        let input = match &self.config.input {
            InputSource::Data(items) => items.clone(),
            InputSource::Path(path) => {
                let bytes = std::fs::read(path).map_err(|source| RunnerError::Input {
                    path: path.clone(),
                    source,
                })?;
                let value: Value =
                    serde_json::from_slice(&bytes).map_err(|source| RunnerError::InputParse {
                        path: path.clone(),
                        source,
                    })?;
                match value {
                    Value::Array(items) => items,
                    _ => return Err(RunnerError::InputShape),
                }
            }
        };
        Ok((Checkpoint::from_input(input), JobInit::Fresh))
    }

    fn attach_file_sink(&mut self, job_id: &str) {
        if self.file_sink_attached {
            return;
        }
        self.file_sink_attached = true;
        let path = self.config.log_path_for(job_id);
        match FileSink::create(&path) {
            Ok(sink) => self.event_bus.add_sink(sink),
            Err(err) => {
                // Logging must not abort the job; fall back to console only.
                let _ = self.event_bus.get_emitter().emit(Event::error(
                    "runner",
                    format!("could not open log file {}: {err}", path.display()),
                ));
            }
        }
    }

    /// Processing entry actions: clear any stale prompt, count the attempt,
    /// flush.
    fn begin_item(&self, checkpoint: &mut Checkpoint, idx: usize) -> Result<(), RunnerError> {
        let max_retries = self.config.max_retries;
        let item = &mut checkpoint.items[idx];
        debug_assert!(item.status.can_transition_to(ItemStatus::Processing));
        item.status = ItemStatus::Processing;
        item.pending_prompt = None;
        item.attempts += 1;
        let _ = self.event_bus.get_emitter().emit(Event::item(
            &item.id,
            format!("processing (attempt {}/{})", item.attempts, max_retries),
        ));
        checkpoint.recount(max_retries);
        self.store.save(checkpoint)?;
        Ok(())
    }

    /// Apply the outcome's entry actions, re-derive counters, flush.
    fn apply_outcome(
        &self,
        checkpoint: &mut Checkpoint,
        idx: usize,
        outcome: Outcome,
    ) -> Result<(), RunnerError> {
        let max_retries = self.config.max_retries;
        let emitter = self.event_bus.get_emitter();
        let item = &mut checkpoint.items[idx];
        match outcome {
            Outcome::Success(value) => {
                item.status = ItemStatus::Completed;
                item.output = Some(value);
                let _ = emitter.emit(Event::item(&item.id, "completed"));
            }
            Outcome::Suspend(prompt) => {
                item.status = ItemStatus::AwaitingAgent;
                item.pending_prompt = Some(prompt);
                // A suspension is not an attempt; roll the counter back.
                item.attempts = item.attempts.saturating_sub(1);
                let _ = emitter.emit(Event::item(&item.id, "suspended; awaiting external agent"));
            }
            Outcome::Fail(message) => {
                item.status = ItemStatus::Failed;
                item.last_error = Some(message.clone());
                let _ = emitter.emit(Event::item_error(
                    &item.id,
                    format!(
                        "failed (attempt {}/{}): {message}",
                        item.attempts, max_retries
                    ),
                ));
            }
        }
        checkpoint.recount(max_retries);
        self.store.save(checkpoint)?;
        Ok(())
    }

    /// Move queued worker-context log lines onto their items, so the next
    /// flush persists them.
    fn drain_worker_logs(&self, checkpoint: &mut Checkpoint, index_of: &FxHashMap<String, usize>) {
        while let Ok(log) = self.log_rx.try_recv() {
            if let Some(&idx) = index_of.get(&log.item_id) {
                checkpoint.items[idx].logs.push(log.line);
            }
        }
    }
}
