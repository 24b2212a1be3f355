//! The supervisor side of the suspension bridge.
//!
//! Workers park items in `awaiting_agent` with a prompt payload; the engine
//! never fulfills them itself. Between runs, a supervising agent uses
//! [`SuspensionBridge`] to read the pending prompts out of the checkpoint
//! and either inject an output directly or send the item back through the
//! queue with rewritten data. The next run's eligibility filter does the
//! rest: fulfilled items are skipped, reprocessed items run again.

use std::path::{Path, PathBuf};

use miette::Diagnostic;
use serde_json::Value;
use thiserror::Error;

use crate::item::ItemStatus;
use crate::runtime::checkpoint::{Checkpoint, CheckpointError, CheckpointStore};

/// One suspended item's request for an external brain.
#[derive(Clone, Debug, PartialEq)]
pub struct PendingPrompt {
    pub item_id: String,
    /// The payload the worker supplied when it suspended; conventionally a
    /// list of chat messages.
    pub prompt: Value,
}

#[derive(Debug, Error, Diagnostic)]
pub enum BridgeError {
    #[error(transparent)]
    #[diagnostic(code(batchloom::bridge::checkpoint))]
    Checkpoint(#[from] CheckpointError),

    #[error("no checkpoint at {}", .path.display())]
    #[diagnostic(
        code(batchloom::bridge::missing),
        help("Run the job at least once before fulfilling prompts.")
    )]
    Missing { path: PathBuf },

    #[error("unknown item: {item_id}")]
    #[diagnostic(code(batchloom::bridge::unknown_item))]
    UnknownItem { item_id: String },

    #[error("item {item_id} is not awaiting an agent (status: {status})")]
    #[diagnostic(
        code(batchloom::bridge::not_awaiting),
        help("Only items in `awaiting_agent` can be fulfilled or reprocessed through the bridge.")
    )]
    NotAwaiting {
        item_id: String,
        status: ItemStatus,
    },
}

/// Supervisor-side handle over a job's checkpoint file.
pub struct SuspensionBridge {
    store: CheckpointStore,
    max_retries: u32,
}

impl SuspensionBridge {
    /// Open a bridge assuming the runner's default retry budget of 3.
    ///
    /// Aggregate counters are re-derived with [`Checkpoint::recount`] on
    /// every save, the same way the runner flushes them; when the job was
    /// configured with a different budget, set it via
    /// [`with_max_retries`](Self::with_max_retries) so the re-derivation
    /// matches the run's.
    pub fn open(checkpoint_path: impl Into<PathBuf>) -> Self {
        Self {
            store: CheckpointStore::new(checkpoint_path),
            max_retries: 3,
        }
    }

    #[must_use]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        self.store.path()
    }

    /// Every item currently waiting on an external agent, in input order.
    pub fn pending(&self) -> Result<Vec<PendingPrompt>, BridgeError> {
        let checkpoint = self.load_required()?;
        Ok(checkpoint
            .items
            .iter()
            .filter(|item| item.status == ItemStatus::AwaitingAgent)
            .map(|item| PendingPrompt {
                item_id: item.id.clone(),
                prompt: item.pending_prompt.clone().unwrap_or(Value::Null),
            })
            .collect())
    }

    /// Answer a suspended item directly: inject `output`, mark it completed,
    /// and save. The next run skips it.
    pub fn fulfill(&self, item_id: &str, output: Value) -> Result<(), BridgeError> {
        let mut checkpoint = self.load_required()?;
        let idx = self.awaiting_index(&checkpoint, item_id)?;
        let item = &mut checkpoint.items[idx];
        item.output = Some(output);
        item.status = ItemStatus::Completed;
        item.pending_prompt = None;
        checkpoint.recount(self.max_retries);
        self.store.save(&checkpoint)?;
        Ok(())
    }

    /// Send a suspended item back through the queue: optionally rewrite its
    /// data, reset it to pending, and save. The next run processes it again.
    pub fn reprocess(&self, item_id: &str, new_data: Option<Value>) -> Result<(), BridgeError> {
        let mut checkpoint = self.load_required()?;
        let idx = self.awaiting_index(&checkpoint, item_id)?;
        let item = &mut checkpoint.items[idx];
        if let Some(data) = new_data {
            item.data = data;
        }
        item.status = ItemStatus::Pending;
        item.pending_prompt = None;
        checkpoint.recount(self.max_retries);
        self.store.save(&checkpoint)?;
        Ok(())
    }

    fn load_required(&self) -> Result<Checkpoint, BridgeError> {
        self.store.load()?.ok_or_else(|| BridgeError::Missing {
            path: self.store.path().to_path_buf(),
        })
    }

    fn awaiting_index(
        &self,
        checkpoint: &Checkpoint,
        item_id: &str,
    ) -> Result<usize, BridgeError> {
        let idx = checkpoint
            .index_of(item_id)
            .ok_or_else(|| BridgeError::UnknownItem {
                item_id: item_id.to_string(),
            })?;
        let status = checkpoint.items[idx].status;
        if status != ItemStatus::AwaitingAgent {
            return Err(BridgeError::NotAwaiting {
                item_id: item_id.to_string(),
                status,
            });
        }
        Ok(idx)
    }
}
