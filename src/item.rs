//! Per-item execution state: the unit of work and its status lifecycle.
//!
//! An [`Item`] is one element of the input sequence plus the metadata the
//! engine accumulates while driving it: status, attempt counter, last error,
//! pending agent prompt, output, and a durable log. Items are created once at
//! ingest and mutated only by the runner; the legal mutations are encoded in
//! [`ItemStatus::can_transition_to`].

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Lifecycle status of a single item.
///
/// Wire form is snake_case (`pending`, `processing`, `completed`, `failed`,
/// `awaiting_agent`) to match the checkpoint file format.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    /// Waiting to be dispatched for the first time.
    Pending,
    /// A worker invocation is (or was, before a crash) in flight.
    Processing,
    /// The worker returned a value; the item carries an `output`.
    Completed,
    /// The worker errored or timed out; terminal once the retry budget is
    /// exhausted, otherwise eligible again on a later run.
    Failed,
    /// The worker delegated this item to an external agent; the item carries
    /// a `pending_prompt` for a supervisor to fulfill between runs.
    AwaitingAgent,
}

impl ItemStatus {
    /// Whether the state machine permits moving from `self` to `next`.
    ///
    /// `Processing -> Processing` is permitted: a crash can strand an item in
    /// `processing`, and the next run re-dispatches it. Budget checks
    /// (`attempts` vs. the retry limit) are eligibility concerns, not
    /// transition-table concerns.
    #[must_use]
    pub fn can_transition_to(self, next: ItemStatus) -> bool {
        use ItemStatus::*;
        matches!(
            (self, next),
            (Pending, Processing)
                | (Failed, Processing)
                | (Processing, Processing)
                | (Processing, Completed)
                | (Processing, Failed)
                | (Processing, AwaitingAgent)
        )
    }
}

impl fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemStatus::Pending => write!(f, "pending"),
            ItemStatus::Processing => write!(f, "processing"),
            ItemStatus::Completed => write!(f, "completed"),
            ItemStatus::Failed => write!(f, "failed"),
            ItemStatus::AwaitingAgent => write!(f, "awaiting_agent"),
        }
    }
}

/// One unit of work plus its execution metadata.
///
/// Serialized camelCase into the checkpoint file. Fields this version does
/// not know about are preserved through `rest` so a newer writer's
/// checkpoint survives a round-trip through an older engine.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    /// Stable identifier, `item-<ordinal>` from the input position.
    pub id: String,
    /// Opaque payload, preserved verbatim across restarts.
    pub data: Value,
    pub status: ItemStatus,
    /// Completed or errored worker invocations; a suspension is not an
    /// attempt.
    #[serde(default)]
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    /// Payload supplied by the worker when it signaled suspension; consumed
    /// by an external agent via the suspension bridge.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_prompt: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    /// Worker-context log lines, in append order; survives restarts.
    #[serde(default)]
    pub logs: Vec<String>,
    #[serde(flatten)]
    pub rest: Map<String, Value>,
}

impl Item {
    /// Create a fresh item at its ingest position.
    #[must_use]
    pub fn new(ordinal: usize, data: Value) -> Self {
        Self {
            id: format!("item-{ordinal}"),
            data,
            status: ItemStatus::Pending,
            attempts: 0,
            last_error: None,
            pending_prompt: None,
            output: None,
            logs: Vec::new(),
            rest: Map::new(),
        }
    }

    /// Whether a run starting now would dispatch this item.
    ///
    /// Completed and awaiting items are skipped, as is a failed item whose
    /// retry budget is spent. Pending items, items stranded in `processing`
    /// by a crash, and failed-under-budget items are all eligible.
    #[must_use]
    pub fn is_eligible(&self, max_retries: u32) -> bool {
        match self.status {
            ItemStatus::Completed | ItemStatus::AwaitingAgent => false,
            ItemStatus::Failed => self.attempts < max_retries,
            ItemStatus::Pending | ItemStatus::Processing => true,
        }
    }

    /// Whether this item has reached a state the current run will not touch.
    #[must_use]
    pub fn is_terminal_for_run(&self, max_retries: u32) -> bool {
        !self.is_eligible(max_retries)
    }
}
