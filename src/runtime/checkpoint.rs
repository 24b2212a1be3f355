//! Durable whole-job state: the checkpoint shape and its file store.
//!
//! The checkpoint is the single source of truth across crashes. The store
//! writes it with a sibling-tempfile-plus-rename so an observer sees either
//! the pre-write file or the complete post-write file, never partial JSON.
//! The store is not re-entrant; the runner serializes every save.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::Utc;
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::item::{Item, ItemStatus};

/// Durable snapshot of an entire job.
///
/// Wire form is camelCase JSON: `jobId`, `startTime`, `items`,
/// `completedCount`, `failedCount`. Unknown top-level fields survive a
/// round-trip through `rest`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Checkpoint {
    /// Assigned once at creation: `job-<unix-millis>`.
    pub job_id: String,
    /// RFC3339 creation time; stable across all subsequent saves.
    pub start_time: String,
    /// All items, in original input order. Never removed, never reordered.
    pub items: Vec<Item>,
    #[serde(default)]
    pub completed_count: u32,
    #[serde(default)]
    pub failed_count: u32,
    #[serde(flatten)]
    pub rest: Map<String, Value>,
}

/// The three run-level counters reported in the termination summary.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct JobCounts {
    pub completed: usize,
    pub failed: usize,
    pub awaiting: usize,
}

impl Checkpoint {
    /// Initialize a fresh checkpoint from an ingested input array. Each
    /// element becomes one pending item at its input ordinal.
    #[must_use]
    pub fn from_input(input: Vec<Value>) -> Self {
        let now = Utc::now();
        Self {
            job_id: format!("job-{}", now.timestamp_millis()),
            start_time: now.to_rfc3339(),
            items: input
                .into_iter()
                .enumerate()
                .map(|(ordinal, data)| Item::new(ordinal, data))
                .collect(),
            completed_count: 0,
            failed_count: 0,
            rest: Map::new(),
        }
    }

    /// Re-derive both aggregate counters from the item list.
    ///
    /// `completedCount` counts completed items; `failedCount` counts failed
    /// items whose retry budget is spent. Called before every flush, so the
    /// persisted counters always agree with the persisted items.
    pub fn recount(&mut self, max_retries: u32) {
        self.completed_count = self
            .items
            .iter()
            .filter(|i| i.status == ItemStatus::Completed)
            .count() as u32;
        self.failed_count = self
            .items
            .iter()
            .filter(|i| i.status == ItemStatus::Failed && i.attempts >= max_retries)
            .count() as u32;
    }

    /// Current completed / terminally-failed / awaiting tallies.
    #[must_use]
    pub fn counts(&self, max_retries: u32) -> JobCounts {
        let mut counts = JobCounts {
            completed: 0,
            failed: 0,
            awaiting: 0,
        };
        for item in &self.items {
            match item.status {
                ItemStatus::Completed => counts.completed += 1,
                ItemStatus::Failed if item.attempts >= max_retries => counts.failed += 1,
                ItemStatus::AwaitingAgent => counts.awaiting += 1,
                _ => {}
            }
        }
        counts
    }

    /// Index of the item with the given id, if present.
    #[must_use]
    pub fn index_of(&self, item_id: &str) -> Option<usize> {
        self.items.iter().position(|i| i.id == item_id)
    }
}

#[derive(Debug, Error, Diagnostic)]
pub enum CheckpointError {
    #[error("checkpoint I/O failed at {}: {source}", .path.display())]
    #[diagnostic(
        code(batchloom::checkpoint::io),
        help("Check permissions and free space for the checkpoint path.")
    )]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("checkpoint JSON invalid at {}: {source}", .path.display())]
    #[diagnostic(
        code(batchloom::checkpoint::serde),
        help("The file is not a valid checkpoint; move it aside to start fresh.")
    )]
    Serde {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

pub type Result<T> = std::result::Result<T, CheckpointError>;

/// File-backed checkpoint store.
///
/// Concurrent engine instances targeting the same path are unsupported;
/// there is no advisory lock. Run one engine per checkpoint file.
#[derive(Clone, Debug)]
pub struct CheckpointStore {
    path: PathBuf,
}

impl CheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the checkpoint, or `None` if the file does not exist yet.
    ///
    /// A file that exists but fails to parse is an infrastructure error, not
    /// a fresh start; the caller must abort rather than overwrite it.
    pub fn load(&self) -> Result<Option<Checkpoint>> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(CheckpointError::Io {
                    path: self.path.clone(),
                    source,
                });
            }
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|source| CheckpointError::Serde {
                path: self.path.clone(),
                source,
            })
    }

    /// Persist the full checkpoint atomically.
    ///
    /// Serializes to a sibling `<path>.tmp` and renames over the target, so
    /// the rename stays within one filesystem. Parent directories are
    /// created on demand.
    pub fn save(&self, checkpoint: &Checkpoint) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|source| CheckpointError::Io {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }
        let json =
            serde_json::to_vec_pretty(checkpoint).map_err(|source| CheckpointError::Serde {
                path: self.path.clone(),
                source,
            })?;
        let tmp = self.tmp_path();
        fs::write(&tmp, &json).map_err(|source| CheckpointError::Io {
            path: tmp.clone(),
            source,
        })?;
        fs::rename(&tmp, &self.path).map_err(|source| CheckpointError::Io {
            path: self.path.clone(),
            source,
        })?;
        Ok(())
    }

    fn tmp_path(&self) -> PathBuf {
        let mut os = self.path.as_os_str().to_os_string();
        os.push(".tmp");
        PathBuf::from(os)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn ingest_assigns_ordinal_ids() {
        let cp = Checkpoint::from_input(vec![json!({"x": 1}), json!({"x": 2})]);
        assert!(cp.job_id.starts_with("job-"));
        assert_eq!(cp.items.len(), 2);
        assert_eq!(cp.items[0].id, "item-0");
        assert_eq!(cp.items[1].id, "item-1");
        assert_eq!(cp.items[1].status, ItemStatus::Pending);
        assert_eq!(cp.completed_count, 0);
    }

    #[test]
    fn recount_enforces_the_budget_rule() {
        let mut cp = Checkpoint::from_input(vec![json!(1), json!(2), json!(3)]);
        cp.items[0].status = ItemStatus::Completed;
        cp.items[1].status = ItemStatus::Failed;
        cp.items[1].attempts = 3;
        cp.items[2].status = ItemStatus::Failed;
        cp.items[2].attempts = 1;

        cp.recount(3);
        assert_eq!(cp.completed_count, 1);
        // Failed under budget does not count as terminally failed.
        assert_eq!(cp.failed_count, 1);

        let counts = cp.counts(3);
        assert_eq!(counts.completed, 1);
        assert_eq!(counts.failed, 1);
        assert_eq!(counts.awaiting, 0);
    }
}
