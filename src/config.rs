//! Run configuration: the job's input source, checkpoint location, retry and
//! concurrency knobs, and event-bus wiring.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde_json::Value;

use crate::event_bus::{ConsoleSink, EventBus, EventSink, MemorySink};

/// Where the input items come from. Exactly one source per run: a JSON-array
/// file on disk, or inline data from the embedding application.
#[derive(Clone, Debug)]
pub enum InputSource {
    Path(PathBuf),
    Data(Vec<Value>),
}

/// Read-only configuration for one job.
///
/// Defaults: `concurrency = 1`, `max_retries = 3`, no per-item timeout,
/// interrupt trapping on, console-only event bus, log directory beside the
/// checkpoint file (overridable via the `BATCHLOOM_LOG_DIR` environment
/// variable).
#[derive(Clone, Debug)]
pub struct RunConfig {
    pub input: InputSource,
    pub checkpoint_path: PathBuf,
    /// Upper bound on concurrently in-flight worker invocations.
    pub concurrency: usize,
    /// Total invocations an item may consume before it is terminally failed.
    pub max_retries: u32,
    /// Per-item timeout; `None` disables the race entirely.
    pub item_timeout: Option<Duration>,
    /// Directory for per-job log files; `None` means `logs/` beside the
    /// checkpoint.
    pub log_dir: Option<PathBuf>,
    pub event_bus: EventBusConfig,
    /// Trap ctrl-c to flush one final checkpoint before returning.
    pub trap_interrupt: bool,
}

impl RunConfig {
    /// Configure a run over a JSON-array input file.
    pub fn from_path(input: impl Into<PathBuf>, checkpoint: impl Into<PathBuf>) -> Self {
        Self::with_input(InputSource::Path(input.into()), checkpoint.into())
    }

    /// Configure a run over inline input data.
    pub fn from_data(items: Vec<Value>, checkpoint: impl Into<PathBuf>) -> Self {
        Self::with_input(InputSource::Data(items), checkpoint.into())
    }

    fn with_input(input: InputSource, checkpoint_path: PathBuf) -> Self {
        Self {
            input,
            checkpoint_path,
            concurrency: 1,
            max_retries: 3,
            item_timeout: None,
            log_dir: Self::resolve_log_dir(),
            event_bus: EventBusConfig::default(),
            trap_interrupt: true,
        }
    }

    fn resolve_log_dir() -> Option<PathBuf> {
        dotenvy::dotenv().ok();
        std::env::var("BATCHLOOM_LOG_DIR").ok().map(PathBuf::from)
    }

    /// Bound on in-flight invocations; clamped to at least 1.
    #[must_use]
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    #[must_use]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Per-item timeout. A zero duration disables the timeout, matching the
    /// "absent or zero" configuration contract.
    #[must_use]
    pub fn with_item_timeout(mut self, timeout: Duration) -> Self {
        self.item_timeout = (!timeout.is_zero()).then_some(timeout);
        self
    }

    #[must_use]
    pub fn with_log_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.log_dir = Some(dir.into());
        self
    }

    #[must_use]
    pub fn with_event_bus(mut self, event_bus: EventBusConfig) -> Self {
        self.event_bus = event_bus;
        self
    }

    #[must_use]
    pub fn with_memory_event_bus(self) -> Self {
        self.with_event_bus(EventBusConfig::with_memory_sink())
    }

    /// Disable ctrl-c trapping (tests, embedders with their own handling).
    #[must_use]
    pub fn without_interrupt_trap(mut self) -> Self {
        self.trap_interrupt = false;
        self
    }

    /// The per-job log file path for `job_id`.
    pub(crate) fn log_path_for(&self, job_id: &str) -> PathBuf {
        let dir = self.log_dir.clone().unwrap_or_else(|| {
            self.checkpoint_path
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_default()
                .join("logs")
        });
        dir.join(format!("{job_id}.log"))
    }
}

/// Declarative sink selection for the default event bus.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SinkConfig {
    Console,
    Memory,
}

#[derive(Clone, Debug)]
pub struct EventBusConfig {
    pub buffer_capacity: usize,
    pub sinks: Vec<SinkConfig>,
}

impl EventBusConfig {
    pub const DEFAULT_BUFFER_CAPACITY: usize = 1024;

    #[must_use]
    pub fn new(buffer_capacity: usize, sinks: Vec<SinkConfig>) -> Self {
        Self {
            buffer_capacity: if buffer_capacity == 0 {
                Self::DEFAULT_BUFFER_CAPACITY
            } else {
                buffer_capacity
            },
            sinks,
        }
    }

    #[must_use]
    pub fn with_console_only() -> Self {
        Self::new(Self::DEFAULT_BUFFER_CAPACITY, vec![SinkConfig::Console])
    }

    #[must_use]
    pub fn with_memory_sink() -> Self {
        Self::new(
            Self::DEFAULT_BUFFER_CAPACITY,
            vec![SinkConfig::Console, SinkConfig::Memory],
        )
    }

    #[must_use]
    pub fn add_sink(mut self, sink: SinkConfig) -> Self {
        if !self.sinks.contains(&sink) {
            self.sinks.push(sink);
        }
        self
    }

    /// Materialize the configured bus. The per-job file sink is attached
    /// later by the runner, once the job id is known.
    #[must_use]
    pub fn build_event_bus(&self) -> EventBus {
        let sinks: Vec<Box<dyn EventSink>> = self
            .sinks
            .iter()
            .map(|sink| match sink {
                SinkConfig::Console => Box::new(ConsoleSink::default()) as Box<dyn EventSink>,
                SinkConfig::Memory => Box::new(MemorySink::new()) as Box<dyn EventSink>,
            })
            .collect();
        EventBus::with_capacity(sinks, self.buffer_capacity)
    }
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self::with_console_only()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn defaults_match_contract() {
        let config = RunConfig::from_data(vec![json!(1)], "cp.json");
        assert_eq!(config.concurrency, 1);
        assert_eq!(config.max_retries, 3);
        assert!(config.item_timeout.is_none());
        assert!(config.trap_interrupt);
    }

    #[test]
    fn zero_timeout_means_no_timeout() {
        let config = RunConfig::from_data(vec![], "cp.json")
            .with_item_timeout(Duration::from_millis(0));
        assert!(config.item_timeout.is_none());
    }

    #[test]
    fn concurrency_clamps_to_one() {
        let config = RunConfig::from_data(vec![], "cp.json").with_concurrency(0);
        assert_eq!(config.concurrency, 1);
    }

    #[test]
    fn log_path_sits_beside_the_checkpoint() {
        let mut config = RunConfig::from_data(vec![], "state/cp.json");
        config.log_dir = None;
        let path = config.log_path_for("job-17");
        assert_eq!(path, PathBuf::from("state/logs/job-17.log"));
    }
}
