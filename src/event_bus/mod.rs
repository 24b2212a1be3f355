//! Structured engine logging: broadcast hub, bus, and pluggable sinks.
//!
//! Every engine log line is an [`Event`] published through the [`EventBus`].
//! Sinks render events to the console (info to stdout, errors mirrored to
//! stderr), to the per-job log file, into memory for tests, or into a flume
//! channel for embedders. Sink failures are reported and swallowed; a broken
//! log target never aborts a job.

pub mod bus;
pub mod emitter;
pub mod event;
pub mod hub;
pub mod sink;

pub use bus::EventBus;
pub use emitter::{EmitterError, EventEmitter};
pub use event::{DiagnosticEvent, Event, ItemEvent, Severity};
pub use hub::{EventHub, EventStream, HubEmitter};
pub use sink::{ChannelSink, ConsoleSink, EventSink, FileSink, MemorySink};
