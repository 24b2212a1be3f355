use std::any::type_name;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Result as IoResult, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex as ParkingMutex;

use super::event::{Event, Severity};
use crate::telemetry::{PlainFormatter, TelemetryFormatter};

/// Abstraction over an output target that consumes full Event objects.
pub trait EventSink: Sync + Send {
    /// Handle a structured event. The sink decides how to serialize and
    /// where to write it.
    ///
    /// Errors are reported by the bus and swallowed: a broken sink never
    /// aborts the job.
    fn handle(&mut self, event: &Event) -> IoResult<()>;

    /// A stable, human-friendly identifier for this sink instance.
    fn name(&self) -> String {
        type_name::<Self>().to_string()
    }
}

/// Console sink: info lines to stdout, error lines mirrored to stderr.
pub struct ConsoleSink<F: TelemetryFormatter = PlainFormatter> {
    formatter: F,
}

impl Default for ConsoleSink {
    fn default() -> Self {
        Self {
            formatter: PlainFormatter,
        }
    }
}

impl<F: TelemetryFormatter> ConsoleSink<F> {
    pub fn with_formatter(formatter: F) -> Self {
        Self { formatter }
    }
}

impl<F: TelemetryFormatter> EventSink for ConsoleSink<F> {
    fn handle(&mut self, event: &Event) -> IoResult<()> {
        let rendered = self.formatter.render_event(event);
        match event.severity() {
            Severity::Info => {
                let mut out = io::stdout();
                out.write_all(rendered.as_bytes())?;
                out.flush()
            }
            Severity::Error => {
                let mut err = io::stderr();
                err.write_all(rendered.as_bytes())?;
                err.flush()
            }
        }
    }
}

/// Append-only per-job log file sink.
///
/// One line per event, `[<ISO-8601>] <message>` with an `[ERROR]` prefix on
/// error lines. The parent directory is created if missing.
pub struct FileSink {
    writer: BufWriter<File>,
    formatter: PlainFormatter,
    path: PathBuf,
}

impl FileSink {
    pub fn create(path: impl AsRef<Path>) -> IoResult<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            writer: BufWriter::new(file),
            formatter: PlainFormatter,
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl EventSink for FileSink {
    fn handle(&mut self, event: &Event) -> IoResult<()> {
        let rendered = self.formatter.render_event(event);
        self.writer.write_all(rendered.as_bytes())?;
        self.writer.flush()
    }

    fn name(&self) -> String {
        format!("FileSink({})", self.path.display())
    }
}

/// In-memory sink for testing and snapshots.
#[derive(Clone, Default)]
pub struct MemorySink {
    entries: Arc<ParkingMutex<Vec<Event>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a snapshot of all captured events. Clones the internal buffer so
    /// callers can inspect state without holding the mutex.
    pub fn snapshot(&self) -> Vec<Event> {
        self.entries.lock().clone()
    }

    /// Clear all captured events.
    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

impl EventSink for MemorySink {
    fn handle(&mut self, event: &Event) -> IoResult<()> {
        self.entries.lock().push(event.clone());
        Ok(())
    }
}

/// Forwards events into a flume channel for embedder-side streaming.
pub struct ChannelSink {
    sender: flume::Sender<Event>,
}

impl ChannelSink {
    pub fn new(sender: flume::Sender<Event>) -> Self {
        Self { sender }
    }
}

impl EventSink for ChannelSink {
    fn handle(&mut self, event: &Event) -> IoResult<()> {
        self.sender
            .send(event.clone())
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "event channel disconnected"))
    }
}
