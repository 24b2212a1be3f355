//! Line rendering for log sinks plus a `tracing` subscriber bootstrap.

use chrono::SecondsFormat;

use crate::event_bus::{Event, Severity};

/// Renders an event into the final sink-ready form.
pub trait TelemetryFormatter: Send + Sync {
    /// Render one event as a complete line, newline included.
    fn render_event(&self, event: &Event) -> String;
}

/// Canonical plain-text line format:
/// `[<ISO-8601>] <message> <args...>`, with `[ERROR]` after the timestamp on
/// error lines and an `[item-id]` prefix on item-scoped messages.
pub struct PlainFormatter;

impl TelemetryFormatter for PlainFormatter {
    fn render_event(&self, event: &Event) -> String {
        let stamp = event.when().to_rfc3339_opts(SecondsFormat::Millis, true);
        match event.severity() {
            Severity::Info => format!("[{stamp}] {event}\n"),
            Severity::Error => format!("[{stamp}] [ERROR] {event}\n"),
        }
    }
}

/// Install a global `tracing` subscriber honoring `RUST_LOG`, defaulting to
/// `info`. Safe to call more than once; later calls are no-ops.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_lines_carry_the_prefix() {
        let line = PlainFormatter.render_event(&Event::error("runner", "save failed"));
        assert!(line.starts_with('['));
        assert!(line.contains("] [ERROR] save failed"));
        assert!(line.ends_with('\n'));
    }

    #[test]
    fn info_lines_are_timestamp_then_message() {
        let line = PlainFormatter.render_event(&Event::item("item-2", "working"));
        assert!(!line.contains("[ERROR]"));
        assert!(line.contains("] [item-2] working"));
    }
}
