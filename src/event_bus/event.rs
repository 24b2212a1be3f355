use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Severity of an engine log line. Errors mirror to standard error and get
/// an `[ERROR]` prefix in rendered output.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Error,
}

/// A structured engine log event.
///
/// Two shapes: item-scoped lines (worker progress, transitions) and
/// job-scoped diagnostics (run start, summary, infrastructure warnings).
/// Sinks decide how to render and where to write; see
/// [`crate::telemetry::PlainFormatter`] for the canonical line format.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub enum Event {
    Item(ItemEvent),
    Diagnostic(DiagnosticEvent),
}

impl Event {
    pub fn item(item_id: impl Into<String>, message: impl Into<String>) -> Self {
        Event::Item(ItemEvent::new(item_id.into(), Severity::Info, message.into(), vec![]))
    }

    pub fn item_error(item_id: impl Into<String>, message: impl Into<String>) -> Self {
        Event::Item(ItemEvent::new(item_id.into(), Severity::Error, message.into(), vec![]))
    }

    pub fn diagnostic(scope: impl Into<String>, message: impl Into<String>) -> Self {
        Event::Diagnostic(DiagnosticEvent::new(
            scope.into(),
            Severity::Info,
            message.into(),
            vec![],
        ))
    }

    /// Diagnostic with positional detail values, rendered in compact JSON
    /// form after the message.
    pub fn diagnostic_with(
        scope: impl Into<String>,
        message: impl Into<String>,
        details: Vec<Value>,
    ) -> Self {
        Event::Diagnostic(DiagnosticEvent::new(
            scope.into(),
            Severity::Info,
            message.into(),
            details,
        ))
    }

    pub fn error(scope: impl Into<String>, message: impl Into<String>) -> Self {
        Event::Diagnostic(DiagnosticEvent::new(
            scope.into(),
            Severity::Error,
            message.into(),
            vec![],
        ))
    }

    pub fn severity(&self) -> Severity {
        match self {
            Event::Item(item) => item.severity,
            Event::Diagnostic(diag) => diag.severity,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Event::Item(item) => &item.message,
            Event::Diagnostic(diag) => &diag.message,
        }
    }

    /// The item id for item events, the scope for diagnostics.
    pub fn scope_label(&self) -> &str {
        match self {
            Event::Item(item) => &item.item_id,
            Event::Diagnostic(diag) => &diag.scope,
        }
    }

    pub fn when(&self) -> DateTime<Utc> {
        match self {
            Event::Item(item) => item.when,
            Event::Diagnostic(diag) => diag.when,
        }
    }

    fn details(&self) -> &[Value] {
        match self {
            Event::Item(item) => &item.details,
            Event::Diagnostic(diag) => &diag.details,
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::Item(item) => write!(f, "[{}] {}", item.item_id, item.message)?,
            Event::Diagnostic(diag) => write!(f, "{}", diag.message)?,
        }
        for detail in self.details() {
            write!(f, " {detail}")?;
        }
        Ok(())
    }
}

/// Item-scoped log line, carrying the owning item's id.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ItemEvent {
    pub item_id: String,
    pub severity: Severity,
    pub message: String,
    #[serde(default)]
    pub details: Vec<Value>,
    pub when: DateTime<Utc>,
}

impl ItemEvent {
    pub fn new(item_id: String, severity: Severity, message: String, details: Vec<Value>) -> Self {
        Self {
            item_id,
            severity,
            message,
            details,
            when: Utc::now(),
        }
    }
}

/// Job-scoped log line with a free-form scope label.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct DiagnosticEvent {
    pub scope: String,
    pub severity: Severity,
    pub message: String,
    #[serde(default)]
    pub details: Vec<Value>,
    pub when: DateTime<Utc>,
}

impl DiagnosticEvent {
    pub fn new(scope: String, severity: Severity, message: String, details: Vec<Value>) -> Self {
        Self {
            scope,
            severity,
            message,
            details,
            when: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn display_prefixes_item_id() {
        let event = Event::item("item-3", "scraping page");
        assert_eq!(event.to_string(), "[item-3] scraping page");
    }

    #[test]
    fn display_appends_details_compactly() {
        let event =
            Event::diagnostic_with("summary", "run finished", vec![json!({"completed": 2})]);
        assert_eq!(event.to_string(), "run finished {\"completed\":2}");
    }

    #[test]
    fn severity_accessor() {
        assert_eq!(Event::item("item-0", "x").severity(), Severity::Info);
        assert_eq!(Event::item_error("item-0", "x").severity(), Severity::Error);
        assert_eq!(Event::error("runner", "x").severity(), Severity::Error);
    }
}
