//! Event sinks.

use parking_lot::Mutex;

use crate::application::ports::{EventSink, LogEvent, Severity};

/// Forwards events to `tracing`.
///
/// `Success` has no tracing level of its own; it is logged at INFO with
/// `outcome = "success"`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn emit(&self, event: LogEvent) {
        let context = event
            .context
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(" ");

        match event.severity {
            Severity::Info => tracing::info!(context = %context, "{}", event.message),
            Severity::Success => {
                tracing::info!(outcome = "success", context = %context, "{}", event.message);
            }
            Severity::Warning => tracing::warn!(context = %context, "{}", event.message),
            Severity::Error => tracing::error!(context = %context, "{}", event.message),
        }
    }
}

/// Keeps every event for later inspection.
#[derive(Debug, Default)]
pub struct RecordingEventSink {
    events: Mutex<Vec<LogEvent>>,
}

impl RecordingEventSink {
    /// Create an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every event so far.
    pub fn events(&self) -> Vec<LogEvent> {
        self.events.lock().clone()
    }

    /// Events with the given severity.
    pub fn with_severity(&self, severity: Severity) -> Vec<LogEvent> {
        self.events
            .lock()
            .iter()
            .filter(|e| e.severity == severity)
            .cloned()
            .collect()
    }

    /// Whether any event carries `message`.
    pub fn contains(&self, message: &str) -> bool {
        self.events.lock().iter().any(|e| e.message == message)
    }
}

impl EventSink for RecordingEventSink {
    fn emit(&self, event: LogEvent) {
        self.events.lock().push(event);
    }
}
