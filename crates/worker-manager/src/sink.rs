//! Observability sink for per-task events
//!
//! Workers report timeouts, handler failures and timeout-callback failures
//! through an injected [`EventSink`] rather than a global logger.
//!
//! - [`TracingSink`] forwards to `tracing` (the default)
//! - [`RecordingSink`] keeps records in memory for tests

use parking_lot::Mutex;

/// Receiver of per-task log records
pub trait EventSink: Send + Sync {
    /// Record a warning (timeouts, timeout-callback failures)
    fn warn(&self, message: &str);

    /// Record an error (handler failures)
    fn error(&self, message: &str);
}

/// Sink that forwards records to `tracing`
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn warn(&self, message: &str) {
        tracing::warn!("{}", message);
    }

    fn error(&self, message: &str) {
        tracing::error!("{}", message);
    }
}

/// Severity of a recorded event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventLevel {
    Warn,
    Error,
}

/// A record captured by [`RecordingSink`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedEvent {
    pub level: EventLevel,
    pub message: String,
}

/// In-memory sink for tests
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<RecordedEvent>>,
}

impl RecordingSink {
    /// Create an empty sink
    pub fn new() -> Self {
        Self::default()
    }

    /// All records so far, in arrival order
    pub fn events(&self) -> Vec<RecordedEvent> {
        self.events.lock().clone()
    }

    /// Messages recorded at `level`
    pub fn messages(&self, level: EventLevel) -> Vec<String> {
        self.events
            .lock()
            .iter()
            .filter(|event| event.level == level)
            .map(|event| event.message.clone())
            .collect()
    }

    fn record(&self, level: EventLevel, message: &str) {
        self.events.lock().push(RecordedEvent {
            level,
            message: message.to_string(),
        });
    }
}

impl EventSink for RecordingSink {
    fn warn(&self, message: &str) {
        self.record(EventLevel::Warn, message);
    }

    fn error(&self, message: &str) {
        self.record(EventLevel::Error, message);
    }
}
