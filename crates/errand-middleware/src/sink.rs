//! [`ReportSink`] – where operator-facing messages end up.
//!
//! The executor calls [`ReportSink::show_message`] for every execution
//! outcome and every flushed batch of world updates.  Sinks are synchronous
//! and must not block for long; they are invoked from the executor loop.

use std::sync::{Arc, Mutex, PoisonError};

use errand_types::{EventPayload, Severity};
use tracing::{error, info, warn};

use crate::bus::{EventBus, Topic};

pub trait ReportSink: Send + Sync {
    /// Stable identifier, e.g. `"tracing"` or `"console"`.
    fn id(&self) -> &str;

    fn show_message(&self, text: &str, severity: Severity);
}

// ────────────────────────────────────────────────────────────────────────────
// Tracing sink
// ────────────────────────────────────────────────────────────────────────────

/// Forwards every message to `tracing` at the level matching its severity.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl ReportSink for TracingSink {
    fn id(&self) -> &str {
        "tracing"
    }

    fn show_message(&self, text: &str, severity: Severity) {
        match severity {
            Severity::Info => info!(target: "errand::report", "{text}"),
            Severity::Warning => warn!(target: "errand::report", "{text}"),
            Severity::Error => error!(target: "errand::report", "{text}"),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Memory sink
// ────────────────────────────────────────────────────────────────────────────

/// Keeps every message in memory.  Clones share the same buffer, so a test
/// can keep one clone and hand the other to the executor.
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    messages: Arc<Mutex<Vec<(String, Severity)>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<(String, Severity)> {
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Message texts only, in arrival order.
    pub fn texts(&self) -> Vec<String> {
        self.messages().into_iter().map(|(t, _)| t).collect()
    }
}

impl ReportSink for MemorySink {
    fn id(&self) -> &str {
        "memory"
    }

    fn show_message(&self, text: &str, severity: Severity) {
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((text.to_string(), severity));
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Bus sink
// ────────────────────────────────────────────────────────────────────────────

/// Republishes every message on [`Topic::Reports`].
#[derive(Debug, Clone)]
pub struct BusSink {
    bus: EventBus,
}

impl BusSink {
    pub fn new(bus: EventBus) -> Self {
        Self { bus }
    }
}

impl ReportSink for BusSink {
    fn id(&self) -> &str {
        "bus"
    }

    fn show_message(&self, text: &str, severity: Severity) {
        self.bus.emit(
            Topic::Reports,
            "errand-middleware::sink",
            EventPayload::Report {
                text: text.to_string(),
                severity,
            },
        );
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Fan-out
// ────────────────────────────────────────────────────────────────────────────

/// Delivers each message to every inner sink in registration order.
#[derive(Default, Clone)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn ReportSink>>,
}

impl FanoutSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: Arc<dyn ReportSink>) -> Self {
        self.sinks.push(sink);
        self
    }
}

impl ReportSink for FanoutSink {
    fn id(&self) -> &str {
        "fanout"
    }

    fn show_message(&self, text: &str, severity: Severity) {
        for sink in &self.sinks {
            sink.show_message(text, severity);
        }
    }
}
