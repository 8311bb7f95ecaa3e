//! Diagnostics port — trait for emitting engine decisions from any module.
//!
//! The engine accepts an `Arc<dyn DiagnosticsSink>` at construction time
//! instead of reaching for a global logger. Hosts route events to their own
//! logging; tests capture them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    /// Content was chosen for a trigger.
    Selected,
    /// A candidate campaign produced nothing; `reason` says why.
    Skipped,
    /// The host acknowledged a presentation.
    Displayed,
    /// The campaign was marked deleted.
    Deleted,
    /// Campaign state was reset to defaults.
    Reset,
    /// A campaign definition could not be loaded.
    Rejected,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosticEvent {
    pub kind: DiagnosticKind,
    pub campaign_id: Option<i64>,
    pub trigger: Option<String>,
    pub reason: String,
    pub timestamp: DateTime<Utc>,
}

pub trait DiagnosticsSink: Send + Sync {
    fn record(&self, event: DiagnosticEvent);
}

/// No-op sink for hosts that don't need diagnostics.
pub struct NoOpSink;

impl DiagnosticsSink for NoOpSink {
    fn record(&self, _event: DiagnosticEvent) {}
}

/// Forwards every event to `tracing` at debug level.
pub struct TracingSink;

impl DiagnosticsSink for TracingSink {
    fn record(&self, event: DiagnosticEvent) {
        tracing::debug!(
            kind = ?event.kind,
            campaign_id = ?event.campaign_id,
            trigger = ?event.trigger,
            reason = %event.reason,
            "in-app diagnostic"
        );
    }
}

/// In-memory sink that captures events for testing.
#[derive(Default)]
pub struct CaptureSink {
    events: Mutex<Vec<DiagnosticEvent>>,
}

impl CaptureSink {
    pub fn new() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
        }
    }

    pub fn events(&self) -> Vec<DiagnosticEvent> {
        self.events.lock().expect("diagnostics mutex poisoned").clone()
    }

    pub fn count(&self) -> usize {
        self.events.lock().expect("diagnostics mutex poisoned").len()
    }

    pub fn count_kind(&self, kind: DiagnosticKind) -> usize {
        self.events
            .lock()
            .expect("diagnostics mutex poisoned")
            .iter()
            .filter(|e| e.kind == kind)
            .count()
    }

    /// Most recent reason recorded for a campaign, if any.
    pub fn last_reason(&self, campaign_id: i64) -> Option<String> {
        self.events
            .lock()
            .expect("diagnostics mutex poisoned")
            .iter()
            .rev()
            .find(|e| e.campaign_id == Some(campaign_id))
            .map(|e| e.reason.clone())
    }

    pub fn clear(&self) {
        self.events.lock().expect("diagnostics mutex poisoned").clear();
    }
}

impl DiagnosticsSink for CaptureSink {
    fn record(&self, event: DiagnosticEvent) {
        self.events
            .lock()
            .expect("diagnostics mutex poisoned")
            .push(event);
    }
}

/// Convenience builder for creating a `DiagnosticEvent` with minimal boilerplate.
pub fn make_event(
    kind: DiagnosticKind,
    campaign_id: Option<i64>,
    trigger: Option<&str>,
    reason: impl Into<String>,
) -> DiagnosticEvent {
    DiagnosticEvent {
        kind,
        campaign_id,
        trigger: trigger.map(str::to_string),
        reason: reason.into(),
        timestamp: Utc::now(),
    }
}

pub fn noop_sink() -> Arc<dyn DiagnosticsSink> {
    Arc::new(NoOpSink)
}

pub fn tracing_sink() -> Arc<dyn DiagnosticsSink> {
    Arc::new(TracingSink)
}

/// Convenience: create a capture sink for tests.
pub fn capture_sink() -> Arc<CaptureSink> {
    Arc::new(CaptureSink::new())
}
