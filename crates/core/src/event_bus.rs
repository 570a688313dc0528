//! Engine event bus — trait for emitting observable engine events.
//!
//! Both engines accept an `Arc<dyn EventSink>` and emit one event per action
//! attempt/outcome and one per significance computation, so tests can assert
//! behavior without parsing log output.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// The kind of engine event being emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineEventKind {
    ActionStarted,
    ActionCompleted,
    ActionFailed,
    ActionSkipped,
    DelayRequested,
    ExecutionCompleted,
    ExecutionFailed,
    VariantAssigned,
    InteractionRecorded,
    SignificanceComputed,
}

/// A single observable event from the automation or experimentation engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineEvent {
    pub event_id: Uuid,
    pub kind: EngineEventKind,
    /// Id of the execution or test this event concerns.
    pub subject_id: String,
    /// Secondary reference: action type, variant label, interaction kind.
    pub reference: Option<String>,
    pub detail: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Trait for emitting engine events. Production implementations route
/// events to an analytics pipeline; tests capture them in memory.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: EngineEvent);
}

/// No-op sink for modules that don't need event emission.
pub struct NoOpSink;

impl EventSink for NoOpSink {
    fn emit(&self, _event: EngineEvent) {}
}

/// In-memory sink that captures events for testing.
#[derive(Default)]
pub struct CaptureSink {
    events: Mutex<Vec<EngineEvent>>,
}

impl CaptureSink {
    pub fn new() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
        }
    }

    pub fn events(&self) -> Vec<EngineEvent> {
        self.events.lock().expect("event bus mutex poisoned").clone()
    }

    pub fn count(&self) -> usize {
        self.events.lock().expect("event bus mutex poisoned").len()
    }

    pub fn count_kind(&self, kind: EngineEventKind) -> usize {
        self.events
            .lock()
            .expect("event bus mutex poisoned")
            .iter()
            .filter(|e| e.kind == kind)
            .count()
    }

    pub fn clear(&self) {
        self.events.lock().expect("event bus mutex poisoned").clear();
    }
}

impl EventSink for CaptureSink {
    fn emit(&self, event: EngineEvent) {
        self.events.lock().expect("event bus mutex poisoned").push(event);
    }
}

/// Convenience builder for creating an `EngineEvent` with minimal boilerplate.
pub fn make_event(
    kind: EngineEventKind,
    subject_id: impl Into<String>,
    reference: Option<String>,
    detail: Option<String>,
) -> EngineEvent {
    EngineEvent {
        event_id: Uuid::new_v4(),
        kind,
        subject_id: subject_id.into(),
        reference,
        detail,
        timestamp: Utc::now(),
    }
}

/// Convenience: create a no-op event sink.
pub fn noop_sink() -> Arc<dyn EventSink> {
    Arc::new(NoOpSink)
}

/// Convenience: create a capture sink for tests.
pub fn capture_sink() -> Arc<CaptureSink> {
    Arc::new(CaptureSink::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_sink() {
        let sink = capture_sink();
        assert_eq!(sink.count(), 0);

        sink.emit(make_event(
            EngineEventKind::ActionStarted,
            "exec-1",
            Some("SEND_EMAIL".into()),
            None,
        ));
        sink.emit(make_event(
            EngineEventKind::ActionCompleted,
            "exec-1",
            Some("SEND_EMAIL".into()),
            None,
        ));

        assert_eq!(sink.count(), 2);
        assert_eq!(sink.count_kind(EngineEventKind::ActionStarted), 1);
        assert_eq!(sink.count_kind(EngineEventKind::ActionFailed), 0);

        let events = sink.events();
        assert_eq!(events[0].subject_id, "exec-1");
        assert_eq!(events[1].reference, Some("SEND_EMAIL".into()));
    }

    #[test]
    fn test_noop_sink() {
        let sink = noop_sink();
        // Should not panic
        sink.emit(make_event(
            EngineEventKind::SignificanceComputed,
            "test-1",
            None,
            None,
        ));
    }
}
