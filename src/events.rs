use serde::Serialize;
use strum_macros::AsRefStr;
use tracing::{info, warn};

use crate::model::{attendance::AttendanceRecord, break_entry::BreakEntry};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RecordAction {
    Confirmed,
    CheckedOut,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum BreakAction {
    Started,
    Ended,
}

/// Domain events handed to the notification collaborator after commit.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AttendanceEvent {
    AttendanceUpdated {
        action: RecordAction,
        record: AttendanceRecord,
    },
    BreakUpdated {
        action: BreakAction,
        record: AttendanceRecord,
        entry: BreakEntry,
    },
    /// Addressed to administrators.
    BreakExceeded {
        user_id: u64,
        record_id: u64,
        break_type: String,
        excess_minutes: i64,
    },
}

impl AttendanceEvent {
    pub fn name(&self) -> &'static str {
        match self {
            AttendanceEvent::AttendanceUpdated { .. } => "attendance_updated",
            AttendanceEvent::BreakUpdated { .. } => "break_updated",
            AttendanceEvent::BreakExceeded { .. } => "break_exceeded",
        }
    }
}

/// Fire-and-forget delivery; a failing sink never undoes a committed change.
pub trait EventSink {
    async fn publish(&self, event: AttendanceEvent);
}

/// Writes events to the `attendance_events` tracing target, where the
/// notification relay picks them up.
#[derive(Clone, Default)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    async fn publish(&self, event: AttendanceEvent) {
        match serde_json::to_string(&event) {
            Ok(payload) => info!(target: "attendance_events", event = event.name(), %payload),
            Err(e) => warn!(error = %e, event = event.name(), "Failed to encode attendance event"),
        }
    }
}

#[cfg(test)]
pub mod recording {
    use std::sync::Mutex;

    use super::{AttendanceEvent, EventSink};

    #[derive(Default)]
    pub struct RecordingSink {
        events: Mutex<Vec<AttendanceEvent>>,
    }

    impl RecordingSink {
        pub fn events(&self) -> Vec<AttendanceEvent> {
            self.events.lock().expect("sink poisoned").clone()
        }

        pub fn names(&self) -> Vec<&'static str> {
            self.events().iter().map(AttendanceEvent::name).collect()
        }
    }

    impl EventSink for RecordingSink {
        async fn publish(&self, event: AttendanceEvent) {
            self.events.lock().expect("sink poisoned").push(event);
        }
    }
}
