use serde::Serialize;
use serde_json::Value;

/// Message fanned out to the observers of one exam room. Every variant
/// carries the attempt it concerns and the wall-clock instant the
/// orchestrator applied the transition.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub(crate) enum RoomEvent {
    SessionStarted {
        attempt_id: String,
        at: String,
    },
    SessionResumed {
        attempt_id: String,
        at: String,
    },
    SessionPaused {
        attempt_id: String,
        at: String,
    },
    SessionBlocked {
        attempt_id: String,
        reason: String,
        at: String,
    },
    SessionUnlocked {
        attempt_id: String,
        at: String,
    },
    SessionFinished {
        attempt_id: String,
        score: Option<f64>,
        max_score: Option<f64>,
        grade: Option<f64>,
        at: String,
    },
    SessionAbandoned {
        attempt_id: String,
        cause: String,
        at: String,
    },
    ProctorEvent {
        attempt_id: String,
        event_id: String,
        kind: String,
        payload: Value,
        at: String,
    },
}

impl RoomEvent {
    /// Name used for the SSE `event:` field.
    pub(crate) fn event_name(&self) -> &'static str {
        match self {
            RoomEvent::SessionStarted { .. } => "session_started",
            RoomEvent::SessionResumed { .. } => "session_resumed",
            RoomEvent::SessionPaused { .. } => "session_paused",
            RoomEvent::SessionBlocked { .. } => "session_blocked",
            RoomEvent::SessionUnlocked { .. } => "session_unlocked",
            RoomEvent::SessionFinished { .. } => "session_finished",
            RoomEvent::SessionAbandoned { .. } => "session_abandoned",
            RoomEvent::ProctorEvent { .. } => "proctor_event",
        }
    }

    pub(crate) fn attempt_id(&self) -> &str {
        match self {
            RoomEvent::SessionStarted { attempt_id, .. }
            | RoomEvent::SessionResumed { attempt_id, .. }
            | RoomEvent::SessionPaused { attempt_id, .. }
            | RoomEvent::SessionBlocked { attempt_id, .. }
            | RoomEvent::SessionUnlocked { attempt_id, .. }
            | RoomEvent::SessionFinished { attempt_id, .. }
            | RoomEvent::SessionAbandoned { attempt_id, .. }
            | RoomEvent::ProctorEvent { attempt_id, .. } => attempt_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_serializes_with_type_tag() {
        let event = RoomEvent::SessionBlocked {
            attempt_id: "a1".into(),
            reason: "tab switching".into(),
            at: "1970-01-01T00:00:00Z".into(),
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "session_blocked");
        assert_eq!(value["attempt_id"], "a1");
        assert_eq!(event.event_name(), "session_blocked");
    }
}
