use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::domain::models::ProctorEvent;
use crate::domain::types::EventKind;

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct ReportEventRequest {
    #[validate(length(min = 1, message = "token must not be empty"))]
    pub(crate) token: String,
    pub(crate) kind: EventKind,
    #[serde(default)]
    pub(crate) payload: serde_json::Value,
}

#[derive(Debug, Serialize)]
pub(crate) struct ReportEventResponse {
    pub(crate) event_id: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct ProctorEventResponse {
    pub(crate) id: String,
    pub(crate) attempt_id: String,
    pub(crate) kind: EventKind,
    pub(crate) payload: serde_json::Value,
    pub(crate) created_at: String,
    pub(crate) read: bool,
}

impl From<ProctorEvent> for ProctorEventResponse {
    fn from(event: ProctorEvent) -> Self {
        Self {
            id: event.id,
            attempt_id: event.attempt_id,
            kind: event.kind,
            payload: event.payload,
            created_at: crate::core::clock::format_offset(event.created_at),
            read: event.read,
        }
    }
}
