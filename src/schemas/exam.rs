use serde::Serialize;
use time::OffsetDateTime;

use crate::core::clock::format_offset;
use crate::domain::models::SessionRecord;
use crate::domain::types::SessionState;

/// Snapshot row of the live-sessions pull query. Late-joining dashboards
/// catch up from this, not from the event stream.
#[derive(Debug, Serialize)]
pub(crate) struct LiveSessionResponse {
    pub(crate) attempt_id: String,
    pub(crate) access_code: String,
    pub(crate) student_name: Option<String>,
    pub(crate) state: SessionState,
    pub(crate) started_at: String,
    pub(crate) expires_at: Option<String>,
    pub(crate) remaining_seconds: Option<i64>,
    pub(crate) block_reason: Option<String>,
}

impl LiveSessionResponse {
    pub(crate) fn from_record(
        record: SessionRecord,
        student_name: Option<String>,
        now: OffsetDateTime,
    ) -> Self {
        let remaining_seconds = record.remaining_seconds(now);
        Self {
            attempt_id: record.attempt_id,
            access_code: record.access_code,
            student_name,
            state: record.state,
            started_at: format_offset(record.started_at),
            expires_at: record.expires_at.map(format_offset),
            remaining_seconds,
            block_reason: record.block_reason,
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct LiveSessionsResponse {
    pub(crate) exam_id: String,
    pub(crate) sessions: Vec<LiveSessionResponse>,
}
