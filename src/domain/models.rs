use serde_json::Value;
use time::OffsetDateTime;

use crate::domain::question::AnswerValue;
use crate::domain::types::{EventKind, SessionState};

/// One student's engagement with one exam. Created together with its session
/// at `start` and kept for review after the session reaches a terminal state.
#[derive(Debug, Clone)]
pub(crate) struct Attempt {
    pub(crate) id: String,
    pub(crate) exam_id: String,
    pub(crate) access_code: String,
    pub(crate) student_name: Option<String>,
    pub(crate) started_at: OffsetDateTime,
    pub(crate) finished_at: Option<OffsetDateTime>,
    pub(crate) score: Option<f64>,
    pub(crate) max_score: Option<f64>,
    pub(crate) percentage: Option<f64>,
    pub(crate) grade: Option<f64>,
    pub(crate) progress: u8,
    pub(crate) pdf_mode: bool,
    pub(crate) needs_review: bool,
    pub(crate) anomalies: u32,
    pub(crate) holistic: Option<HolisticGrade>,
}

/// Whole-attempt grade entered by a teacher. Replaces the computed grade;
/// per-question scores stay untouched for audit.
#[derive(Debug, Clone)]
pub(crate) struct HolisticGrade {
    pub(crate) score: f64,
    pub(crate) feedback: Option<String>,
}

/// The live, concurrency-guarded record of an attempt in progress.
#[derive(Debug, Clone)]
pub(crate) struct SessionRecord {
    pub(crate) attempt_id: String,
    pub(crate) exam_id: String,
    pub(crate) access_code: String,
    pub(crate) state: SessionState,
    pub(crate) started_at: OffsetDateTime,
    pub(crate) ended_at: Option<OffsetDateTime>,
    pub(crate) expires_at: Option<OffsetDateTime>,
    pub(crate) token_hash: String,
    pub(crate) override_hash: Option<String>,
    pub(crate) block_reason: Option<String>,
}

impl SessionRecord {
    pub(crate) fn remaining_seconds(&self, now: OffsetDateTime) -> Option<i64> {
        self.expires_at
            .map(|expires_at| (expires_at.unix_timestamp() - now.unix_timestamp()).max(0))
    }

    pub(crate) fn is_expired(&self, now: OffsetDateTime) -> bool {
        match self.expires_at {
            Some(expires_at) => !self.state.is_terminal() && expires_at <= now,
            None => false,
        }
    }
}

/// Current answer for one question within an attempt. Resubmission overwrites;
/// each question holds at most one answer.
#[derive(Debug, Clone)]
pub(crate) struct Answer {
    pub(crate) question_id: String,
    pub(crate) value: AnswerValue,
    pub(crate) score: Option<f64>,
    pub(crate) feedback: Option<String>,
    pub(crate) manually_graded: bool,
    pub(crate) anomaly: bool,
    pub(crate) submitted_at: OffsetDateTime,
}

impl Answer {
    pub(crate) fn submitted(question_id: &str, value: AnswerValue, at: OffsetDateTime) -> Self {
        Self {
            question_id: question_id.to_string(),
            value,
            score: None,
            feedback: None,
            manually_graded: false,
            anomaly: false,
            submitted_at: at,
        }
    }
}

/// Proctoring record. Immutable once written, except for the read flag.
#[derive(Debug, Clone)]
pub(crate) struct ProctorEvent {
    pub(crate) id: String,
    pub(crate) attempt_id: String,
    pub(crate) exam_id: String,
    pub(crate) kind: EventKind,
    pub(crate) payload: Value,
    pub(crate) created_at: OffsetDateTime,
    pub(crate) read: bool,
}
