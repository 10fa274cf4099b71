use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::core::clock::format_offset;
use crate::domain::models::{Answer, Attempt};
use crate::domain::question::AnswerValue;
use crate::domain::types::SessionState;

/// Teacher grade entry. Without a question id the score is the holistic
/// grade for the whole attempt.
#[derive(Debug, Deserialize, Validate)]
pub(crate) struct GradeOverrideRequest {
    #[serde(default)]
    pub(crate) question_id: Option<String>,
    #[validate(range(min = 0.0, message = "score must be non-negative"))]
    pub(crate) score: f64,
    #[serde(default)]
    pub(crate) feedback: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct AnswerReviewResponse {
    pub(crate) question_id: String,
    pub(crate) value: AnswerValue,
    pub(crate) score: Option<f64>,
    pub(crate) feedback: Option<String>,
    pub(crate) manually_graded: bool,
    pub(crate) anomaly: bool,
    pub(crate) submitted_at: String,
}

impl From<Answer> for AnswerReviewResponse {
    fn from(answer: Answer) -> Self {
        Self {
            question_id: answer.question_id,
            value: answer.value,
            score: answer.score,
            feedback: answer.feedback,
            manually_graded: answer.manually_graded,
            anomaly: answer.anomaly,
            submitted_at: format_offset(answer.submitted_at),
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct HolisticGradeResponse {
    pub(crate) score: f64,
    pub(crate) feedback: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct AttemptReviewResponse {
    pub(crate) id: String,
    pub(crate) exam_id: String,
    pub(crate) access_code: String,
    pub(crate) student_name: Option<String>,
    pub(crate) state: Option<SessionState>,
    pub(crate) started_at: String,
    pub(crate) finished_at: Option<String>,
    pub(crate) score: Option<f64>,
    pub(crate) max_score: Option<f64>,
    pub(crate) percentage: Option<f64>,
    pub(crate) grade: Option<f64>,
    pub(crate) progress: u8,
    pub(crate) pdf_mode: bool,
    pub(crate) needs_review: bool,
    pub(crate) anomalies: u32,
    pub(crate) holistic: Option<HolisticGradeResponse>,
    pub(crate) answers: Vec<AnswerReviewResponse>,
}

impl AttemptReviewResponse {
    pub(crate) fn from_parts(
        attempt: Attempt,
        state: Option<SessionState>,
        answers: Vec<Answer>,
    ) -> Self {
        Self {
            id: attempt.id,
            exam_id: attempt.exam_id,
            access_code: attempt.access_code,
            student_name: attempt.student_name,
            state,
            started_at: format_offset(attempt.started_at),
            finished_at: attempt.finished_at.map(format_offset),
            score: attempt.score,
            max_score: attempt.max_score,
            percentage: attempt.percentage,
            grade: attempt.grade,
            progress: attempt.progress,
            pdf_mode: attempt.pdf_mode,
            needs_review: attempt.needs_review,
            anomalies: attempt.anomalies,
            holistic: attempt.holistic.map(|holistic| HolisticGradeResponse {
                score: holistic.score,
                feedback: holistic.feedback,
            }),
            answers: answers.into_iter().map(AnswerReviewResponse::from).collect(),
        }
    }
}
