use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::domain::types::SessionState;

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct StartSessionRequest {
    #[validate(length(min = 1, max = 64, message = "access_code must not be empty"))]
    pub(crate) access_code: String,
    #[serde(default)]
    pub(crate) student_name: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct ResumeSessionRequest {
    #[validate(length(min = 1, max = 64, message = "access_code must not be empty"))]
    pub(crate) access_code: String,
    #[validate(length(min = 1, message = "token must not be empty"))]
    pub(crate) token: String,
}

/// Body of the token-authenticated session transitions (pause, finish, leave).
#[derive(Debug, Deserialize, Validate)]
pub(crate) struct SessionTokenRequest {
    #[validate(length(min = 1, message = "token must not be empty"))]
    pub(crate) token: String,
}

/// Client-side lockdown rules report themselves through this body.
#[derive(Debug, Deserialize, Validate)]
pub(crate) struct BlockSessionRequest {
    #[validate(length(min = 1, message = "token must not be empty"))]
    pub(crate) token: String,
    #[validate(length(min = 1, max = 512, message = "reason must not be empty"))]
    pub(crate) reason: String,
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct TeacherBlockRequest {
    #[validate(length(min = 1, max = 512, message = "reason must not be empty"))]
    pub(crate) reason: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct StartSessionResponse {
    pub(crate) attempt_id: String,
    pub(crate) token: String,
    pub(crate) state: SessionState,
    pub(crate) expires_at: Option<String>,
    pub(crate) remaining_seconds: Option<i64>,
}

#[derive(Debug, Serialize)]
pub(crate) struct ResumeSessionResponse {
    pub(crate) attempt_id: String,
    pub(crate) token: String,
    pub(crate) state: SessionState,
    pub(crate) remaining_seconds: Option<i64>,
}

#[derive(Debug, Serialize)]
pub(crate) struct SessionStateResponse {
    pub(crate) attempt_id: String,
    pub(crate) state: SessionState,
}

#[derive(Debug, Serialize)]
pub(crate) struct UnlockSessionResponse {
    pub(crate) attempt_id: String,
    pub(crate) state: SessionState,
    pub(crate) resume_token: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct FinishSessionResponse {
    pub(crate) attempt_id: String,
    pub(crate) score: Option<f64>,
    pub(crate) max_score: Option<f64>,
    pub(crate) percentage: Option<f64>,
    pub(crate) grade: Option<f64>,
    pub(crate) needs_review: bool,
}
