use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::domain::question::AnswerValue;

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct SubmitAnswerRequest {
    #[validate(length(min = 1, message = "token must not be empty"))]
    pub(crate) token: String,
    #[validate(length(min = 1, message = "question_id must not be empty"))]
    pub(crate) question_id: String,
    pub(crate) value: AnswerValue,
}

#[derive(Debug, Serialize)]
pub(crate) struct SubmitAnswerResponse {
    pub(crate) accepted: bool,
    /// Share of questions answered so far, 0 to 100.
    pub(crate) progress: u8,
}
