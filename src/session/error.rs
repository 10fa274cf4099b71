use thiserror::Error;

use crate::store::StoreError;

/// Precondition and collaborator failures of the session lifecycle. Every
/// rejected transition leaves the session exactly as it was.
#[derive(Debug, Error)]
pub(crate) enum SessionError {
    #[error("access code not recognized")]
    CodeUnknown,
    #[error("access code has been revoked")]
    CodeRevoked,
    #[error("another session already holds this access code")]
    CodeInUse,
    #[error("session is no longer valid, contact your teacher")]
    InvalidToken,
    #[error("session has already ended")]
    Terminal,
    #[error("session is suspended")]
    Suspended,
    #[error("attempt not found")]
    AttemptUnknown,
    #[error("manual grading incomplete for questions: {}", question_ids.join(", "))]
    GradingIncomplete { question_ids: Vec<String> },
    #[error("{0}")]
    Validation(String),
    #[error("storage failure: {0}")]
    Store(String),
}

impl From<StoreError> for SessionError {
    fn from(err: StoreError) -> Self {
        SessionError::Store(err.0)
    }
}
