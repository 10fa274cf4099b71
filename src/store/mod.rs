pub(crate) mod memory;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::models::{Answer, Attempt, ProctorEvent, SessionRecord};
use crate::domain::question::{CodeGrant, ExamDef};

/// Failure surfaced by a persistence or catalog collaborator.
#[derive(Debug, Error)]
#[error("{0}")]
pub(crate) struct StoreError(pub(crate) String);

pub(crate) type StoreResult<T> = Result<T, StoreError>;

/// Exam/question catalog. Authoring lives elsewhere; the core only resolves
/// access codes and reads question sets.
#[async_trait]
pub(crate) trait ExamCatalog: Send + Sync {
    async fn resolve_code(&self, code: &str) -> StoreResult<Option<CodeGrant>>;
    async fn exam(&self, exam_id: &str) -> StoreResult<Option<ExamDef>>;
}

#[async_trait]
pub(crate) trait AttemptStore: Send + Sync {
    async fn create(&self, attempt: &Attempt) -> StoreResult<()>;
    async fn find_by_id(&self, attempt_id: &str) -> StoreResult<Option<Attempt>>;
    async fn update(&self, attempt: &Attempt) -> StoreResult<()>;
}

#[async_trait]
pub(crate) trait SessionStore: Send + Sync {
    async fn create(&self, record: &SessionRecord) -> StoreResult<()>;
    async fn update(&self, record: &SessionRecord) -> StoreResult<()>;
    /// Non-terminal sessions, used to rebuild the registry after a restart.
    async fn list_open(&self) -> StoreResult<Vec<SessionRecord>>;
}

#[async_trait]
pub(crate) trait AnswerStore: Send + Sync {
    /// Last write wins per (attempt, question).
    async fn upsert(&self, attempt_id: &str, answer: &Answer) -> StoreResult<()>;
    async fn find(&self, attempt_id: &str, question_id: &str) -> StoreResult<Option<Answer>>;
    async fn list_by_attempt(&self, attempt_id: &str) -> StoreResult<Vec<Answer>>;
}

#[async_trait]
pub(crate) trait EventStore: Send + Sync {
    async fn create(&self, event: &ProctorEvent) -> StoreResult<()>;
    async fn list_by_attempt(
        &self,
        attempt_id: &str,
        unread_only: bool,
    ) -> StoreResult<Vec<ProctorEvent>>;
    /// Flips the teacher-acknowledgement flag. Returns false for unknown ids.
    async fn mark_read(&self, attempt_id: &str, event_id: &str) -> StoreResult<bool>;
}

/// The collaborator bundle the orchestrator and the HTTP surface work with.
#[derive(Clone)]
pub(crate) struct Stores {
    pub(crate) catalog: Arc<dyn ExamCatalog>,
    pub(crate) attempts: Arc<dyn AttemptStore>,
    pub(crate) sessions: Arc<dyn SessionStore>,
    pub(crate) answers: Arc<dyn AnswerStore>,
    pub(crate) events: Arc<dyn EventStore>,
}
