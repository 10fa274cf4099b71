use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use serde::Deserialize;

use crate::domain::models::{Answer, Attempt, ProctorEvent, SessionRecord};
use crate::domain::question::{CodeGrant, ExamDef};
use crate::store::{
    AnswerStore, AttemptStore, EventStore, ExamCatalog, SessionStore, StoreError, StoreResult,
    Stores,
};

/// Catalog seed file: exams plus the access codes granting entry to them.
#[derive(Debug, Deserialize)]
pub(crate) struct CatalogSeed {
    pub(crate) exams: Vec<ExamDef>,
    pub(crate) codes: Vec<CodeGrant>,
}

pub(crate) struct MemoryCatalog {
    exams: HashMap<String, ExamDef>,
    grants: HashMap<String, CodeGrant>,
}

impl MemoryCatalog {
    pub(crate) fn new(exams: Vec<ExamDef>, codes: Vec<CodeGrant>) -> Self {
        Self {
            exams: exams.into_iter().map(|exam| (exam.id.clone(), exam)).collect(),
            grants: codes.into_iter().map(|grant| (grant.code.clone(), grant)).collect(),
        }
    }

    pub(crate) fn empty() -> Self {
        Self::new(Vec::new(), Vec::new())
    }

    pub(crate) fn from_path(path: &Path) -> StoreResult<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|err| StoreError(format!("failed to read catalog {}: {err}", path.display())))?;
        let seed: CatalogSeed = serde_json::from_str(&raw)
            .map_err(|err| StoreError(format!("malformed catalog {}: {err}", path.display())))?;
        Ok(Self::new(seed.exams, seed.codes))
    }

    pub(crate) fn exam_count(&self) -> usize {
        self.exams.len()
    }
}

#[async_trait]
impl ExamCatalog for MemoryCatalog {
    async fn resolve_code(&self, code: &str) -> StoreResult<Option<CodeGrant>> {
        Ok(self.grants.get(code).cloned())
    }

    async fn exam(&self, exam_id: &str) -> StoreResult<Option<ExamDef>> {
        Ok(self.exams.get(exam_id).cloned())
    }
}

#[derive(Default)]
pub(crate) struct MemoryAttemptStore {
    attempts: DashMap<String, Attempt>,
}

#[async_trait]
impl AttemptStore for MemoryAttemptStore {
    async fn create(&self, attempt: &Attempt) -> StoreResult<()> {
        self.attempts.insert(attempt.id.clone(), attempt.clone());
        Ok(())
    }

    async fn find_by_id(&self, attempt_id: &str) -> StoreResult<Option<Attempt>> {
        Ok(self.attempts.get(attempt_id).map(|entry| entry.clone()))
    }

    async fn update(&self, attempt: &Attempt) -> StoreResult<()> {
        if !self.attempts.contains_key(&attempt.id) {
            return Err(StoreError(format!("unknown attempt {}", attempt.id)));
        }
        self.attempts.insert(attempt.id.clone(), attempt.clone());
        Ok(())
    }
}

#[derive(Default)]
pub(crate) struct MemorySessionStore {
    sessions: DashMap<String, SessionRecord>,
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn create(&self, record: &SessionRecord) -> StoreResult<()> {
        self.sessions.insert(record.attempt_id.clone(), record.clone());
        Ok(())
    }

    async fn update(&self, record: &SessionRecord) -> StoreResult<()> {
        if !self.sessions.contains_key(&record.attempt_id) {
            return Err(StoreError(format!("unknown session {}", record.attempt_id)));
        }
        self.sessions.insert(record.attempt_id.clone(), record.clone());
        Ok(())
    }

    async fn list_open(&self) -> StoreResult<Vec<SessionRecord>> {
        Ok(self
            .sessions
            .iter()
            .filter(|entry| !entry.state.is_terminal())
            .map(|entry| entry.clone())
            .collect())
    }
}

#[derive(Default)]
pub(crate) struct MemoryAnswerStore {
    answers: DashMap<(String, String), Answer>,
}

#[async_trait]
impl AnswerStore for MemoryAnswerStore {
    async fn upsert(&self, attempt_id: &str, answer: &Answer) -> StoreResult<()> {
        self.answers
            .insert((attempt_id.to_string(), answer.question_id.clone()), answer.clone());
        Ok(())
    }

    async fn find(&self, attempt_id: &str, question_id: &str) -> StoreResult<Option<Answer>> {
        Ok(self
            .answers
            .get(&(attempt_id.to_string(), question_id.to_string()))
            .map(|entry| entry.clone()))
    }

    async fn list_by_attempt(&self, attempt_id: &str) -> StoreResult<Vec<Answer>> {
        let mut answers: Vec<Answer> = self
            .answers
            .iter()
            .filter(|entry| entry.key().0 == attempt_id)
            .map(|entry| entry.value().clone())
            .collect();
        answers.sort_by(|a, b| a.question_id.cmp(&b.question_id));
        Ok(answers)
    }
}

#[derive(Default)]
pub(crate) struct MemoryEventStore {
    events: DashMap<String, Vec<ProctorEvent>>,
}

#[async_trait]
impl EventStore for MemoryEventStore {
    async fn create(&self, event: &ProctorEvent) -> StoreResult<()> {
        self.events.entry(event.attempt_id.clone()).or_default().push(event.clone());
        Ok(())
    }

    async fn list_by_attempt(
        &self,
        attempt_id: &str,
        unread_only: bool,
    ) -> StoreResult<Vec<ProctorEvent>> {
        Ok(self
            .events
            .get(attempt_id)
            .map(|entry| {
                entry
                    .iter()
                    .filter(|event| !unread_only || !event.read)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn mark_read(&self, attempt_id: &str, event_id: &str) -> StoreResult<bool> {
        let Some(mut entry) = self.events.get_mut(attempt_id) else {
            return Ok(false);
        };
        match entry.iter_mut().find(|event| event.id == event_id) {
            Some(event) => {
                event.read = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

pub(crate) fn memory_stores(catalog: MemoryCatalog) -> Stores {
    Stores {
        catalog: Arc::new(catalog),
        attempts: Arc::new(MemoryAttemptStore::default()),
        sessions: Arc::new(MemorySessionStore::default()),
        answers: Arc::new(MemoryAnswerStore::default()),
        events: Arc::new(MemoryEventStore::default()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::question::AnswerValue;
    use crate::domain::types::SessionState;
    use time::OffsetDateTime;

    #[tokio::test]
    async fn answer_upsert_overwrites_per_question() {
        let store = MemoryAnswerStore::default();
        let now = OffsetDateTime::UNIX_EPOCH;

        let first = Answer::submitted("q1", AnswerValue::Text { text: "one".into() }, now);
        let second = Answer::submitted("q1", AnswerValue::Text { text: "two".into() }, now);
        store.upsert("a1", &first).await.unwrap();
        store.upsert("a1", &second).await.unwrap();

        let answers = store.list_by_attempt("a1").await.unwrap();
        assert_eq!(answers.len(), 1);
        match &answers[0].value {
            AnswerValue::Text { text } => assert_eq!(text, "two"),
            other => panic!("unexpected value: {other:?}"),
        }
    }

    #[tokio::test]
    async fn list_open_skips_terminal_sessions() {
        let store = MemorySessionStore::default();
        let now = OffsetDateTime::UNIX_EPOCH;
        let mut record = SessionRecord {
            attempt_id: "a1".into(),
            exam_id: "e1".into(),
            access_code: "CODE-1".into(),
            state: SessionState::Active,
            started_at: now,
            ended_at: None,
            expires_at: None,
            token_hash: "hash".into(),
            override_hash: None,
            block_reason: None,
        };
        store.create(&record).await.unwrap();

        record.attempt_id = "a2".into();
        record.access_code = "CODE-2".into();
        record.state = SessionState::Finished;
        store.create(&record).await.unwrap();

        let open = store.list_open().await.unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].attempt_id, "a1");
    }

    #[tokio::test]
    async fn mark_read_flips_only_matching_event() {
        let store = MemoryEventStore::default();
        let now = OffsetDateTime::UNIX_EPOCH;
        let event = ProctorEvent {
            id: "ev1".into(),
            attempt_id: "a1".into(),
            exam_id: "e1".into(),
            kind: crate::domain::types::EventKind::FocusLost,
            payload: serde_json::json!({}),
            created_at: now,
            read: false,
        };
        store.create(&event).await.unwrap();

        assert!(store.mark_read("a1", "ev1").await.unwrap());
        assert!(!store.mark_read("a1", "missing").await.unwrap());
        assert!(store.list_by_attempt("a1", true).await.unwrap().is_empty());
    }
}
