use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use time::OffsetDateTime;
use tokio::sync::Mutex;

use crate::domain::models::SessionRecord;

/// Per-session critical section: every transition locks the slot of exactly
/// one session, so unrelated sessions never contend.
pub(crate) type SessionSlot = Arc<Mutex<SessionRecord>>;

/// Authoritative owner of every session created since boot.
///
/// Sharded-lock map keyed by attempt id, plus a code index that enforces the
/// one-session-per-access-code invariant: a code is claimed atomically at
/// `start` and never released, terminal sessions included, so a spent code
/// can never be started again.
pub(crate) struct SessionRegistry {
    slots: DashMap<String, SessionSlot>,
    codes: DashMap<String, String>,
    exams: DashMap<String, Vec<String>>,
}

impl SessionRegistry {
    pub(crate) fn new() -> Self {
        Self { slots: DashMap::new(), codes: DashMap::new(), exams: DashMap::new() }
    }

    /// Atomically claims an access code for a new attempt. The loser of a
    /// concurrent claim gets the holding attempt id back.
    pub(crate) fn claim_code(&self, code: &str, attempt_id: &str) -> Result<(), String> {
        match self.codes.entry(code.to_string()) {
            Entry::Occupied(entry) => Err(entry.get().clone()),
            Entry::Vacant(vacant) => {
                vacant.insert(attempt_id.to_string());
                Ok(())
            }
        }
    }

    /// Undoes a claim whose session never came into existence (persist
    /// failure during `start`).
    pub(crate) fn retract(&self, code: &str, exam_id: &str, attempt_id: &str) {
        self.codes.remove_if(code, |_, holder| holder == attempt_id);
        self.slots.remove(attempt_id);
        if let Some(mut attempts) = self.exams.get_mut(exam_id) {
            attempts.retain(|id| id != attempt_id);
        }
    }

    pub(crate) fn insert(&self, record: SessionRecord) {
        let attempt_id = record.attempt_id.clone();
        let exam_id = record.exam_id.clone();
        self.slots.insert(attempt_id.clone(), Arc::new(Mutex::new(record)));
        self.exams.entry(exam_id).or_default().push(attempt_id);
    }

    pub(crate) fn slot(&self, attempt_id: &str) -> Option<SessionSlot> {
        self.slots.get(attempt_id).map(|entry| entry.clone())
    }

    pub(crate) fn attempt_for_code(&self, code: &str) -> Option<String> {
        self.codes.get(code).map(|entry| entry.clone())
    }

    pub(crate) async fn snapshot(&self, attempt_id: &str) -> Option<SessionRecord> {
        let slot = self.slot(attempt_id)?;
        let record = slot.lock().await;
        Some(record.clone())
    }

    pub(crate) async fn snapshots_for_exam(&self, exam_id: &str) -> Vec<SessionRecord> {
        let attempt_ids = self
            .exams
            .get(exam_id)
            .map(|entry| entry.clone())
            .unwrap_or_default();

        let mut records = Vec::with_capacity(attempt_ids.len());
        for attempt_id in attempt_ids {
            if let Some(record) = self.snapshot(&attempt_id).await {
                records.push(record);
            }
        }
        records
    }

    /// Non-terminal sessions whose expiration time has passed.
    pub(crate) async fn expired_candidates(&self, now: OffsetDateTime) -> Vec<String> {
        let attempt_ids: Vec<String> = self.slots.iter().map(|entry| entry.key().clone()).collect();

        let mut expired = Vec::new();
        for attempt_id in attempt_ids {
            let Some(slot) = self.slot(&attempt_id) else { continue };
            let record = slot.lock().await;
            if record.is_expired(now) {
                expired.push(attempt_id);
            }
        }
        expired
    }

    /// Reloads open sessions from the store after a restart.
    pub(crate) fn hydrate(&self, records: Vec<SessionRecord>) {
        for record in records {
            let _ = self.claim_code(&record.access_code, &record.attempt_id);
            self.insert(record);
        }
    }

    pub(crate) fn session_count(&self) -> usize {
        self.slots.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::SessionState;
    use time::Duration;

    fn record(attempt_id: &str, code: &str, expires_at: Option<OffsetDateTime>) -> SessionRecord {
        SessionRecord {
            attempt_id: attempt_id.into(),
            exam_id: "exam-1".into(),
            access_code: code.into(),
            state: SessionState::Active,
            started_at: OffsetDateTime::UNIX_EPOCH,
            ended_at: None,
            expires_at,
            token_hash: "hash".into(),
            override_hash: None,
            block_reason: None,
        }
    }

    #[tokio::test]
    async fn concurrent_claims_have_exactly_one_winner() {
        let registry = Arc::new(SessionRegistry::new());

        let mut handles = Vec::new();
        for index in 0..32 {
            let registry = registry.clone();
            handles.push(tokio::spawn(async move {
                registry.claim_code("CODE-1", &format!("attempt-{index}"))
            }));
        }

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn claim_survives_terminal_state() {
        let registry = SessionRegistry::new();
        registry.claim_code("CODE-1", "a1").unwrap();
        let mut rec = record("a1", "CODE-1", None);
        rec.state = SessionState::Finished;
        registry.insert(rec);

        // The code stays bound to the spent attempt.
        assert_eq!(registry.claim_code("CODE-1", "a2"), Err("a1".to_string()));
    }

    #[tokio::test]
    async fn retract_reopens_the_code() {
        let registry = SessionRegistry::new();
        registry.claim_code("CODE-1", "a1").unwrap();
        registry.retract("CODE-1", "exam-1", "a1");
        assert!(registry.claim_code("CODE-1", "a2").is_ok());
    }

    #[tokio::test]
    async fn expired_candidates_respects_deadline_and_state() {
        let registry = SessionRegistry::new();
        let deadline = OffsetDateTime::UNIX_EPOCH + Duration::minutes(60);

        registry.insert(record("timed", "C1", Some(deadline)));
        registry.insert(record("untimed", "C2", None));
        let mut finished = record("finished", "C3", Some(deadline));
        finished.state = SessionState::Finished;
        registry.insert(finished);

        let before = registry.expired_candidates(deadline - Duration::seconds(1)).await;
        assert!(before.is_empty());

        let after = registry.expired_candidates(deadline + Duration::seconds(1)).await;
        assert_eq!(after, vec!["timed".to_string()]);
    }

    #[tokio::test]
    async fn snapshots_for_exam_lists_all_sessions() {
        let registry = SessionRegistry::new();
        registry.insert(record("a1", "C1", None));
        registry.insert(record("a2", "C2", None));

        let records = registry.snapshots_for_exam("exam-1").await;
        assert_eq!(records.len(), 2);
        assert!(registry.snapshots_for_exam("exam-9").await.is_empty());
    }
}
