use std::sync::Arc;

use time::Duration;
use uuid::Uuid;

use crate::broadcast::events::RoomEvent;
use crate::broadcast::ExamBroadcaster;
use crate::core::clock::{format_offset, Clock};
use crate::domain::models::{Answer, Attempt, HolisticGrade, ProctorEvent, SessionRecord};
use crate::domain::question::AnswerValue;
use crate::domain::types::{AbandonCause, EventKind, SessionState};
use crate::grading::aggregate::{self, AttemptAggregate};
use crate::services::answers::validate_answer_shape;
use crate::services::tokens;
use crate::session::error::SessionError;
use crate::session::registry::SessionRegistry;
use crate::store::Stores;

/// Who is asking for a transition. Student calls prove their claim with the
/// session-binding token; teacher calls are authorized upstream by the
/// bearer guard; the expiration sweep acts as the system itself.
pub(crate) enum Actor<'a> {
    Student { token: &'a str },
    Teacher,
    System,
}

#[derive(Debug, Clone)]
pub(crate) struct GradingPolicy {
    pub(crate) scale_max: f64,
    pub(crate) strict_manual_grading: bool,
}

#[derive(Debug)]
pub(crate) struct StartOutcome {
    pub(crate) attempt_id: String,
    pub(crate) token: String,
    pub(crate) state: SessionState,
    pub(crate) expires_at: Option<time::OffsetDateTime>,
    pub(crate) remaining_seconds: Option<i64>,
}

#[derive(Debug)]
pub(crate) struct ResumeOutcome {
    pub(crate) attempt_id: String,
    pub(crate) token: String,
    pub(crate) state: SessionState,
    pub(crate) remaining_seconds: Option<i64>,
}

#[derive(Debug)]
pub(crate) struct UnlockOutcome {
    pub(crate) state: SessionState,
    /// Fresh binding token, minted only by the unlock that actually
    /// transitioned the session. Handed to the student by the teacher.
    pub(crate) resume_token: Option<String>,
}

#[derive(Debug, Clone)]
pub(crate) struct FinishOutcome {
    pub(crate) score: Option<f64>,
    pub(crate) max_score: Option<f64>,
    pub(crate) percentage: Option<f64>,
    pub(crate) grade: Option<f64>,
    pub(crate) needs_review: bool,
}

#[derive(Debug)]
pub(crate) struct SubmitOutcome {
    pub(crate) progress: u8,
}

/// Drives every session transition. The only writer of session state: all
/// mutation happens inside the per-session slot lock, against a working copy
/// that is persisted before it is committed back, so a failed transition
/// leaves the record untouched. Each transition publishes its room event
/// inside the same critical section, after commit: the broadcast send is
/// synchronous, observers see events in the order transitions applied, and a
/// failed send never rolls a transition back.
pub(crate) struct Orchestrator {
    registry: Arc<SessionRegistry>,
    stores: Stores,
    broadcaster: ExamBroadcaster,
    clock: Clock,
    policy: GradingPolicy,
}

impl Orchestrator {
    pub(crate) fn new(
        registry: Arc<SessionRegistry>,
        stores: Stores,
        broadcaster: ExamBroadcaster,
        clock: Clock,
        policy: GradingPolicy,
    ) -> Self {
        Self { registry, stores, broadcaster, clock, policy }
    }

    pub(crate) fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    pub(crate) async fn start(
        &self,
        code: &str,
        student_name: Option<String>,
    ) -> Result<StartOutcome, SessionError> {
        // Catalog validation happens before any claim so start storms on
        // unrelated codes never serialize behind each other.
        let grant = self
            .stores
            .catalog
            .resolve_code(code)
            .await?
            .ok_or(SessionError::CodeUnknown)?;
        if grant.revoked {
            return Err(SessionError::CodeRevoked);
        }
        let exam = self
            .stores
            .catalog
            .exam(&grant.exam_id)
            .await?
            .ok_or_else(|| SessionError::Store(format!("exam {} missing from catalog", grant.exam_id)))?;

        let attempt_id = Uuid::new_v4().to_string();
        if let Err(holder) = self.registry.claim_code(code, &attempt_id) {
            return match self.registry.snapshot(&holder).await {
                Some(record) if record.state.is_terminal() => Err(SessionError::Terminal),
                _ => Err(SessionError::CodeInUse),
            };
        }

        let now = self.clock.now();
        let raw_token = tokens::generate_session_token();
        let expires_at =
            exam.time_limit_minutes.map(|minutes| now + Duration::minutes(minutes as i64));

        let attempt = Attempt {
            id: attempt_id.clone(),
            exam_id: exam.id.clone(),
            access_code: code.to_string(),
            student_name: student_name.or(grant.student_name),
            started_at: now,
            finished_at: None,
            score: None,
            max_score: None,
            percentage: None,
            grade: None,
            progress: 0,
            pdf_mode: grant.pdf_mode,
            needs_review: false,
            anomalies: 0,
            holistic: None,
        };
        let record = SessionRecord {
            attempt_id: attempt_id.clone(),
            exam_id: exam.id.clone(),
            access_code: code.to_string(),
            state: SessionState::Active,
            started_at: now,
            ended_at: None,
            expires_at,
            token_hash: tokens::hash_token(&raw_token),
            override_hash: None,
            block_reason: None,
        };

        let persisted = async {
            self.stores.attempts.create(&attempt).await?;
            self.stores.sessions.create(&record).await?;
            Ok::<(), SessionError>(())
        }
        .await;
        if let Err(err) = persisted {
            self.registry.retract(code, &exam.id, &attempt_id);
            return Err(err);
        }

        let remaining_seconds = record.remaining_seconds(now);

        metrics::counter!("session_transitions_total", "to" => "active").increment(1);
        tracing::info!(attempt_id = %attempt_id, exam_id = %exam.id, "Session started");
        // The slot only becomes visible after the started event is on the
        // wire, so no later transition can outrun it in the room stream.
        self.broadcaster.publish(
            &exam.id,
            RoomEvent::SessionStarted { attempt_id: attempt_id.clone(), at: format_offset(now) },
        );
        self.registry.insert(record);

        Ok(StartOutcome {
            attempt_id,
            token: raw_token,
            state: SessionState::Active,
            expires_at,
            remaining_seconds,
        })
    }

    pub(crate) async fn resume(
        &self,
        code: &str,
        token: &str,
    ) -> Result<ResumeOutcome, SessionError> {
        let attempt_id =
            self.registry.attempt_for_code(code).ok_or(SessionError::CodeUnknown)?;
        let slot = self.registry.slot(&attempt_id).ok_or(SessionError::CodeUnknown)?;
        let mut record = slot.lock().await;

        if record.state.is_terminal() {
            return Err(SessionError::Terminal);
        }

        let authorized = match record.state {
            // A blocked session only reopens through the teacher-issued
            // override; the pre-block token is dead.
            SessionState::Blocked => record
                .override_hash
                .as_deref()
                .map(|hash| tokens::token_matches(token, hash))
                .unwrap_or(false),
            _ => tokens::token_matches(token, &record.token_hash),
        };
        if !authorized {
            return Err(SessionError::InvalidToken);
        }

        let now = self.clock.now();
        let raw_token = tokens::generate_session_token();
        let mut next = record.clone();
        next.state = SessionState::Active;
        next.token_hash = tokens::hash_token(&raw_token);
        next.override_hash = None;
        next.block_reason = None;

        self.stores.sessions.update(&next).await?;
        *record = next.clone();

        metrics::counter!("session_transitions_total", "to" => "active").increment(1);
        self.broadcaster.publish(
            &next.exam_id,
            RoomEvent::SessionResumed { attempt_id: attempt_id.clone(), at: format_offset(now) },
        );
        drop(record);

        // Remaining time is recomputed from the stored wall-clock deadline,
        // never reset by the resume itself.
        Ok(ResumeOutcome {
            attempt_id,
            token: raw_token,
            state: SessionState::Active,
            remaining_seconds: next.remaining_seconds(now),
        })
    }

    pub(crate) async fn pause(
        &self,
        attempt_id: &str,
        token: &str,
    ) -> Result<SessionState, SessionError> {
        let slot = self.registry.slot(attempt_id).ok_or(SessionError::AttemptUnknown)?;
        let mut record = slot.lock().await;

        if record.state.is_terminal() {
            return Err(SessionError::Terminal);
        }
        if record.state == SessionState::Blocked {
            return Err(SessionError::Suspended);
        }
        if !tokens::token_matches(token, &record.token_hash) {
            return Err(SessionError::InvalidToken);
        }
        if record.state == SessionState::Paused {
            return Ok(SessionState::Paused);
        }

        let mut next = record.clone();
        next.state = SessionState::Paused;
        self.stores.sessions.update(&next).await?;
        *record = next.clone();

        metrics::counter!("session_transitions_total", "to" => "paused").increment(1);
        self.broadcaster.publish(
            &next.exam_id,
            RoomEvent::SessionPaused {
                attempt_id: attempt_id.to_string(),
                at: format_offset(self.clock.now()),
            },
        );
        drop(record);
        Ok(SessionState::Paused)
    }

    pub(crate) async fn block(
        &self,
        attempt_id: &str,
        actor: Actor<'_>,
        reason: &str,
    ) -> Result<SessionState, SessionError> {
        let slot = self.registry.slot(attempt_id).ok_or(SessionError::AttemptUnknown)?;
        let mut record = slot.lock().await;

        if record.state.is_terminal() {
            return Err(SessionError::Terminal);
        }
        verify_actor(&record, &actor)?;
        if record.state == SessionState::Blocked {
            return Ok(SessionState::Blocked);
        }

        let mut next = record.clone();
        next.state = SessionState::Blocked;
        next.block_reason = Some(reason.to_string());
        self.stores.sessions.update(&next).await?;
        *record = next.clone();

        metrics::counter!("session_transitions_total", "to" => "blocked").increment(1);
        tracing::warn!(attempt_id, reason, "Session blocked");
        self.broadcaster.publish(
            &next.exam_id,
            RoomEvent::SessionBlocked {
                attempt_id: attempt_id.to_string(),
                reason: reason.to_string(),
                at: format_offset(self.clock.now()),
            },
        );
        drop(record);
        Ok(SessionState::Blocked)
    }

    /// Teacher-only. A concurrent second unlock is a no-op that observes the
    /// post-transition state; only the winner mints a token.
    pub(crate) async fn unlock(&self, attempt_id: &str) -> Result<UnlockOutcome, SessionError> {
        let slot = self.registry.slot(attempt_id).ok_or(SessionError::AttemptUnknown)?;
        let mut record = slot.lock().await;

        if record.state.is_terminal() {
            return Err(SessionError::Terminal);
        }
        if record.state != SessionState::Blocked {
            return Ok(UnlockOutcome { state: record.state, resume_token: None });
        }

        let raw_token = tokens::generate_session_token();
        let hash = tokens::hash_token(&raw_token);
        let mut next = record.clone();
        next.state = SessionState::Active;
        next.token_hash = hash.clone();
        next.override_hash = Some(hash);
        next.block_reason = None;
        self.stores.sessions.update(&next).await?;
        *record = next.clone();

        metrics::counter!("session_transitions_total", "to" => "active").increment(1);
        tracing::info!(attempt_id, "Session unlocked by teacher");
        self.broadcaster.publish(
            &next.exam_id,
            RoomEvent::SessionUnlocked {
                attempt_id: attempt_id.to_string(),
                at: format_offset(self.clock.now()),
            },
        );
        drop(record);
        Ok(UnlockOutcome { state: SessionState::Active, resume_token: Some(raw_token) })
    }

    pub(crate) async fn abandon(
        &self,
        attempt_id: &str,
        actor: Actor<'_>,
        cause: AbandonCause,
    ) -> Result<SessionState, SessionError> {
        // Everything grading might need is fetched before the critical
        // section; the expiration sweep shares this exact path.
        let mut attempt = self
            .stores
            .attempts
            .find_by_id(attempt_id)
            .await?
            .ok_or(SessionError::AttemptUnknown)?;
        let exam = self
            .stores
            .catalog
            .exam(&attempt.exam_id)
            .await?
            .ok_or_else(|| SessionError::Store(format!("exam {} missing from catalog", attempt.exam_id)))?;
        let mut answers = self.stores.answers.list_by_attempt(attempt_id).await?;

        let slot = self.registry.slot(attempt_id).ok_or(SessionError::AttemptUnknown)?;
        let mut record = slot.lock().await;

        if record.state.is_terminal() {
            return Err(SessionError::Terminal);
        }
        verify_actor(&record, &actor)?;

        let now = self.clock.now();
        let mut next = record.clone();
        next.state = SessionState::Abandoned;
        next.ended_at = Some(now);

        attempt.finished_at = Some(now);
        if exam.grade_on_abandon && !attempt.pdf_mode {
            let aggregate =
                aggregate::grade_attempt(&exam.questions, &mut answers, self.policy.scale_max);
            for answer in &answers {
                self.stores.answers.upsert(attempt_id, answer).await?;
            }
            apply_aggregate(&mut attempt, &aggregate);
        }

        self.stores.attempts.update(&attempt).await?;
        self.stores.sessions.update(&next).await?;
        *record = next.clone();

        metrics::counter!("session_transitions_total", "to" => "abandoned").increment(1);
        tracing::info!(attempt_id, cause = cause.as_str(), "Session abandoned");
        self.broadcaster.publish(
            &next.exam_id,
            RoomEvent::SessionAbandoned {
                attempt_id: attempt_id.to_string(),
                cause: cause.as_str().to_string(),
                at: format_offset(now),
            },
        );
        drop(record);
        Ok(SessionState::Abandoned)
    }

    /// Finishing grades synchronously and is idempotent: a second call
    /// returns the stored result without re-running the engine.
    pub(crate) async fn finish(
        &self,
        attempt_id: &str,
        token: &str,
    ) -> Result<FinishOutcome, SessionError> {
        let mut attempt = self
            .stores
            .attempts
            .find_by_id(attempt_id)
            .await?
            .ok_or(SessionError::AttemptUnknown)?;
        let exam = self
            .stores
            .catalog
            .exam(&attempt.exam_id)
            .await?
            .ok_or_else(|| SessionError::Store(format!("exam {} missing from catalog", attempt.exam_id)))?;
        let mut answers = self.stores.answers.list_by_attempt(attempt_id).await?;

        let slot = self.registry.slot(attempt_id).ok_or(SessionError::AttemptUnknown)?;
        let mut record = slot.lock().await;

        if !tokens::token_matches(token, &record.token_hash) {
            return Err(SessionError::InvalidToken);
        }
        match record.state {
            SessionState::Finished => {
                return Ok(FinishOutcome {
                    score: attempt.score,
                    max_score: attempt.max_score,
                    percentage: attempt.percentage,
                    grade: attempt.grade,
                    needs_review: attempt.needs_review,
                });
            }
            SessionState::Abandoned => return Err(SessionError::Terminal),
            _ => {}
        }

        let now = self.clock.now();
        let outcome = if attempt.pdf_mode {
            // Holistic path: no per-question grading, the teacher scores the
            // whole attempt afterwards.
            attempt.needs_review = true;
            FinishOutcome {
                score: None,
                max_score: None,
                percentage: None,
                grade: None,
                needs_review: true,
            }
        } else {
            let aggregate =
                aggregate::grade_attempt(&exam.questions, &mut answers, self.policy.scale_max);
            if self.policy.strict_manual_grading && aggregate.needs_review() {
                return Err(SessionError::GradingIncomplete {
                    question_ids: aggregate.pending_manual,
                });
            }
            for answer in &answers {
                self.stores.answers.upsert(attempt_id, answer).await?;
            }
            apply_aggregate(&mut attempt, &aggregate);
            FinishOutcome {
                score: Some(aggregate.score),
                max_score: Some(aggregate.max_score),
                percentage: Some(aggregate.percentage),
                grade: Some(aggregate.grade),
                needs_review: aggregate.needs_review(),
            }
        };

        attempt.finished_at = Some(now);
        let mut next = record.clone();
        next.state = SessionState::Finished;
        next.ended_at = Some(now);

        self.stores.attempts.update(&attempt).await?;
        self.stores.sessions.update(&next).await?;
        *record = next.clone();

        metrics::counter!("session_transitions_total", "to" => "finished").increment(1);
        metrics::counter!("attempts_graded_total").increment(1);
        tracing::info!(attempt_id, score = ?outcome.score, "Session finished");
        self.broadcaster.publish(
            &next.exam_id,
            RoomEvent::SessionFinished {
                attempt_id: attempt_id.to_string(),
                score: outcome.score,
                max_score: outcome.max_score,
                grade: outcome.grade,
                at: format_offset(now),
            },
        );
        drop(record);

        Ok(outcome)
    }

    /// Accepts one answer. Writes for different questions of the same
    /// attempt run concurrently; the session lock is only taken long enough
    /// to check state and token.
    pub(crate) async fn submit_answer(
        &self,
        attempt_id: &str,
        token: &str,
        question_id: &str,
        value: AnswerValue,
    ) -> Result<SubmitOutcome, SessionError> {
        let snapshot = self
            .registry
            .snapshot(attempt_id)
            .await
            .ok_or(SessionError::AttemptUnknown)?;
        if snapshot.state.is_terminal() {
            return Err(SessionError::Terminal);
        }
        if snapshot.state != SessionState::Active {
            return Err(SessionError::Suspended);
        }
        if !tokens::token_matches(token, &snapshot.token_hash) {
            return Err(SessionError::InvalidToken);
        }

        let mut attempt = self
            .stores
            .attempts
            .find_by_id(attempt_id)
            .await?
            .ok_or(SessionError::AttemptUnknown)?;
        let exam = self
            .stores
            .catalog
            .exam(&attempt.exam_id)
            .await?
            .ok_or_else(|| SessionError::Store(format!("exam {} missing from catalog", attempt.exam_id)))?;
        let question = exam
            .question(question_id)
            .ok_or_else(|| SessionError::Validation(format!("unknown question id: {question_id}")))?;
        validate_answer_shape(question, &value).map_err(SessionError::Validation)?;

        let answer = Answer::submitted(question_id, value, self.clock.now());
        self.stores.answers.upsert(attempt_id, &answer).await?;

        let answered = self.stores.answers.list_by_attempt(attempt_id).await?.len();
        let total = exam.questions.len().max(1);
        attempt.progress = ((answered * 100) / total).min(100) as u8;
        self.stores.attempts.update(&attempt).await?;

        metrics::counter!("answers_submitted_total").increment(1);
        Ok(SubmitOutcome { progress: attempt.progress })
    }

    /// Proctoring telemetry is accepted in any non-terminal state; a blocked
    /// client still reports.
    pub(crate) async fn report_event(
        &self,
        attempt_id: &str,
        token: &str,
        kind: EventKind,
        payload: serde_json::Value,
    ) -> Result<String, SessionError> {
        let snapshot = self
            .registry
            .snapshot(attempt_id)
            .await
            .ok_or(SessionError::AttemptUnknown)?;
        if snapshot.state.is_terminal() {
            return Err(SessionError::Terminal);
        }
        if !tokens::token_matches(token, &snapshot.token_hash) {
            return Err(SessionError::InvalidToken);
        }

        let now = self.clock.now();
        let event = ProctorEvent {
            id: Uuid::new_v4().to_string(),
            attempt_id: attempt_id.to_string(),
            exam_id: snapshot.exam_id.clone(),
            kind,
            payload: payload.clone(),
            created_at: now,
            read: false,
        };
        self.stores.events.create(&event).await?;

        metrics::counter!("proctor_events_total", "kind" => kind.as_str()).increment(1);
        self.broadcaster.publish(
            &snapshot.exam_id,
            RoomEvent::ProctorEvent {
                attempt_id: attempt_id.to_string(),
                event_id: event.id.clone(),
                kind: kind.as_str().to_string(),
                payload,
                at: format_offset(now),
            },
        );
        Ok(event.id)
    }

    /// Teacher grade entry. With a question id this is a per-question manual
    /// grade; without one it is the holistic grade used for PDF-mode
    /// attempts (and final-grade overrides on regular ones).
    pub(crate) async fn override_grade(
        &self,
        attempt_id: &str,
        question_id: Option<&str>,
        score: f64,
        feedback: Option<String>,
    ) -> Result<Attempt, SessionError> {
        let mut attempt = self
            .stores
            .attempts
            .find_by_id(attempt_id)
            .await?
            .ok_or(SessionError::AttemptUnknown)?;

        let Some(question_id) = question_id else {
            if !(0.0..=self.policy.scale_max).contains(&score) {
                return Err(SessionError::Validation(format!(
                    "holistic score must be within 0..={}",
                    self.policy.scale_max
                )));
            }
            attempt.holistic = Some(HolisticGrade { score, feedback });
            attempt.grade = Some(score);
            attempt.needs_review = false;
            self.stores.attempts.update(&attempt).await?;
            metrics::counter!("grade_overrides_total", "scope" => "holistic").increment(1);
            return Ok(attempt);
        };

        let exam = self
            .stores
            .catalog
            .exam(&attempt.exam_id)
            .await?
            .ok_or_else(|| SessionError::Store(format!("exam {} missing from catalog", attempt.exam_id)))?;
        let question = exam
            .question(question_id)
            .ok_or_else(|| SessionError::Validation(format!("unknown question id: {question_id}")))?;
        if !(0.0..=question.max_score).contains(&score) {
            return Err(SessionError::Validation(format!(
                "score must be within 0..={}",
                question.max_score
            )));
        }

        let mut answer = self
            .stores
            .answers
            .find(attempt_id, question_id)
            .await?
            .ok_or_else(|| {
                SessionError::Validation(format!("no submitted answer for question {question_id}"))
            })?;
        answer.score = Some(score);
        answer.feedback = feedback;
        answer.manually_graded = true;
        answer.anomaly = false;
        self.stores.answers.upsert(attempt_id, &answer).await?;

        // A finished attempt gets its aggregate recomputed; manual grades
        // win, so this never clobbers other teacher entries.
        if attempt.finished_at.is_some() && !attempt.pdf_mode {
            let mut answers = self.stores.answers.list_by_attempt(attempt_id).await?;
            let aggregate =
                aggregate::grade_attempt(&exam.questions, &mut answers, self.policy.scale_max);
            for answer in &answers {
                self.stores.answers.upsert(attempt_id, answer).await?;
            }
            apply_aggregate(&mut attempt, &aggregate);
        }
        self.stores.attempts.update(&attempt).await?;

        metrics::counter!("grade_overrides_total", "scope" => "question").increment(1);
        Ok(attempt)
    }
}

fn verify_actor(record: &SessionRecord, actor: &Actor<'_>) -> Result<(), SessionError> {
    match actor {
        Actor::Student { token } => {
            if tokens::token_matches(token, &record.token_hash) {
                Ok(())
            } else {
                Err(SessionError::InvalidToken)
            }
        }
        Actor::Teacher | Actor::System => Ok(()),
    }
}

fn apply_aggregate(attempt: &mut Attempt, aggregate: &AttemptAggregate) {
    attempt.score = Some(aggregate.score);
    attempt.max_score = Some(aggregate.max_score);
    attempt.percentage = Some(aggregate.percentage);
    attempt.needs_review = aggregate.needs_review();
    attempt.anomalies = aggregate.anomalies;
    // A holistic override outranks the computed grade.
    if attempt.holistic.is_none() {
        attempt.grade = Some(aggregate.grade);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::question::MatchPair;
    use crate::store::memory::memory_stores;
    use crate::test_support::{
        sample_catalog, sample_orchestrator_with_stores, sample_policy, test_epoch,
    };

    fn strict_policy() -> GradingPolicy {
        GradingPolicy { scale_max: 5.0, strict_manual_grading: true }
    }

    fn ctx(policy: GradingPolicy) -> (Arc<Orchestrator>, Stores, Clock) {
        let clock = Clock::manual(test_epoch());
        let stores = memory_stores(sample_catalog());
        let (orchestrator, _) =
            sample_orchestrator_with_stores(clock.clone(), policy, stores.clone());
        (orchestrator, stores, clock)
    }

    async fn submit_full_quiz(orchestrator: &Orchestrator, attempt_id: &str, token: &str) {
        orchestrator
            .submit_answer(
                attempt_id,
                token,
                "q1",
                AnswerValue::Selected { option_ids: vec!["a".into(), "c".into()] },
            )
            .await
            .unwrap();
        orchestrator
            .submit_answer(attempt_id, token, "q2", AnswerValue::Text { text: "paris".into() })
            .await
            .unwrap();
        orchestrator
            .submit_answer(
                attempt_id,
                token,
                "q3",
                AnswerValue::Blanks { values: vec!["cat".into(), "mat".into()] },
            )
            .await
            .unwrap();
        orchestrator
            .submit_answer(
                attempt_id,
                token,
                "q4",
                AnswerValue::Pairs {
                    pairs: vec![
                        MatchPair { left: "l1".into(), right: "r1".into() },
                        MatchPair { left: "l2".into(), right: "r2".into() },
                    ],
                },
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn start_issues_active_session_with_deadline() {
        let (orchestrator, _, _) = ctx(sample_policy());

        let outcome = orchestrator.start("QUIZ-1", Some("Ada".into())).await.unwrap();

        assert_eq!(outcome.state, SessionState::Active);
        assert_eq!(outcome.remaining_seconds, Some(3600));
        assert_eq!(outcome.expires_at, Some(test_epoch() + Duration::minutes(60)));
        assert!(!outcome.token.is_empty());
    }

    #[tokio::test]
    async fn start_rejects_unknown_and_revoked_codes() {
        let (orchestrator, _, _) = ctx(sample_policy());

        assert!(matches!(
            orchestrator.start("NOPE", None).await,
            Err(SessionError::CodeUnknown)
        ));
        assert!(matches!(
            orchestrator.start("GONE-1", None).await,
            Err(SessionError::CodeRevoked)
        ));
    }

    #[tokio::test]
    async fn concurrent_starts_on_one_code_have_one_winner() {
        let (orchestrator, _, _) = ctx(sample_policy());

        let mut handles = Vec::new();
        for _ in 0..16 {
            let orchestrator = orchestrator.clone();
            handles.push(tokio::spawn(async move { orchestrator.start("QUIZ-1", None).await }));
        }

        let mut winners = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => winners += 1,
                Err(SessionError::CodeInUse) => {}
                Err(other) => panic!("unexpected error: {other}"),
            }
        }
        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn spent_code_cannot_be_started_again() {
        let (orchestrator, _, _) = ctx(sample_policy());

        let started = orchestrator.start("QUIZ-1", None).await.unwrap();
        orchestrator.finish(&started.attempt_id, &started.token).await.unwrap();

        assert!(matches!(
            orchestrator.start("QUIZ-1", None).await,
            Err(SessionError::Terminal)
        ));
    }

    #[tokio::test]
    async fn resume_rotates_the_binding_token() {
        let (orchestrator, _, _) = ctx(sample_policy());

        let started = orchestrator.start("QUIZ-1", None).await.unwrap();
        let resumed = orchestrator.resume("QUIZ-1", &started.token).await.unwrap();
        assert_ne!(resumed.token, started.token);
        assert_eq!(resumed.remaining_seconds, Some(3600));

        // The pre-rotation token is dead, the fresh one works.
        assert!(matches!(
            orchestrator.resume("QUIZ-1", &started.token).await,
            Err(SessionError::InvalidToken)
        ));
        orchestrator.resume("QUIZ-1", &resumed.token).await.unwrap();
    }

    #[tokio::test]
    async fn stale_token_resume_leaves_session_untouched() {
        let (orchestrator, _, _) = ctx(sample_policy());

        let started = orchestrator.start("QUIZ-1", None).await.unwrap();
        assert!(matches!(
            orchestrator.resume("QUIZ-1", "garbage").await,
            Err(SessionError::InvalidToken)
        ));

        let snapshot =
            orchestrator.registry().snapshot(&started.attempt_id).await.unwrap();
        assert_eq!(snapshot.state, SessionState::Active);
        orchestrator.resume("QUIZ-1", &started.token).await.unwrap();
    }

    #[tokio::test]
    async fn paused_session_rejects_submissions() {
        let (orchestrator, _, _) = ctx(sample_policy());

        let started = orchestrator.start("QUIZ-1", None).await.unwrap();
        orchestrator.pause(&started.attempt_id, &started.token).await.unwrap();
        let again = orchestrator.pause(&started.attempt_id, &started.token).await.unwrap();
        assert_eq!(again, SessionState::Paused);

        let result = orchestrator
            .submit_answer(
                &started.attempt_id,
                &started.token,
                "q2",
                AnswerValue::Text { text: "paris".into() },
            )
            .await;
        assert!(matches!(result, Err(SessionError::Suspended)));
    }

    #[tokio::test]
    async fn blocked_session_reopens_only_through_unlock() {
        let (orchestrator, _, _) = ctx(sample_policy());

        let started = orchestrator.start("QUIZ-1", None).await.unwrap();
        orchestrator
            .block(&started.attempt_id, Actor::Teacher, "tab switching")
            .await
            .unwrap();

        // The pre-block token no longer resumes.
        assert!(matches!(
            orchestrator.resume("QUIZ-1", &started.token).await,
            Err(SessionError::InvalidToken)
        ));

        let unlocked = orchestrator.unlock(&started.attempt_id).await.unwrap();
        let resume_token = unlocked.resume_token.expect("unlock mints a token");
        let resumed = orchestrator.resume("QUIZ-1", &resume_token).await.unwrap();
        assert_eq!(resumed.state, SessionState::Active);

        // Unlock on an already-active session is a no-op.
        let second = orchestrator.unlock(&started.attempt_id).await.unwrap();
        assert_eq!(second.state, SessionState::Active);
        assert!(second.resume_token.is_none());
    }

    #[tokio::test]
    async fn concurrent_unlocks_mint_exactly_one_token() {
        let (orchestrator, _, _) = ctx(sample_policy());

        let started = orchestrator.start("QUIZ-1", None).await.unwrap();
        orchestrator.block(&started.attempt_id, Actor::Teacher, "left the room").await.unwrap();

        let first = orchestrator.clone();
        let second = orchestrator.clone();
        let attempt_one = started.attempt_id.clone();
        let attempt_two = started.attempt_id.clone();
        let (one, two) = tokio::join!(
            tokio::spawn(async move { first.unlock(&attempt_one).await }),
            tokio::spawn(async move { second.unlock(&attempt_two).await }),
        );

        let one = one.unwrap().unwrap();
        let two = two.unwrap().unwrap();
        assert_eq!(one.state, SessionState::Active);
        assert_eq!(two.state, SessionState::Active);
        assert_eq!(
            one.resume_token.is_some() as u8 + two.resume_token.is_some() as u8,
            1
        );
    }

    #[tokio::test]
    async fn finish_grades_once_and_is_idempotent() {
        let (orchestrator, _, _) = ctx(sample_policy());

        let started = orchestrator.start("QUIZ-1", None).await.unwrap();
        submit_full_quiz(&orchestrator, &started.attempt_id, &started.token).await;

        let first = orchestrator.finish(&started.attempt_id, &started.token).await.unwrap();
        assert_eq!(first.score, Some(10.0));
        assert_eq!(first.max_score, Some(10.0));
        assert_eq!(first.percentage, Some(100.0));
        assert_eq!(first.grade, Some(5.0));
        assert!(!first.needs_review);

        let second = orchestrator.finish(&started.attempt_id, &started.token).await.unwrap();
        assert_eq!(second.score, first.score);
        assert_eq!(second.grade, first.grade);

        let late = orchestrator
            .submit_answer(
                &started.attempt_id,
                &started.token,
                "q2",
                AnswerValue::Text { text: "late".into() },
            )
            .await;
        assert!(matches!(late, Err(SessionError::Terminal)));
    }

    #[tokio::test]
    async fn submissions_move_progress() {
        let (orchestrator, _, _) = ctx(sample_policy());

        let started = orchestrator.start("QUIZ-1", None).await.unwrap();
        let outcome = orchestrator
            .submit_answer(
                &started.attempt_id,
                &started.token,
                "q2",
                AnswerValue::Text { text: "paris".into() },
            )
            .await
            .unwrap();
        assert_eq!(outcome.progress, 25);

        submit_full_quiz(&orchestrator, &started.attempt_id, &started.token).await;
        let snapshot = orchestrator
            .submit_answer(
                &started.attempt_id,
                &started.token,
                "q2",
                AnswerValue::Text { text: "paris".into() },
            )
            .await
            .unwrap();
        assert_eq!(snapshot.progress, 100);
    }

    #[tokio::test]
    async fn malformed_submission_is_rejected() {
        let (orchestrator, _, _) = ctx(sample_policy());

        let started = orchestrator.start("QUIZ-1", None).await.unwrap();
        let wrong_shape = orchestrator
            .submit_answer(
                &started.attempt_id,
                &started.token,
                "q1",
                AnswerValue::Text { text: "a".into() },
            )
            .await;
        assert!(matches!(wrong_shape, Err(SessionError::Validation(_))));

        let unknown_question = orchestrator
            .submit_answer(
                &started.attempt_id,
                &started.token,
                "q99",
                AnswerValue::Text { text: "a".into() },
            )
            .await;
        assert!(matches!(unknown_question, Err(SessionError::Validation(_))));
    }

    #[tokio::test]
    async fn strict_manual_grading_blocks_finish() {
        let (orchestrator, _, _) = ctx(strict_policy());

        let started = orchestrator.start("ESSAY-1", None).await.unwrap();
        orchestrator
            .submit_answer(
                &started.attempt_id,
                &started.token,
                "e1",
                AnswerValue::Text { text: "an essay".into() },
            )
            .await
            .unwrap();

        let result = orchestrator.finish(&started.attempt_id, &started.token).await;
        match result {
            Err(SessionError::GradingIncomplete { question_ids }) => {
                assert_eq!(question_ids, vec!["e1".to_string()]);
            }
            other => panic!("expected GradingIncomplete, got {other:?}"),
        }

        // The rejection left the session active.
        let snapshot =
            orchestrator.registry().snapshot(&started.attempt_id).await.unwrap();
        assert_eq!(snapshot.state, SessionState::Active);
    }

    #[tokio::test]
    async fn pdf_mode_finish_skips_the_engine() {
        let (orchestrator, stores, _) = ctx(sample_policy());

        let started = orchestrator.start("PDF-1", None).await.unwrap();
        let outcome = orchestrator.finish(&started.attempt_id, &started.token).await.unwrap();

        assert_eq!(outcome.score, None);
        assert!(outcome.needs_review);

        let attempt = stores.attempts.find_by_id(&started.attempt_id).await.unwrap().unwrap();
        assert!(attempt.needs_review);
        assert_eq!(attempt.score, None);
    }

    #[tokio::test]
    async fn abandon_grades_when_the_exam_opts_in() {
        let (orchestrator, stores, _) = ctx(sample_policy());

        let started = orchestrator.start("ESSAY-1", None).await.unwrap();
        orchestrator
            .submit_answer(
                &started.attempt_id,
                &started.token,
                "e2",
                AnswerValue::Selected { option_ids: vec!["a".into()] },
            )
            .await
            .unwrap();

        let state = orchestrator
            .abandon(&started.attempt_id, Actor::System, AbandonCause::Left)
            .await
            .unwrap();
        assert_eq!(state, SessionState::Abandoned);

        let attempt = stores.attempts.find_by_id(&started.attempt_id).await.unwrap().unwrap();
        assert_eq!(attempt.score, Some(5.0));
        assert_eq!(attempt.max_score, Some(10.0));

        assert!(matches!(
            orchestrator
                .abandon(&started.attempt_id, Actor::System, AbandonCause::Left)
                .await,
            Err(SessionError::Terminal)
        ));
    }

    #[tokio::test]
    async fn expired_session_is_abandoned_by_the_system() {
        let (orchestrator, _, clock) = ctx(sample_policy());

        let started = orchestrator.start("QUIZ-1", None).await.unwrap();
        clock.advance(Duration::minutes(61));

        let expired = orchestrator.registry().expired_candidates(clock.now()).await;
        assert_eq!(expired, vec![started.attempt_id.clone()]);

        orchestrator
            .abandon(&started.attempt_id, Actor::System, AbandonCause::Expired)
            .await
            .unwrap();
        assert!(matches!(
            orchestrator.resume("QUIZ-1", &started.token).await,
            Err(SessionError::Terminal)
        ));
    }

    #[tokio::test]
    async fn manual_override_recomputes_a_finished_attempt() {
        let (orchestrator, _, _) = ctx(sample_policy());

        let started = orchestrator.start("QUIZ-1", None).await.unwrap();
        orchestrator
            .submit_answer(
                &started.attempt_id,
                &started.token,
                "q2",
                AnswerValue::Text { text: "lyon".into() },
            )
            .await
            .unwrap();
        let finished = orchestrator.finish(&started.attempt_id, &started.token).await.unwrap();
        assert_eq!(finished.score, Some(0.0));

        let attempt = orchestrator
            .override_grade(&started.attempt_id, Some("q2"), 2.0, Some("close enough".into()))
            .await
            .unwrap();
        assert_eq!(attempt.score, Some(2.0));
        assert_eq!(attempt.percentage, Some(20.0));
        assert_eq!(attempt.grade, Some(1.0));

        // Out-of-range scores and ungraded questions are rejected.
        assert!(matches!(
            orchestrator.override_grade(&started.attempt_id, Some("q2"), 99.0, None).await,
            Err(SessionError::Validation(_))
        ));
        assert!(matches!(
            orchestrator.override_grade(&started.attempt_id, Some("q3"), 1.0, None).await,
            Err(SessionError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn holistic_grade_outranks_the_computed_one() {
        let (orchestrator, _, _) = ctx(sample_policy());

        let started = orchestrator.start("PDF-1", None).await.unwrap();
        orchestrator.finish(&started.attempt_id, &started.token).await.unwrap();

        assert!(matches!(
            orchestrator.override_grade(&started.attempt_id, None, 7.0, None).await,
            Err(SessionError::Validation(_))
        ));

        let attempt = orchestrator
            .override_grade(&started.attempt_id, None, 4.5, Some("solid work".into()))
            .await
            .unwrap();
        assert_eq!(attempt.grade, Some(4.5));
        assert!(!attempt.needs_review);
    }

    #[tokio::test]
    async fn room_events_follow_the_applied_transition_order() {
        let clock = Clock::manual(test_epoch());
        let stores = memory_stores(sample_catalog());
        let registry = Arc::new(SessionRegistry::new());
        let broadcaster = ExamBroadcaster::new(1024);
        let orchestrator = Arc::new(Orchestrator::new(
            registry,
            stores,
            broadcaster.clone(),
            clock,
            sample_policy(),
        ));

        let started = orchestrator.start("QUIZ-1", None).await.unwrap();
        let mut rx = broadcaster.subscribe("exam-quiz");

        // Two racing callers hammer the same session; each applied
        // transition must reach the room in the order it committed, so the
        // stream has to alternate strictly between blocked and unlocked.
        let mut handles = Vec::new();
        for _ in 0..2 {
            let orchestrator = orchestrator.clone();
            let attempt_id = started.attempt_id.clone();
            handles.push(tokio::spawn(async move {
                for _ in 0..50 {
                    orchestrator
                        .block(&attempt_id, Actor::Teacher, "left the seat")
                        .await
                        .unwrap();
                    orchestrator.unlock(&attempt_id).await.unwrap();
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let mut expect_blocked = true;
        loop {
            match rx.try_recv() {
                Ok(RoomEvent::SessionBlocked { .. }) => {
                    assert!(expect_blocked, "blocked event out of order");
                    expect_blocked = false;
                }
                Ok(RoomEvent::SessionUnlocked { .. }) => {
                    assert!(!expect_blocked, "unlocked event out of order");
                    expect_blocked = true;
                }
                Ok(other) => panic!("unexpected event: {other:?}"),
                Err(tokio::sync::broadcast::error::TryRecvError::Empty) => break,
                Err(err) => panic!("receiver error: {err}"),
            }
        }
    }

    #[tokio::test]
    async fn proctor_events_are_accepted_while_blocked_but_not_after_finish() {
        let (orchestrator, stores, _) = ctx(sample_policy());

        let started = orchestrator.start("QUIZ-1", None).await.unwrap();
        orchestrator.block(&started.attempt_id, Actor::Teacher, "suspicious").await.unwrap();

        let event_id = orchestrator
            .report_event(
                &started.attempt_id,
                &started.token,
                EventKind::FocusLost,
                serde_json::json!({"duration_ms": 4200}),
            )
            .await
            .unwrap();
        let events = stores.events.list_by_attempt(&started.attempt_id, false).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].id, event_id);

        orchestrator.unlock(&started.attempt_id).await.unwrap();
        orchestrator
            .abandon(&started.attempt_id, Actor::Teacher, AbandonCause::Left)
            .await
            .unwrap();
        assert!(matches!(
            orchestrator
                .report_event(
                    &started.attempt_id,
                    &started.token,
                    EventKind::Disconnect,
                    serde_json::json!({}),
                )
                .await,
            Err(SessionError::Terminal)
        ));
    }
}
