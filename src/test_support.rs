use std::sync::{Arc, OnceLock};

use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request},
    Router,
};
use time::macros::datetime;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::api;
use crate::broadcast::ExamBroadcaster;
use crate::core::clock::Clock;
use crate::core::config::Settings;
use crate::core::security::{self, ROLE_TEACHER};
use crate::core::state::AppState;
use crate::domain::question::{
    CodeGrant, ExamDef, MatchItem, MatchPair, Question, QuestionKind, TestOption,
};
use crate::session::orchestrator::{GradingPolicy, Orchestrator};
use crate::session::SessionRegistry;
use crate::store::memory::{memory_stores, MemoryCatalog};
use crate::store::Stores;

const TEST_SECRET_KEY: &str = "test-secret";

pub(crate) struct TestContext {
    pub(crate) state: AppState,
    pub(crate) app: Router,
    pub(crate) clock: Clock,
    _guard: OwnedMutexGuard<()>,
}

fn shared_lock() -> Arc<Mutex<()>> {
    static LOCK: OnceLock<Arc<Mutex<()>>> = OnceLock::new();
    LOCK.get_or_init(|| Arc::new(Mutex::new(()))).clone()
}

pub(crate) async fn env_lock() -> OwnedMutexGuard<()> {
    shared_lock().lock_owned().await
}

pub(crate) fn env_lock_blocking() -> OwnedMutexGuard<()> {
    shared_lock().blocking_lock_owned()
}

pub(crate) fn set_test_env() {
    dotenvy::dotenv().ok();

    std::env::set_var("EXAMGATE_ENV", "test");
    std::env::set_var("EXAMGATE_STRICT_CONFIG", "0");
    std::env::set_var("SECRET_KEY", TEST_SECRET_KEY);
    std::env::set_var("PROMETHEUS_ENABLED", "0");
    std::env::remove_var("CATALOG_PATH");
    std::env::remove_var("BROADCAST_BUFFER");
    std::env::remove_var("SWEEP_INTERVAL_SECONDS");
    std::env::remove_var("GRADE_SCALE_MAX");
    std::env::remove_var("STRICT_MANUAL_GRADING");
    std::env::remove_var("BACKEND_CORS_ORIGINS");
}

/// Fixture time: all manual clocks start here.
pub(crate) fn test_epoch() -> time::OffsetDateTime {
    datetime!(2026-03-01 09:00:00 UTC)
}

/// Auto-gradable exam with a 60 minute limit: single/multi choice, exact
/// open answer, fill-in blanks and matching, 10 points total.
pub(crate) fn quiz_exam() -> ExamDef {
    ExamDef {
        id: "exam-quiz".into(),
        title: "Algebra quiz".into(),
        time_limit_minutes: Some(60),
        grade_on_abandon: false,
        questions: vec![
            Question {
                id: "q1".into(),
                prompt: "Pick the primes".into(),
                max_score: 4.0,
                partial_credit: true,
                kind: QuestionKind::Test {
                    options: vec![
                        TestOption { id: "a".into(), text: "2".into(), correct: true },
                        TestOption { id: "b".into(), text: "4".into(), correct: false },
                        TestOption { id: "c".into(), text: "5".into(), correct: true },
                    ],
                },
            },
            Question {
                id: "q2".into(),
                prompt: "Capital of France".into(),
                max_score: 2.0,
                partial_credit: false,
                kind: QuestionKind::Open { expected: Some("Paris".into()), keywords: vec![] },
            },
            Question {
                id: "q3".into(),
                prompt: "The __ sat on the __".into(),
                max_score: 2.0,
                partial_credit: true,
                kind: QuestionKind::FillBlanks { blanks: vec!["cat".into(), "mat".into()] },
            },
            Question {
                id: "q4".into(),
                prompt: "Match terms".into(),
                max_score: 2.0,
                partial_credit: true,
                kind: QuestionKind::Match {
                    left: vec![
                        MatchItem { id: "l1".into(), text: "sin".into() },
                        MatchItem { id: "l2".into(), text: "cos".into() },
                    ],
                    right: vec![
                        MatchItem { id: "r1".into(), text: "odd".into() },
                        MatchItem { id: "r2".into(), text: "even".into() },
                    ],
                    pairs: vec![
                        MatchPair { left: "l1".into(), right: "r1".into() },
                        MatchPair { left: "l2".into(), right: "r2".into() },
                    ],
                },
            },
        ],
    }
}

/// Untimed exam with a manual-only essay, graded on abandon.
pub(crate) fn essay_exam() -> ExamDef {
    ExamDef {
        id: "exam-essay".into(),
        title: "Essay exam".into(),
        time_limit_minutes: None,
        grade_on_abandon: true,
        questions: vec![
            Question {
                id: "e1".into(),
                prompt: "Discuss".into(),
                max_score: 5.0,
                partial_credit: false,
                kind: QuestionKind::Open { expected: None, keywords: vec![] },
            },
            Question {
                id: "e2".into(),
                prompt: "Pick one".into(),
                max_score: 5.0,
                partial_credit: false,
                kind: QuestionKind::Test {
                    options: vec![
                        TestOption { id: "a".into(), text: "yes".into(), correct: true },
                        TestOption { id: "b".into(), text: "no".into(), correct: false },
                    ],
                },
            },
        ],
    }
}

pub(crate) fn sample_catalog() -> MemoryCatalog {
    let grant = |code: &str, exam_id: &str| CodeGrant {
        code: code.into(),
        exam_id: exam_id.into(),
        student_name: None,
        pdf_mode: false,
        revoked: false,
    };

    MemoryCatalog::new(
        vec![quiz_exam(), essay_exam()],
        vec![
            grant("QUIZ-1", "exam-quiz"),
            grant("QUIZ-2", "exam-quiz"),
            grant("ESSAY-1", "exam-essay"),
            CodeGrant { pdf_mode: true, ..grant("PDF-1", "exam-quiz") },
            CodeGrant { revoked: true, ..grant("GONE-1", "exam-quiz") },
        ],
    )
}

pub(crate) fn sample_policy() -> GradingPolicy {
    GradingPolicy { scale_max: 5.0, strict_manual_grading: false }
}

pub(crate) fn sample_orchestrator_with_stores(
    clock: Clock,
    policy: GradingPolicy,
    stores: Stores,
) -> (Arc<Orchestrator>, ExamBroadcaster) {
    let registry = Arc::new(SessionRegistry::new());
    let broadcaster = ExamBroadcaster::new(16);
    let orchestrator = Arc::new(Orchestrator::new(
        registry,
        stores,
        broadcaster.clone(),
        clock,
        policy,
    ));
    (orchestrator, broadcaster)
}

pub(crate) async fn setup_test_context() -> TestContext {
    let guard = env_lock().await;
    set_test_env();

    let settings = Settings::load().expect("settings");
    let clock = Clock::manual(test_epoch());
    let stores = memory_stores(sample_catalog());

    let state = AppState::with_clock(settings, stores, clock.clone());
    let app = api::router::router(state.clone());

    TestContext { state, app, clock, _guard: guard }
}

pub(crate) fn teacher_token(settings: &Settings) -> String {
    security::create_access_token("teacher-1", ROLE_TEACHER, settings, None).expect("token")
}

pub(crate) fn json_request(
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<serde_json::Value>,
) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);

    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }

    if let Some(body) = body {
        let bytes = serde_json::to_vec(&body).expect("serialize body");
        builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(bytes))
            .expect("request body")
    } else {
        builder.body(Body::empty()).expect("request body")
    }
}

pub(crate) async fn read_json(response: axum::response::Response<Body>) -> serde_json::Value {
    let body = to_bytes(response.into_body(), usize::MAX).await.expect("response body");
    serde_json::from_slice(&body).unwrap_or_else(|err| {
        let body_text = String::from_utf8_lossy(&body);
        panic!("json parse: {err}; body: {body_text}");
    })
}
