use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use validator::Validate;

use crate::api::errors::ApiError;
use crate::core::clock::format_offset;
use crate::core::state::AppState;
use crate::domain::types::AbandonCause;
use crate::schemas::answer::{SubmitAnswerRequest, SubmitAnswerResponse};
use crate::schemas::event::{ReportEventRequest, ReportEventResponse};
use crate::schemas::session::{
    BlockSessionRequest, FinishSessionResponse, ResumeSessionRequest, ResumeSessionResponse,
    SessionStateResponse, SessionTokenRequest, StartSessionRequest, StartSessionResponse,
};
use crate::session::Actor;

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/start", post(start))
        .route("/resume", post(resume))
        .route("/:attempt_id/pause", post(pause))
        .route("/:attempt_id/block", post(block))
        .route("/:attempt_id/finish", post(finish))
        .route("/:attempt_id/leave", post(leave))
        .route("/:attempt_id/answers", post(submit_answer))
        .route("/:attempt_id/events", post(report_event))
}

async fn start(
    State(state): State<AppState>,
    Json(payload): Json<StartSessionRequest>,
) -> Result<(StatusCode, Json<StartSessionResponse>), ApiError> {
    payload.validate().map_err(|err| ApiError::BadRequest(err.to_string()))?;

    let outcome = state
        .orchestrator()
        .start(payload.access_code.trim(), payload.student_name)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(StartSessionResponse {
            attempt_id: outcome.attempt_id,
            token: outcome.token,
            state: outcome.state,
            expires_at: outcome.expires_at.map(format_offset),
            remaining_seconds: outcome.remaining_seconds,
        }),
    ))
}

async fn resume(
    State(state): State<AppState>,
    Json(payload): Json<ResumeSessionRequest>,
) -> Result<Json<ResumeSessionResponse>, ApiError> {
    payload.validate().map_err(|err| ApiError::BadRequest(err.to_string()))?;

    let outcome =
        state.orchestrator().resume(payload.access_code.trim(), &payload.token).await?;

    Ok(Json(ResumeSessionResponse {
        attempt_id: outcome.attempt_id,
        token: outcome.token,
        state: outcome.state,
        remaining_seconds: outcome.remaining_seconds,
    }))
}

async fn pause(
    State(state): State<AppState>,
    Path(attempt_id): Path<String>,
    Json(payload): Json<SessionTokenRequest>,
) -> Result<Json<SessionStateResponse>, ApiError> {
    payload.validate().map_err(|err| ApiError::BadRequest(err.to_string()))?;

    let session_state = state.orchestrator().pause(&attempt_id, &payload.token).await?;
    Ok(Json(SessionStateResponse { attempt_id, state: session_state }))
}

/// Self-report from the lockdown client, proving its claim with the token.
async fn block(
    State(state): State<AppState>,
    Path(attempt_id): Path<String>,
    Json(payload): Json<BlockSessionRequest>,
) -> Result<Json<SessionStateResponse>, ApiError> {
    payload.validate().map_err(|err| ApiError::BadRequest(err.to_string()))?;

    let session_state = state
        .orchestrator()
        .block(&attempt_id, Actor::Student { token: &payload.token }, &payload.reason)
        .await?;
    Ok(Json(SessionStateResponse { attempt_id, state: session_state }))
}

async fn finish(
    State(state): State<AppState>,
    Path(attempt_id): Path<String>,
    Json(payload): Json<SessionTokenRequest>,
) -> Result<Json<FinishSessionResponse>, ApiError> {
    payload.validate().map_err(|err| ApiError::BadRequest(err.to_string()))?;

    let outcome = state.orchestrator().finish(&attempt_id, &payload.token).await?;
    Ok(Json(FinishSessionResponse {
        attempt_id,
        score: outcome.score,
        max_score: outcome.max_score,
        percentage: outcome.percentage,
        grade: outcome.grade,
        needs_review: outcome.needs_review,
    }))
}

async fn leave(
    State(state): State<AppState>,
    Path(attempt_id): Path<String>,
    Json(payload): Json<SessionTokenRequest>,
) -> Result<Json<SessionStateResponse>, ApiError> {
    payload.validate().map_err(|err| ApiError::BadRequest(err.to_string()))?;

    let session_state = state
        .orchestrator()
        .abandon(&attempt_id, Actor::Student { token: &payload.token }, AbandonCause::Left)
        .await?;
    Ok(Json(SessionStateResponse { attempt_id, state: session_state }))
}

async fn submit_answer(
    State(state): State<AppState>,
    Path(attempt_id): Path<String>,
    Json(payload): Json<SubmitAnswerRequest>,
) -> Result<Json<SubmitAnswerResponse>, ApiError> {
    payload.validate().map_err(|err| ApiError::BadRequest(err.to_string()))?;

    let outcome = state
        .orchestrator()
        .submit_answer(&attempt_id, &payload.token, &payload.question_id, payload.value)
        .await?;
    Ok(Json(SubmitAnswerResponse { accepted: true, progress: outcome.progress }))
}

async fn report_event(
    State(state): State<AppState>,
    Path(attempt_id): Path<String>,
    Json(payload): Json<ReportEventRequest>,
) -> Result<(StatusCode, Json<ReportEventResponse>), ApiError> {
    payload.validate().map_err(|err| ApiError::BadRequest(err.to_string()))?;

    let event_id = state
        .orchestrator()
        .report_event(&attempt_id, &payload.token, payload.kind, payload.payload)
        .await?;
    Ok((StatusCode::CREATED, Json(ReportEventResponse { event_id })))
}
