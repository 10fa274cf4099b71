use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use validator::Validate;

use crate::api::errors::ApiError;
use crate::api::guards::CurrentTeacher;
use crate::core::state::AppState;
use crate::domain::models::Attempt;
use crate::schemas::event::ProctorEventResponse;
use crate::schemas::grading::{AttemptReviewResponse, GradeOverrideRequest};
use crate::schemas::session::{SessionStateResponse, TeacherBlockRequest, UnlockSessionResponse};
use crate::session::Actor;

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/:attempt_id", get(get_attempt))
        .route("/:attempt_id/block", post(block))
        .route("/:attempt_id/unlock", post(unlock))
        .route("/:attempt_id/events", get(list_events))
        .route("/:attempt_id/events/:event_id/read", post(mark_event_read))
        .route("/:attempt_id/grade", post(grade))
}

#[derive(Debug, Deserialize)]
struct EventListQuery {
    #[serde(default)]
    unread_only: bool,
}

async fn get_attempt(
    State(state): State<AppState>,
    _teacher: CurrentTeacher,
    Path(attempt_id): Path<String>,
) -> Result<Json<AttemptReviewResponse>, ApiError> {
    let attempt = state
        .stores()
        .attempts
        .find_by_id(&attempt_id)
        .await
        .map_err(|err| ApiError::internal(err, "Failed to load attempt"))?
        .ok_or_else(|| ApiError::NotFound("attempt not found".to_string()))?;

    Ok(Json(review_response(&state, attempt).await?))
}

async fn block(
    State(state): State<AppState>,
    _teacher: CurrentTeacher,
    Path(attempt_id): Path<String>,
    Json(payload): Json<TeacherBlockRequest>,
) -> Result<Json<SessionStateResponse>, ApiError> {
    payload.validate().map_err(|err| ApiError::BadRequest(err.to_string()))?;

    let session_state =
        state.orchestrator().block(&attempt_id, Actor::Teacher, &payload.reason).await?;
    Ok(Json(SessionStateResponse { attempt_id, state: session_state }))
}

async fn unlock(
    State(state): State<AppState>,
    _teacher: CurrentTeacher,
    Path(attempt_id): Path<String>,
) -> Result<Json<UnlockSessionResponse>, ApiError> {
    let outcome = state.orchestrator().unlock(&attempt_id).await?;
    Ok(Json(UnlockSessionResponse {
        attempt_id,
        state: outcome.state,
        resume_token: outcome.resume_token,
    }))
}

async fn list_events(
    State(state): State<AppState>,
    _teacher: CurrentTeacher,
    Path(attempt_id): Path<String>,
    Query(query): Query<EventListQuery>,
) -> Result<Json<Vec<ProctorEventResponse>>, ApiError> {
    let events = state
        .stores()
        .events
        .list_by_attempt(&attempt_id, query.unread_only)
        .await
        .map_err(|err| ApiError::internal(err, "Failed to load proctor events"))?;

    Ok(Json(events.into_iter().map(ProctorEventResponse::from).collect()))
}

async fn mark_event_read(
    State(state): State<AppState>,
    _teacher: CurrentTeacher,
    Path((attempt_id, event_id)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    let marked = state
        .stores()
        .events
        .mark_read(&attempt_id, &event_id)
        .await
        .map_err(|err| ApiError::internal(err, "Failed to mark event read"))?;

    if marked {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound("event not found".to_string()))
    }
}

async fn grade(
    State(state): State<AppState>,
    _teacher: CurrentTeacher,
    Path(attempt_id): Path<String>,
    Json(payload): Json<GradeOverrideRequest>,
) -> Result<Json<AttemptReviewResponse>, ApiError> {
    payload.validate().map_err(|err| ApiError::BadRequest(err.to_string()))?;

    let attempt = state
        .orchestrator()
        .override_grade(&attempt_id, payload.question_id.as_deref(), payload.score, payload.feedback)
        .await?;

    Ok(Json(review_response(&state, attempt).await?))
}

async fn review_response(
    state: &AppState,
    attempt: Attempt,
) -> Result<AttemptReviewResponse, ApiError> {
    let session_state = state.registry().snapshot(&attempt.id).await.map(|record| record.state);
    let answers = state
        .stores()
        .answers
        .list_by_attempt(&attempt.id)
        .await
        .map_err(|err| ApiError::internal(err, "Failed to load answers"))?;

    Ok(AttemptReviewResponse::from_parts(attempt, session_state, answers))
}
