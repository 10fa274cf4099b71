use std::convert::Infallible;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::routing::get;
use axum::{Json, Router};
use futures::stream::{Stream, StreamExt};
use tokio_stream::wrappers::BroadcastStream;

use crate::api::errors::ApiError;
use crate::api::guards::CurrentTeacher;
use crate::core::state::AppState;
use crate::schemas::exam::{LiveSessionResponse, LiveSessionsResponse};

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/:exam_id/stream", get(stream))
        .route("/:exam_id/sessions", get(live_sessions))
}

/// Live event stream of one exam room. No replay: a dashboard that connects
/// late catches up through the sessions snapshot below.
async fn stream(
    State(state): State<AppState>,
    _teacher: CurrentTeacher,
    Path(exam_id): Path<String>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    tracing::debug!(exam_id, "Teacher subscribed to exam room");

    let rx = state.broadcaster().subscribe(&exam_id);
    let stream = BroadcastStream::new(rx).filter_map(|result| async move {
        match result {
            Ok(event) => match serde_json::to_string(&event) {
                Ok(json) => Some(Ok(Event::default().event(event.event_name()).data(json))),
                Err(err) => {
                    tracing::warn!(error = %err, "Failed to serialize room event");
                    None
                }
            },
            Err(err) => {
                // Lagged receiver: skipped events are recoverable via the
                // sessions snapshot.
                tracing::warn!(error = %err, "Exam room stream lagged");
                None
            }
        }
    });

    Sse::new(stream).keep_alive(
        KeepAlive::new().interval(Duration::from_secs(15)).text("keep-alive"),
    )
}

async fn live_sessions(
    State(state): State<AppState>,
    _teacher: CurrentTeacher,
    Path(exam_id): Path<String>,
) -> Result<Json<LiveSessionsResponse>, ApiError> {
    let now = state.clock().now();
    let records = state.registry().snapshots_for_exam(&exam_id).await;

    let mut sessions = Vec::with_capacity(records.len());
    for record in records {
        let student_name = state
            .stores()
            .attempts
            .find_by_id(&record.attempt_id)
            .await
            .map_err(|err| ApiError::internal(err, "Failed to load attempt"))?
            .and_then(|attempt| attempt.student_name);
        sessions.push(LiveSessionResponse::from_record(record, student_name, now));
    }

    Ok(Json(LiveSessionsResponse { exam_id, sessions }))
}
