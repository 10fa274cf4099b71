use anyhow::Result;

use crate::core::state::AppState;
use crate::domain::types::AbandonCause;
use crate::session::{Actor, SessionError};

/// Abandons every session whose deadline has passed. Goes through the same
/// transition path as a student leaving, so grading policy and broadcasting
/// behave identically.
pub(crate) async fn sweep_expired(state: &AppState) -> Result<()> {
    let now = state.clock().now();
    let candidates = state.registry().expired_candidates(now).await;

    if candidates.is_empty() {
        return Ok(());
    }

    let mut swept = 0;
    for attempt_id in candidates {
        match state
            .orchestrator()
            .abandon(&attempt_id, Actor::System, AbandonCause::Expired)
            .await
        {
            Ok(_) => swept += 1,
            // Lost the race against a concurrent finish or leave.
            Err(SessionError::Terminal) => {}
            Err(err) => {
                tracing::error!(attempt_id, error = %err, "Failed to abandon expired session");
            }
        }
    }

    if swept > 0 {
        tracing::info!(swept_sessions = swept, "Abandoned expired sessions");
    }
    metrics::counter!("sessions_expired_total").increment(swept as u64);

    Ok(())
}
