use anyhow::Result;
use tokio::sync::watch;
use tokio::time::{interval, Duration};

use crate::core::state::AppState;
use crate::tasks::expiration;

/// Runs the expiration sweep until shutdown. The API process spawns this
/// next to the HTTP server; the standalone sweeper binary runs it alone.
pub(crate) async fn run(state: AppState) -> Result<()> {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let sweeper = tokio::spawn(sweep_loop(state, shutdown_rx));

    crate::core::shutdown::shutdown_signal().await;
    if shutdown_tx.send(true).is_err() {
        tracing::warn!("Failed to broadcast shutdown signal to background tasks");
    }

    if let Err(err) = sweeper.await {
        tracing::error!(error = %err, "Background task join failed");
    }

    Ok(())
}

pub(crate) async fn sweep_loop(state: AppState, mut shutdown: watch::Receiver<bool>) {
    let mut tick =
        interval(Duration::from_secs(state.settings().session().sweep_interval_seconds));
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = tick.tick() => {
                if let Err(err) = expiration::sweep_expired(&state).await {
                    tracing::error!(error = %err, "sweep_expired failed");
                }
            }
        }
    }
}
