pub(crate) mod api;
pub(crate) mod broadcast;
pub(crate) mod core;
pub(crate) mod domain;
pub(crate) mod grading;
pub(crate) mod schemas;
pub(crate) mod services;
pub(crate) mod session;
pub(crate) mod store;
pub(crate) mod tasks;

#[cfg(test)]
mod test_support;

use tokio::sync::watch;

use crate::core::{config::Settings, state::AppState, telemetry};
use crate::store::memory::{memory_stores, MemoryCatalog};

pub async fn run() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = Settings::load()?;
    telemetry::init_tracing(&settings)?;
    core::metrics::init(&settings)?;

    let state = build_state(settings).await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweeper = tokio::spawn(tasks::scheduler::sweep_loop(state.clone(), shutdown_rx));

    let app = api::router::router(state.clone());
    let listener = tokio::net::TcpListener::bind(state.settings().server_addr()).await?;

    tracing::info!(
        host = %state.settings().server_host(),
        port = state.settings().server_port(),
        environment = %state.settings().runtime().environment.as_str(),
        "Examgate API listening"
    );

    let result =
        axum::serve(listener, app).with_graceful_shutdown(core::shutdown::shutdown_signal()).await;

    if shutdown_tx.send(true).is_err() {
        tracing::warn!("Failed to broadcast shutdown signal to the sweeper");
    }
    if let Err(err) = sweeper.await {
        tracing::error!(error = %err, "Sweeper join failed");
    }

    result?;

    Ok(())
}

pub async fn run_sweeper() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = Settings::load()?;
    telemetry::init_tracing(&settings)?;
    core::metrics::init(&settings)?;

    let state = build_state(settings).await?;

    tasks::scheduler::run(state).await
}

async fn build_state(settings: Settings) -> anyhow::Result<AppState> {
    let catalog = match &settings.catalog().path {
        Some(path) => {
            let catalog = MemoryCatalog::from_path(std::path::Path::new(path))?;
            tracing::info!(path = %path, exams = catalog.exam_count(), "Exam catalog loaded");
            catalog
        }
        None => {
            tracing::warn!("CATALOG_PATH not set, starting with an empty catalog");
            MemoryCatalog::empty()
        }
    };

    let state = AppState::new(settings, memory_stores(catalog));

    // Rebuild the live registry from whatever the session store still holds.
    let open = state.stores().sessions.list_open().await?;
    if !open.is_empty() {
        tracing::info!(sessions = open.len(), "Rehydrating open sessions");
    }
    state.registry().hydrate(open);

    Ok(state)
}
