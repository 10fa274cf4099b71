use std::sync::OnceLock;

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::core::config::Settings;

static RECORDER: OnceLock<PrometheusHandle> = OnceLock::new();

/// Installs the global Prometheus recorder once. Disabled deployments skip
/// the install entirely and the /metrics route stays a 404; counters and
/// histograms recorded elsewhere become no-ops.
pub(crate) fn init(settings: &Settings) -> anyhow::Result<()> {
    if !settings.telemetry().prometheus_enabled {
        tracing::debug!("Prometheus exporter disabled");
        return Ok(());
    }
    if RECORDER.get().is_some() {
        return Ok(());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    let _ = RECORDER.set(handle);
    tracing::info!("Prometheus exporter installed");
    Ok(())
}

/// Current scrape body, None until the recorder is installed.
pub(crate) fn render() -> Option<String> {
    RECORDER.get().map(PrometheusHandle::render)
}
