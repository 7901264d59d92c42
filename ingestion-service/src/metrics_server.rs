use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

static PROM_HANDLE: OnceCell<PrometheusHandle> = OnceCell::new();

/// Install the global Prometheus recorder once and return its handle.
///
/// The status service renders the handle on `GET /metrics`; there is no
/// separate listener.
pub fn install() -> Result<PrometheusHandle, BuildError> {
    if let Some(handle) = PROM_HANDLE.get() {
        return Ok(handle.clone());
    }
    let handle = PrometheusBuilder::new().install_recorder()?;
    // Ignore error if the handle was already set by a concurrent caller.
    let _ = PROM_HANDLE.set(handle.clone());
    Ok(handle)
}

pub fn handle() -> Option<PrometheusHandle> {
    PROM_HANDLE.get().cloned()
}

pub fn record_run(status: &'static str, duration_secs: f64) {
    metrics::counter!("tauron_runs_total", "status" => status).increment(1);
    metrics::histogram!("tauron_run_duration_seconds").record(duration_secs);
}

pub fn record_dropped_row(reason: &'static str) {
    metrics::counter!("tauron_rows_dropped_total", "reason" => reason).increment(1);
}

pub fn record_upserted(count: u64) {
    metrics::counter!("tauron_records_upserted_total").increment(count);
}
