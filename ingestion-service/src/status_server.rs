use std::{net::SocketAddr, sync::Arc};

use askama::Template;
use axum::{
    extract::State,
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::get,
    Json, Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Serialize;

use crate::{
    config::ScheduleSpec,
    ledger::{RunLedger, RunRecord, RunStatus},
    pipeline::{Pipeline, RunOptions},
};

pub const PAGE_RUN_LIMIT: usize = 50;
pub const API_RUN_LIMIT: usize = 100;
pub const RUN_NOW_ACK: &str = "Manual run started. Check logs for status.";
const TIMEZONE_NAME: &str = "Europe/Warsaw";
const DISPLAY_FORMAT_LABEL: &str = "HH:MM:SS DD/MM/YYYY";

/// Read-only view of the ledger and schedule, plus the manual trigger.
pub struct StatusState {
    pub schedule: ScheduleSpec,
    pub pipeline: Arc<Pipeline>,
    pub metrics: Option<PrometheusHandle>,
}

impl StatusState {
    fn ledger(&self) -> &RunLedger {
        self.pipeline.ledger()
    }
}

pub fn router(state: Arc<StatusState>) -> Router {
    Router::new()
        .route("/", get(status_page))
        .route("/api/runs", get(api_runs))
        .route("/api/schedule", get(api_schedule))
        .route("/run-now", get(run_now).post(run_now))
        .route("/metrics", get(render_metrics))
        .with_state(state)
}

/// Serve on all interfaces until Ctrl-C or a listener failure.
pub async fn serve(port: u16, state: Arc<StatusState>) -> std::io::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "status server listening");
    axum::serve(listener, router(state).into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("status server shutting down");
}

#[derive(Debug, Serialize)]
struct RunView {
    time: String,
    time_pl: String,
    status: RunStatus,
    message: String,
    records: usize,
    #[serde(rename = "durationMs")]
    duration_ms: u64,
}

impl From<RunRecord> for RunView {
    fn from(r: RunRecord) -> Self {
        Self {
            time: r.time.to_rfc3339(),
            time_pl: r.display_time(),
            status: r.status,
            message: r.message,
            records: r.records,
            duration_ms: r.duration_ms,
        }
    }
}

#[derive(Debug, Serialize)]
struct ScheduleView<'a> {
    times: &'a [String],
    timezone: &'static str,
    format: &'static str,
}

async fn read_runs(state: &StatusState, limit: usize) -> Result<Vec<RunRecord>, Response> {
    state.ledger().read_recent(limit).await.map_err(|e| {
        tracing::error!(error = %e, "failed to read run ledger");
        (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
    })
}

async fn api_runs(State(state): State<Arc<StatusState>>) -> Result<Json<Vec<RunView>>, Response> {
    let runs = read_runs(&state, API_RUN_LIMIT).await?;
    Ok(Json(runs.into_iter().map(RunView::from).collect()))
}

async fn api_schedule(State(state): State<Arc<StatusState>>) -> Response {
    Json(ScheduleView {
        times: state.schedule.times(),
        timezone: TIMEZONE_NAME,
        format: DISPLAY_FORMAT_LABEL,
    })
    .into_response()
}

async fn run_now(State(state): State<Arc<StatusState>>) -> &'static str {
    let pipeline = state.pipeline.clone();
    tokio::spawn(async move {
        tracing::info!("manual run started");
        // Outcome is recorded in the ledger.
        let _ = pipeline.run(RunOptions::manual()).await;
    });
    RUN_NOW_ACK
}

async fn render_metrics(State(state): State<Arc<StatusState>>) -> Response {
    match &state.metrics {
        Some(handle) => handle.render().into_response(),
        None => (StatusCode::NOT_FOUND, "metrics recorder not installed").into_response(),
    }
}

/// Recent runs and the daily schedule as an HTML page.
#[derive(Template)]
#[template(path = "status.html")]
struct StatusPage<'a> {
    times: &'a [String],
    runs: Vec<RunRow>,
}

struct RunRow {
    display_time: String,
    status: RunStatus,
    color: &'static str,
    records: usize,
    duration_ms: u64,
    message: String,
}

impl From<RunRecord> for RunRow {
    fn from(r: RunRecord) -> Self {
        Self {
            display_time: r.display_time(),
            status: r.status,
            color: status_color(r.status),
            records: r.records,
            duration_ms: r.duration_ms,
            message: r.message,
        }
    }
}

async fn status_page(State(state): State<Arc<StatusState>>) -> Result<Html<String>, Response> {
    let runs = read_runs(&state, PAGE_RUN_LIMIT).await?;
    let page = StatusPage {
        times: state.schedule.times(),
        runs: runs.into_iter().map(RunRow::from).collect(),
    };
    match page.render() {
        Ok(html) => Ok(Html(html)),
        Err(e) => {
            tracing::error!(error = %e, "status page render failed");
            Err((StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response())
        }
    }
}

fn status_color(status: RunStatus) -> &'static str {
    match status {
        RunStatus::Success => "#2e7d32",
        RunStatus::Error => "#c62828",
        RunStatus::Skipped => "#6d6d6d",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{pipeline::PortalSettings, sources::PortalEndpoints};
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use energy_store::MemoryReadingStore;
    use std::time::Duration;
    use tower::ServiceExt;

    fn state(dir: &std::path::Path) -> Arc<StatusState> {
        let portal = PortalSettings {
            endpoints: PortalEndpoints::new("http://127.0.0.1:9", "http://127.0.0.1:9/login")
                .unwrap(),
            username: "u".into(),
            password: "p".into(),
            timeout: Duration::from_secs(1),
        };
        let pipeline = Pipeline::new(
            Arc::new(MemoryReadingStore::new().unreachable()),
            portal,
            RunLedger::in_dir(dir),
            dir,
        );
        Arc::new(StatusState {
            schedule: ScheduleSpec::from_raw(&["2:00".to_string(), "14:30".to_string()]).unwrap(),
            pipeline: Arc::new(pipeline),
            metrics: None,
        })
    }

    async fn get(app: Router, uri: &str) -> (StatusCode, String) {
        let resp = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = resp.status();
        let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn schedule_endpoint_reports_times_and_format() {
        let tmp = tempfile::tempdir().unwrap();
        let (status, body) = get(router(state(tmp.path())), "/api/schedule").await;

        assert_eq!(status, StatusCode::OK);
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["times"], serde_json::json!(["02:00", "14:30"]));
        assert_eq!(json["timezone"], "Europe/Warsaw");
        assert_eq!(json["format"], "HH:MM:SS DD/MM/YYYY");
    }

    #[tokio::test]
    async fn runs_endpoint_adds_reference_time() {
        let tmp = tempfile::tempdir().unwrap();
        let state = state(tmp.path());
        let line = r#"{"time":"2024-07-01T10:00:00+00:00","status":"success","message":"ok","records":72,"durationMs":1200}"#;
        std::fs::write(state.ledger().path(), format!("{line}\n")).unwrap();

        let (status, body) = get(router(state), "/api/runs").await;

        assert_eq!(status, StatusCode::OK);
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json[0]["time_pl"], "12:00:00 01/07/2024");
        assert_eq!(json[0]["status"], "success");
        assert_eq!(json[0]["records"], 72);
        assert_eq!(json[0]["durationMs"], 1200);
    }

    #[tokio::test]
    async fn runs_endpoint_is_empty_without_ledger() {
        let tmp = tempfile::tempdir().unwrap();
        let (status, body) = get(router(state(tmp.path())), "/api/runs").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "[]");
    }

    #[tokio::test]
    async fn page_lists_schedule_and_escapes_messages() {
        let tmp = tempfile::tempdir().unwrap();
        let state = state(tmp.path());
        state
            .ledger()
            .record(
                chrono::Local::now().fixed_offset(),
                RunStatus::Error,
                "Fetch error: <b>bad</b>",
                0,
                Duration::from_millis(3),
            )
            .await
            .unwrap();

        let (status, body) = get(router(state), "/").await;

        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("Status odczytu Tauron"));
        assert!(body.contains("<code>02:00</code>"));
        assert!(body.contains("color:#c62828"));
        assert!(body.contains("Fetch error: &lt;b&gt;bad&lt;"));
        assert!(!body.contains("<b>bad"));
    }

    #[tokio::test]
    async fn run_now_acknowledges_and_records_outcome() {
        let tmp = tempfile::tempdir().unwrap();
        let state = state(tmp.path());
        let ledger = state.ledger().clone();

        let (status, body) = get(router(state), "/run-now").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, RUN_NOW_ACK);

        let mut runs = Vec::new();
        for _ in 0..50 {
            runs = ledger.read_recent(10).await.unwrap();
            if !runs.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].status, RunStatus::Error);
        assert!(runs[0].message.starts_with("DB connect error"));
    }

    #[tokio::test]
    async fn metrics_is_not_found_without_recorder() {
        let tmp = tempfile::tempdir().unwrap();
        let (status, _) = get(router(state(tmp.path())), "/metrics").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
