use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;

use crate::classify::{backend::build_backend_from_env, Classifier};
use crate::config::{load_subjects_from, resolve_subjects_path, ScanConfig};
use crate::ingest::providers::{
    document::HttpDocumentFetcher, rss::HttpFeedFetcher, serpapi::SerpApiClient,
};
use crate::ingest::SourceGateway;
use crate::job::{JobResults, JobRunner, JobState, JobStatus, TriggerOutcome};
use crate::orchestrator::Orchestrator;
use crate::store::{Alert, AlertStore, DataPaths, SeenStore};

#[derive(Clone)]
pub struct AppState {
    pub runner: JobRunner,
    pub classifier: Arc<Classifier>,
    pub gateway: SourceGateway,
    pub paths: DataPaths,
    /// Shares its append lock with the scan's final flush.
    pub alerts: AlertStore,
    pub subjects_path: PathBuf,
}

impl AppState {
    /// Wire already-built collaborators together.
    pub fn new(
        gateway: SourceGateway,
        classifier: Arc<Classifier>,
        data_dir: &std::path::Path,
        subjects_path: PathBuf,
    ) -> Self {
        let paths = DataPaths::under(data_dir);
        let orchestrator = Orchestrator::new(gateway.clone(), classifier.clone(), paths.clone());
        let alerts = orchestrator.alerts().clone();
        let runner = JobRunner::new(orchestrator, subjects_path.clone());
        Self {
            runner,
            classifier,
            gateway,
            paths,
            alerts,
            subjects_path,
        }
    }

    /// Production wiring: HTTP providers, backend from env, paths from config.
    pub fn from_config(cfg: &ScanConfig) -> Result<Self> {
        let gateway = SourceGateway::new(
            Arc::new(HttpFeedFetcher::new()?),
            Arc::new(SerpApiClient::from_env(cfg.search.clone())?),
            Arc::new(HttpDocumentFetcher::new()?),
            cfg.search.variants.clone(),
        );
        let classifier = Arc::new(Classifier::from_settings(
            build_backend_from_env(),
            &cfg.classifier,
        ));
        tracing::info!(
            backend = classifier.backend_name(),
            model = classifier.model(),
            data_dir = %cfg.data_dir.display(),
            "app state built"
        );
        Ok(Self::new(
            gateway,
            classifier,
            &cfg.data_dir,
            resolve_subjects_path(&cfg.subjects_path),
        ))
    }
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/health", get(|| async { "OK" }))
        .route("/api/scan", post(trigger_scan))
        .route("/api/scan/status", get(scan_status))
        .route("/api/scan/results", get(scan_results))
        .route("/api/rss", get(trigger_scan))
        .route("/api/subjects", get(list_subjects))
        .route("/api/alerts", get(list_alerts).post(append_alerts))
        .route("/api/seen_entries", get(list_seen))
        .route("/api/analyse", post(analyse))
        .route("/api/search", post(search))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

/// Alias kept so callers can use `api::router(state)`.
pub fn router(state: AppState) -> Router {
    create_router(state)
}

fn error_body(status: StatusCode, msg: impl Into<String>) -> (StatusCode, Json<Value>) {
    (status, Json(json!({ "error": msg.into() })))
}

async fn index() -> &'static str {
    "Regulatory watch API is running."
}

#[derive(Serialize)]
struct TriggerResp {
    started: bool,
    #[serde(flatten)]
    status: JobStatus,
    message: &'static str,
}

async fn trigger_scan(State(state): State<AppState>) -> (StatusCode, Json<TriggerResp>) {
    match state.runner.trigger() {
        TriggerOutcome::Started(status) => (
            StatusCode::ACCEPTED,
            Json(TriggerResp {
                started: true,
                status,
                message: "scan started",
            }),
        ),
        TriggerOutcome::AlreadyRunning(status) => (
            StatusCode::OK,
            Json(TriggerResp {
                started: false,
                status,
                message: "scan already running",
            }),
        ),
    }
}

async fn scan_status(State(state): State<AppState>) -> Json<JobStatus> {
    Json(state.runner.status())
}

/// Run outcome plus, once a run has finished (done or failed), the full alert log.
async fn scan_results(State(state): State<AppState>) -> Json<Value> {
    let results = state.runner.results();
    let mut body = serde_json::to_value(&results).unwrap_or_else(|_| json!({}));
    if matches!(results, JobResults::Done { .. } | JobResults::Failed { .. }) {
        let all = state.alerts.load_all();
        if let Some(obj) = body.as_object_mut() {
            obj.insert("alerts".to_string(), json!(all));
        }
    }
    Json(body)
}

async fn list_subjects(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    match load_subjects_from(&state.subjects_path) {
        Ok(subjects) => (StatusCode::OK, Json(json!(subjects))),
        Err(e) => error_body(StatusCode::INTERNAL_SERVER_ERROR, format!("{e:#}")),
    }
}

async fn list_alerts(State(state): State<AppState>) -> Json<Vec<Alert>> {
    Json(state.alerts.load_all())
}

#[derive(Deserialize)]
struct AppendReq {
    #[serde(default)]
    new_alerts: Vec<Alert>,
}

async fn append_alerts(
    State(state): State<AppState>,
    Json(body): Json<AppendReq>,
) -> (StatusCode, Json<Value>) {
    // The running scan owns the alert log until it finishes. A scan starting
    // right after this check still cannot interleave: both go through the
    // store's append lock.
    if state.runner.status().state == JobState::Running {
        return error_body(StatusCode::CONFLICT, "scan in progress, retry later");
    }
    match state.alerts.append_all(&body.new_alerts) {
        Ok(total) => (
            StatusCode::CREATED,
            Json(json!({
                "message": "alerts appended",
                "appended": body.new_alerts.len(),
                "total": total,
            })),
        ),
        Err(e) => error_body(StatusCode::INTERNAL_SERVER_ERROR, format!("{e:#}")),
    }
}

async fn list_seen(State(state): State<AppState>) -> Json<Vec<String>> {
    Json(SeenStore::load_all(&state.paths.seen).0)
}

#[derive(Deserialize)]
struct AnalyseReq {
    #[serde(default)]
    prompt: String,
    #[serde(default)]
    model: Option<String>,
}

async fn analyse(
    State(state): State<AppState>,
    Json(body): Json<AnalyseReq>,
) -> (StatusCode, Json<Value>) {
    if body.prompt.trim().is_empty() {
        return error_body(StatusCode::BAD_REQUEST, "missing prompt");
    }
    let model = body
        .model
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| state.classifier.model().to_string());
    match state.classifier.complete_raw(&body.prompt, &model).await {
        Ok(result) => (StatusCode::OK, Json(json!({ "result": result }))),
        Err(e) => error_body(StatusCode::SERVICE_UNAVAILABLE, e.to_string()),
    }
}

#[derive(Deserialize)]
struct SearchReq {
    #[serde(default)]
    query: Option<String>,
}

async fn search(
    State(state): State<AppState>,
    Json(body): Json<SearchReq>,
) -> (StatusCode, Json<Value>) {
    let Some(query) = body.query.filter(|q| !q.trim().is_empty()) else {
        return error_body(StatusCode::BAD_REQUEST, "missing query");
    };
    let hits = state.gateway.search_hits(&query).await;
    (StatusCode::OK, Json(json!({ "results": hits })))
}
