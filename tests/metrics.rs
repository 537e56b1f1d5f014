// tests/metrics.rs
//
// One test per process: the Prometheus recorder can only be installed once.

mod support;

use std::sync::Arc;

use axum::body::{self, Body};
use axum::http::{Request, StatusCode};
use tower::ServiceExt;

use regwatch::ingest::providers::fixture::{FixtureDocuments, FixtureSearch};
use regwatch::metrics::Metrics;
use regwatch::store::DataPaths;
use regwatch::{JobRunner, JobState, Orchestrator};
use support::*;

#[tokio::test]
async fn metrics_endpoint_contains_scan_series() {
    let metrics = Metrics::init().expect("recorder installs once per process");

    let dir = tempfile::tempdir().unwrap();
    let orch = Orchestrator::new(
        gateway(fict_feeds(), Arc::new(FixtureSearch::new()), FixtureDocuments::new()),
        classifier(nitrites_backend()),
        DataPaths::under(dir.path()),
    );
    let runner = JobRunner::new(orch, write_subjects(dir.path(), &[fict_subject()]));
    runner.trigger();
    assert_eq!(wait_settled(&runner).await.state, JobState::Done);

    let app: axum::Router = metrics.router();
    let resp = app
        .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let body = body::to_bytes(resp.into_body(), 1_048_576).await.unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();
    for needle in [
        "ingest_events_total",
        "scan_candidates_total",
        "scan_classified_total",
        "classifier_calls_total",
        "alerts_appended_total",
        "scan_last_run_ts",
        "scan_runs_total",
    ] {
        assert!(text.contains(needle), "missing series {needle} in:\n{text}");
    }
    for described in ["scan_runs_total", "alerts_appended_total"] {
        assert!(
            text.contains(&format!("# HELP {described}")),
            "{described} has no description in:\n{text}"
        );
    }
}
