// tests/job_runner.rs
//
// Scan job state machine: single-flight triggers, status/progress reporting,
// results per state and the persisted status file.

mod support;

use std::sync::atomic::Ordering;
use std::sync::Arc;

use regwatch::classify::{BackendError, MockBackend};
use regwatch::ingest::providers::fixture::{FixtureDocuments, FixtureSearch};
use regwatch::store::{DataPaths, JobStatusStore};
use regwatch::{JobResults, JobRunner, JobState, JobStatus, Orchestrator, Subject, TriggerOutcome};
use support::*;

struct Harness {
    _dir: tempfile::TempDir,
    paths: DataPaths,
    runner: JobRunner,
    gate: Arc<tokio::sync::Semaphore>,
    feed_calls: Arc<std::sync::atomic::AtomicUsize>,
}

/// Runner over the FICT feed whose fetch blocks until `release()`.
fn gated_harness() -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let paths = DataPaths::under(dir.path());
    let feeds = GatedFeeds::new(fict_feeds());
    let gate = feeds.gate.clone();
    let feed_calls = feeds.calls.clone();
    let orch = Orchestrator::new(
        gateway(feeds, Arc::new(FixtureSearch::new()), FixtureDocuments::new()),
        classifier(nitrites_backend()),
        paths.clone(),
    );
    let subjects_path = write_subjects(dir.path(), &[fict_subject()]);
    Harness {
        runner: JobRunner::new(orch, subjects_path),
        paths,
        gate,
        feed_calls,
        _dir: dir,
    }
}

impl Harness {
    fn release(&self) {
        self.gate.add_permits(1_000);
    }
}

#[tokio::test]
async fn fresh_runner_is_idle_with_no_results() {
    let h = gated_harness();
    assert_eq!(
        h.runner.status(),
        JobStatus {
            state: JobState::Idle,
            progress_percent: 0
        }
    );
    assert_eq!(h.runner.results(), JobResults::NoRunYet);
    assert_eq!(
        JobStatusStore::new(&h.paths.status).load().map(|s| s.state),
        Some(JobState::Idle)
    );
}

#[tokio::test]
async fn trigger_runs_to_done_and_exposes_new_alerts() {
    let h = gated_harness();

    let outcome = h.runner.trigger();
    assert!(matches!(outcome, TriggerOutcome::Started(_)));
    assert_eq!(outcome.status().state, JobState::Running);
    assert_eq!(h.runner.results(), JobResults::InProgress);

    h.release();
    let status = wait_settled(&h.runner).await;
    assert_eq!(
        status,
        JobStatus {
            state: JobState::Done,
            progress_percent: 100
        }
    );

    match h.runner.results() {
        JobResults::Done { new_alerts } => {
            assert_eq!(new_alerts.len(), 1);
            assert_eq!(new_alerts[0].link, LINK_B);
        }
        other => panic!("unexpected results: {other:?}"),
    }
    assert_eq!(wait_persisted(&h.paths.status, JobState::Done).await, status);
}

#[tokio::test]
async fn trigger_while_running_does_not_start_a_second_scan() {
    let h = gated_harness();

    assert!(matches!(h.runner.trigger(), TriggerOutcome::Started(_)));
    let again = h.runner.trigger();
    assert!(matches!(again, TriggerOutcome::AlreadyRunning(_)));
    assert_eq!(again.status().state, JobState::Running);

    h.release();
    wait_settled(&h.runner).await;
    assert_eq!(h.runner.runs_started(), 1);
    assert_eq!(h.feed_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_triggers_start_exactly_one_scan() {
    let h = gated_harness();

    let mut tasks = Vec::new();
    for _ in 0..16 {
        let runner = h.runner.clone();
        tasks.push(tokio::spawn(async move { runner.trigger() }));
    }
    let mut started = 0;
    for t in tasks {
        if matches!(t.await.unwrap(), TriggerOutcome::Started(_)) {
            started += 1;
        }
    }
    assert_eq!(started, 1);

    h.release();
    wait_settled(&h.runner).await;
    assert_eq!(h.runner.runs_started(), 1);
}

#[tokio::test]
async fn done_job_accepts_a_new_trigger() {
    let h = gated_harness();
    h.release();

    h.runner.trigger();
    wait_settled(&h.runner).await;
    assert!(matches!(h.runner.trigger(), TriggerOutcome::Started(_)));
    let status = wait_settled(&h.runner).await;

    assert_eq!(status.state, JobState::Done);
    assert_eq!(h.runner.runs_started(), 2);
    // everything was seen by the first run
    assert_eq!(
        h.runner.results(),
        JobResults::Done {
            new_alerts: Vec::new()
        }
    );
}

#[tokio::test]
async fn unreadable_subjects_fail_the_job_and_allow_retrigger() {
    let dir = tempfile::tempdir().unwrap();
    let paths = DataPaths::under(dir.path());
    let orch = Orchestrator::new(
        gateway(
            fict_feeds(),
            Arc::new(FixtureSearch::new()),
            FixtureDocuments::new(),
        ),
        classifier(nitrites_backend()),
        paths.clone(),
    );
    let missing = dir.path().join("nope.json");
    let runner = JobRunner::new(orch, missing.clone());

    runner.trigger();
    let status = wait_settled(&runner).await;
    assert_eq!(status.state, JobState::Failed);
    match runner.results() {
        JobResults::Failed { error, new_alerts } => {
            assert!(!error.is_empty());
            assert!(new_alerts.is_empty());
        }
        other => panic!("unexpected results: {other:?}"),
    }
    wait_persisted(&paths.status, JobState::Failed).await;

    write_subjects(dir.path(), &[fict_subject()]);
    std::fs::rename(dir.path().join("subjects.json"), &missing).unwrap();
    assert!(matches!(runner.trigger(), TriggerOutcome::Started(_)));
    assert_eq!(wait_settled(&runner).await.state, JobState::Done);
}

#[tokio::test]
async fn results_serialize_with_status_tag() {
    let v = serde_json::to_value(JobResults::NoRunYet).unwrap();
    assert_eq!(v, serde_json::json!({ "status": "no_run_yet" }));
    let v = serde_json::to_value(JobResults::Failed {
        error: "boom".into(),
        new_alerts: Vec::new(),
    })
    .unwrap();
    assert_eq!(
        v,
        serde_json::json!({ "status": "failed", "error": "boom", "new_alerts": [] })
    );
}

#[tokio::test]
async fn subject_with_no_feed_and_no_hits_ends_done_without_alerts() {
    let dir = tempfile::tempdir().unwrap();
    let paths = DataPaths::under(dir.path());
    let mock = nitrites_backend();
    let orch = Orchestrator::new(
        gateway(
            fict_feeds(),
            Arc::new(FixtureSearch::new()),
            FixtureDocuments::new(),
        ),
        classifier(mock.clone()),
        paths.clone(),
    );
    let subjects_path = write_subjects(dir.path(), &[Subject::new("RASFF", None)]);
    let runner = JobRunner::new(orch, subjects_path);

    runner.trigger();
    let status = wait_settled(&runner).await;

    assert_eq!(status.state, JobState::Done);
    assert_eq!(status.progress_percent, 100);
    assert_eq!(
        runner.results(),
        JobResults::Done {
            new_alerts: Vec::new()
        }
    );
    assert_eq!(mock.calls(), 0);
}

#[tokio::test]
async fn failed_run_reports_alerts_it_appended_before_giving_up() {
    let dir = tempfile::tempdir().unwrap();
    let paths = DataPaths::under(dir.path());
    let rasff_link = "https://rasff.example/3";
    let backend = Arc::new(MockBackend::from_fn(|prompt, _| {
        if prompt.contains("nitrites") {
            Ok("Oui, résumé: Limite abaissée".to_string())
        } else {
            Err(BackendError::Transient("502".to_string()))
        }
    }));
    let orch = Orchestrator::new(
        gateway(
            fict_feeds(),
            Arc::new(FixtureSearch::new().with("RASFF", &[("Alerte", rasff_link)])),
            FixtureDocuments::new().with(rasff_link, "<p>Rappel de lots</p>"),
        ),
        classifier(backend),
        paths.clone(),
    );
    // A would hit the failing branch first; keep it out so B is confirmed before RASFF fails
    regwatch::SeenStore::open(&paths.seen).mark_seen(LINK_A);
    let subjects_path = write_subjects(
        dir.path(),
        &[fict_subject(), Subject::new("RASFF", None)],
    );
    let runner = JobRunner::new(orch, subjects_path);

    runner.trigger();
    assert_eq!(wait_settled(&runner).await.state, JobState::Failed);

    match runner.results() {
        JobResults::Failed { error, new_alerts } => {
            assert!(error.contains("RASFF"));
            assert_eq!(new_alerts.len(), 1);
            assert_eq!(new_alerts[0].link, LINK_B);
        }
        other => panic!("unexpected results: {other:?}"),
    }
    assert_eq!(regwatch::AlertStore::new(&paths.alerts).load_all().len(), 1);
}

#[tokio::test]
async fn status_reads_are_not_held_up_by_persistence() {
    let h = gated_harness();
    h.runner.trigger();

    // in-memory state is visible immediately, whatever the disk is doing
    for _ in 0..100 {
        assert_eq!(h.runner.status().state, JobState::Running);
    }
    let persisted = wait_persisted(&h.paths.status, JobState::Running).await;
    assert_eq!(persisted.progress_percent, 0);

    h.release();
    wait_settled(&h.runner).await;
    wait_persisted(&h.paths.status, JobState::Done).await;
}
