// src/job.rs
//! The single global scan job.
//!
//! `Idle --trigger--> Running --ok--> Done`, `Running --err--> Failed`, and
//! `Done`/`Failed` accept a new trigger. The Running check and the transition
//! into Running happen under one lock, so concurrent triggers start exactly
//! one scan. Callers never wait on the scan itself.
//!
//! The job lock only guards the in-memory transition. Status snapshots are
//! numbered under it and written afterwards on the blocking pool.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use metrics::{counter, describe_counter};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};

use crate::config::load_subjects_from;
use crate::orchestrator::{Orchestrator, ScanError};
use crate::store::{Alert, JobStatusStore};

fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("scan_runs_total", "Scan jobs started.");
    });
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Idle,
    Running,
    Done,
    Failed,
}

/// What `status()` reports and what gets persisted.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct JobStatus {
    pub state: JobState,
    pub progress_percent: u8,
}

#[derive(Debug, Clone)]
pub struct ScanJob {
    pub state: JobState,
    pub progress_percent: u8,
    /// Alerts produced by the most recent run, including ones a failed run
    /// appended before giving up.
    pub result_alerts: Option<Vec<Alert>>,
    pub last_error: Option<String>,
}

impl Default for ScanJob {
    fn default() -> Self {
        Self {
            state: JobState::Idle,
            progress_percent: 0,
            result_alerts: None,
            last_error: None,
        }
    }
}

impl ScanJob {
    pub fn status(&self) -> JobStatus {
        JobStatus {
            state: self.state,
            progress_percent: self.progress_percent,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerOutcome {
    Started(JobStatus),
    AlreadyRunning(JobStatus),
}

impl TriggerOutcome {
    pub fn status(&self) -> JobStatus {
        match self {
            Self::Started(s) | Self::AlreadyRunning(s) => *s,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum JobResults {
    NoRunYet,
    InProgress,
    Done { new_alerts: Vec<Alert> },
    Failed { error: String, new_alerts: Vec<Alert> },
}

#[derive(Clone)]
pub struct JobRunner {
    inner: Arc<Inner>,
}

struct Inner {
    job: Mutex<ScanJob>,
    orchestrator: Orchestrator,
    subjects_path: PathBuf,
    status_store: JobStatusStore,
    /// Sequence of the latest status snapshot; bumped under the job lock.
    status_seq: AtomicU64,
    runs: AtomicU64,
}

impl JobRunner {
    /// Starts in `Idle` regardless of what a previous process left on disk.
    pub fn new(orchestrator: Orchestrator, subjects_path: impl Into<PathBuf>) -> Self {
        ensure_metrics_described();
        let status_store = JobStatusStore::new(orchestrator.paths().status.clone());
        let job = ScanJob::default();
        status_store.save(&job.status());
        Self {
            inner: Arc::new(Inner {
                job: Mutex::new(job),
                orchestrator,
                subjects_path: subjects_path.into(),
                status_store,
                status_seq: AtomicU64::new(0),
                runs: AtomicU64::new(0),
            }),
        }
    }

    /// Start a scan unless one is running. Returns immediately.
    pub fn trigger(&self) -> TriggerOutcome {
        let (seq, status) = {
            let mut job = self.inner.lock();
            if job.state == JobState::Running {
                tracing::info!(target: "job", "trigger ignored: scan already running");
                return TriggerOutcome::AlreadyRunning(job.status());
            }
            job.state = JobState::Running;
            job.progress_percent = 0;
            job.last_error = None;
            self.inner.snapshot(&job)
        };
        self.inner.persist(seq, status);

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            let worker = Arc::clone(&inner);
            let outcome = tokio::spawn(async move { worker.run_scan().await }).await;
            if let Err(e) = outcome {
                // A panicking scan must not leave the job stuck in Running.
                inner.finish(Err((format!("scan task aborted: {e}"), Vec::new())));
            }
        });

        TriggerOutcome::Started(status)
    }

    pub fn status(&self) -> JobStatus {
        self.inner.lock().status()
    }

    pub fn results(&self) -> JobResults {
        let job = self.inner.lock();
        match job.state {
            JobState::Idle => JobResults::NoRunYet,
            JobState::Running => JobResults::InProgress,
            JobState::Done => JobResults::Done {
                new_alerts: job.result_alerts.clone().unwrap_or_default(),
            },
            JobState::Failed => JobResults::Failed {
                error: job.last_error.clone().unwrap_or_default(),
                new_alerts: job.result_alerts.clone().unwrap_or_default(),
            },
        }
    }

    /// Number of scans started since process start.
    pub fn runs_started(&self) -> u64 {
        self.inner.runs.load(Ordering::SeqCst)
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, ScanJob> {
        // The guarded data stays consistent even if a holder panicked.
        self.job.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Number the current state; call with the job lock held.
    fn snapshot(&self, job: &ScanJob) -> (u64, JobStatus) {
        let seq = self.status_seq.fetch_add(1, Ordering::SeqCst) + 1;
        (seq, job.status())
    }

    /// Write a snapshot without holding the job lock. Off the async workers
    /// when a runtime is available; `save_ordered` drops stale snapshots.
    fn persist(&self, seq: u64, status: JobStatus) {
        let store = self.status_store.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let _ = handle.spawn_blocking(move || store.save_ordered(seq, &status));
            }
            Err(_) => store.save_ordered(seq, &status),
        }
    }

    async fn run_scan(&self) {
        let run = self.runs.fetch_add(1, Ordering::SeqCst) + 1;
        counter!("scan_runs_total").increment(1);
        tracing::info!(target: "job", run, "scan job started");

        let subjects = match load_subjects_from(&self.subjects_path) {
            Ok(s) => s,
            Err(e) => {
                self.finish(Err((format!("{e:#}"), Vec::new())));
                return;
            }
        };

        let res = self
            .orchestrator
            .run(&subjects, |pct| self.set_progress(pct))
            .await;
        self.finish(match res {
            Ok(report) => Ok(report.alerts),
            Err(e) => {
                let error = e.to_string();
                let flushed = match e {
                    ScanError::ClassifierUnavailable { flushed, .. } => flushed,
                    ScanError::ClassifierDisabled(_) => Vec::new(),
                };
                Err((error, flushed))
            }
        });
    }

    fn set_progress(&self, pct: u8) {
        let (seq, status) = {
            let mut job = self.lock();
            if job.state != JobState::Running {
                return;
            }
            job.progress_percent = pct.min(100);
            self.snapshot(&job)
        };
        self.persist(seq, status);
    }

    /// `Err` carries the message and whatever alerts the run appended before failing.
    fn finish(&self, outcome: Result<Vec<Alert>, (String, Vec<Alert>)>) {
        let (seq, status) = {
            let mut job = self.lock();
            match outcome {
                Ok(alerts) => {
                    tracing::info!(target: "job", alerts = alerts.len(), "scan job done");
                    job.state = JobState::Done;
                    job.progress_percent = 100;
                    job.result_alerts = Some(alerts);
                    job.last_error = None;
                }
                Err((error, flushed)) => {
                    tracing::error!(
                        target: "job",
                        error = %error, flushed = flushed.len(),
                        "scan job failed"
                    );
                    job.state = JobState::Failed;
                    job.result_alerts = Some(flushed);
                    job.last_error = Some(error);
                }
            }
            self.snapshot(&job)
        };
        self.persist(seq, status);
    }
}
