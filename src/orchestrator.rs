// src/orchestrator.rs
//! One scan: for every subject in config order, fetch candidates, drop the
//! ones already seen, classify the rest and collect the relevant ones.
//!
//! Everything is sequential. The classifier backend is rate limited, and the
//! seen mark of a link must land before the same link can come up again later
//! in the run (e.g. once from the feed and once from search).

use std::sync::Arc;

use metrics::{counter, describe_counter, describe_gauge, gauge};
use once_cell::sync::OnceCell;
use serde::Serialize;
use thiserror::Error;

use crate::classify::{Classifier, ClassifierError, PromptContext};
use crate::config::Subject;
use crate::ingest::types::Candidate;
use crate::ingest::SourceGateway;
use crate::store::{Alert, AlertStore, DataPaths, SeenStore};

fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("scan_candidates_total", "Candidates examined by scans.");
        describe_counter!("scan_skipped_total", "Candidates skipped, by reason.");
        describe_counter!("scan_classified_total", "Candidates sent to the classifier.");
        describe_gauge!("scan_last_run_ts", "Unix ts when the last scan finished.");
    });
}

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("classifier backend '{0}' is disabled")]
    ClassifierDisabled(&'static str),
    #[error("scan of '{subject}' aborted: {source}")]
    ClassifierUnavailable {
        subject: String,
        #[source]
        source: ClassifierError,
        /// Alerts confirmed before the failure, handed to the alert log before returning.
        flushed: Vec<Alert>,
    },
}

/// Counters and alerts produced by one scan.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScanReport {
    pub subjects: usize,
    pub candidates: usize,
    pub skipped_seen: usize,
    pub skipped_unusable: usize,
    pub classified: usize,
    /// Alerts confirmed during this scan, in discovery order.
    pub alerts: Vec<Alert>,
    /// Size of the alert log after the final append, if it succeeded.
    pub total_alerts: Option<usize>,
}

pub struct Orchestrator {
    gateway: SourceGateway,
    classifier: Arc<Classifier>,
    paths: DataPaths,
    alerts: AlertStore,
}

impl Orchestrator {
    pub fn new(gateway: SourceGateway, classifier: Arc<Classifier>, paths: DataPaths) -> Self {
        ensure_metrics_described();
        let alerts = AlertStore::new(&paths.alerts);
        Self {
            gateway,
            classifier,
            paths,
            alerts,
        }
    }

    pub fn paths(&self) -> &DataPaths {
        &self.paths
    }

    /// The alert log this orchestrator appends to; clones share its append lock.
    pub fn alerts(&self) -> &AlertStore {
        &self.alerts
    }

    /// Runs a full scan. `on_progress` receives 0–100; 100 is reported only
    /// after the alert batch has been appended.
    ///
    /// On `ClassifierUnavailable` the alerts confirmed so far are still appended.
    pub async fn run<F>(&self, subjects: &[Subject], mut on_progress: F) -> Result<ScanReport, ScanError>
    where
        F: FnMut(u8) + Send,
    {
        if !self.classifier.is_enabled() {
            return Err(ScanError::ClassifierDisabled(self.classifier.backend_name()));
        }

        let mut seen = SeenStore::open(&self.paths.seen);
        let mut report = ScanReport {
            subjects: subjects.len(),
            ..Default::default()
        };
        tracing::info!(
            target: "scan",
            subjects = subjects.len(), seen = seen.len(),
            "scan started"
        );

        let total = subjects.len().max(1);
        for (i, subject) in subjects.iter().enumerate() {
            if let Err(source) = self.scan_subject(subject, &mut seen, &mut report).await {
                self.flush(&mut report);
                return Err(ScanError::ClassifierUnavailable {
                    subject: subject.name.clone(),
                    source,
                    flushed: report.alerts,
                });
            }
            let pct = ((i + 1) * 100 / total).min(99) as u8;
            on_progress(pct);
        }

        self.flush(&mut report);
        on_progress(100);

        gauge!("scan_last_run_ts").set(chrono::Utc::now().timestamp() as f64);
        tracing::info!(
            target: "scan",
            candidates = report.candidates,
            skipped_seen = report.skipped_seen,
            skipped_unusable = report.skipped_unusable,
            classified = report.classified,
            alerts = report.alerts.len(),
            "scan finished"
        );
        Ok(report)
    }

    async fn scan_subject(
        &self,
        subject: &Subject,
        seen: &mut SeenStore,
        report: &mut ScanReport,
    ) -> Result<(), ClassifierError> {
        let candidates = self.gateway.fetch_candidates(subject).await;
        tracing::info!(
            target: "scan",
            subject = %subject.name, candidates = candidates.len(),
            "subject fetched"
        );

        for c in candidates {
            report.candidates += 1;
            counter!("scan_candidates_total").increment(1);
            if seen.contains(&c.link) {
                skip(&c, "seen");
                report.skipped_seen += 1;
                continue;
            }

            // Marked before the backend is called: a failing classification is not retried by later scans.
            seen.mark_seen(&c.link);

            let fetched;
            let content = if c.needs_document_text() {
                fetched = self.gateway.fetch_document_text(&c.link).await;
                if fetched.is_empty() {
                    skip(&c, "document_unreachable");
                    report.skipped_unusable += 1;
                    continue;
                }
                fetched.as_str()
            } else {
                c.content.as_str()
            };

            report.classified += 1;
            counter!("scan_classified_total").increment(1);
            let verdict = self
                .classifier
                .classify(&PromptContext {
                    subject: &c.subject,
                    title: &c.title,
                    content,
                })
                .await?;

            match verdict.summary {
                Some(summary) if verdict.relevant => {
                    tracing::info!(
                        target: "scan",
                        subject = %c.subject, link = %c.link, title = %c.title,
                        "alert confirmed"
                    );
                    report.alerts.push(Alert::from_candidate(&c, summary));
                }
                _ => skip(&c, "not_relevant"),
            }
        }
        Ok(())
    }

    /// Best-effort: a failed write is logged, the scan result still stands.
    fn flush(&self, report: &mut ScanReport) {
        match self.alerts.append_all(&report.alerts) {
            Ok(total) => report.total_alerts = Some(total),
            Err(e) => tracing::error!(
                target: "scan",
                error = ?e, pending = report.alerts.len(),
                "alert batch not persisted"
            ),
        }
    }
}

fn skip(c: &Candidate, reason: &'static str) {
    counter!("scan_skipped_total", "reason" => reason).increment(1);
    tracing::debug!(
        target: "scan",
        subject = %c.subject, link = %c.link, reason,
        "candidate skipped"
    );
}
