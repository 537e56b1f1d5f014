// tests/support/mod.rs
// Shared builders for the integration tests.
#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use regwatch::classify::{AnswerFormat, Classifier, MockBackend, RetryPolicy};
use regwatch::config::scan::DEFAULT_PROMPT_TEMPLATE;
use regwatch::ingest::providers::fixture::{FixtureDocuments, FixtureFeeds, FixtureSearch};
use regwatch::ingest::types::FeedFetcher;
use regwatch::store::JobStatusStore;
use regwatch::{JobRunner, JobState, JobStatus, SourceGateway, Subject};

pub const FICT_FEED_URL: &str = "https://fict.example/rss";
pub const FICT_XML: &str = include_str!("../fixtures/fict_rss.xml");
pub const LINK_A: &str = "https://fict.example/a";
pub const LINK_B: &str = "https://fict.example/b";

pub fn fast_retry(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        rate_limit_backoff: Duration::from_millis(2),
        transient_backoff: Duration::from_millis(1),
        max_backoff: Duration::from_millis(5),
        max_attempts,
    }
}

pub fn classifier(backend: Arc<MockBackend>) -> Arc<Classifier> {
    Arc::new(Classifier::new(
        backend,
        "gpt-4",
        DEFAULT_PROMPT_TEMPLATE,
        AnswerFormat::default(),
        fast_retry(3),
    ))
}

/// Answers "Oui" for prompts mentioning nitrites, "Non" otherwise.
pub fn nitrites_backend() -> Arc<MockBackend> {
    Arc::new(MockBackend::from_fn(|prompt, _| {
        if prompt.contains("nitrites") {
            Ok("Oui, résumé: Teneur maximale en nitrites abaissée.".to_string())
        } else {
            Ok("Non".to_string())
        }
    }))
}

pub fn gateway(
    feeds: impl FeedFetcher + 'static,
    search: Arc<FixtureSearch>,
    docs: FixtureDocuments,
) -> SourceGateway {
    SourceGateway::new(
        Arc::new(feeds),
        search,
        Arc::new(docs),
        vec!["{subject}".to_string()],
    )
}

pub fn fict_feeds() -> FixtureFeeds {
    FixtureFeeds::new().with(FICT_FEED_URL, FICT_XML)
}

pub fn fict_subject() -> Subject {
    Subject::new("FICT", Some(FICT_FEED_URL))
}

pub fn write_subjects(dir: &Path, subjects: &[Subject]) -> PathBuf {
    let p = dir.join("subjects.json");
    std::fs::write(&p, serde_json::to_string_pretty(subjects).unwrap()).unwrap();
    p
}

/// Poll until the job leaves `Running` (or give up after ~5s).
pub async fn wait_settled(runner: &JobRunner) -> JobStatus {
    for _ in 0..1000 {
        let st = runner.status();
        if st.state != JobState::Running {
            return st;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("scan did not finish in time: {:?}", runner.status());
}

/// Status snapshots are written off the job lock; poll until `want` lands on disk.
pub async fn wait_persisted(path: &Path, want: JobState) -> JobStatus {
    let store = JobStatusStore::new(path);
    for _ in 0..1000 {
        if let Some(st) = store.load().filter(|s| s.state == want) {
            return st;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("status file never reached {want:?}: {:?}", store.load());
}

/// Feed fetcher that blocks until the test releases the semaphore, and counts calls.
pub struct GatedFeeds {
    pub inner: FixtureFeeds,
    pub gate: Arc<tokio::sync::Semaphore>,
    pub calls: Arc<AtomicUsize>,
}

impl GatedFeeds {
    pub fn new(inner: FixtureFeeds) -> Self {
        Self {
            inner,
            gate: Arc::new(tokio::sync::Semaphore::new(0)),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }
}

#[async_trait::async_trait]
impl FeedFetcher for GatedFeeds {
    async fn fetch(&self, url: &str) -> anyhow::Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let _permit = self.gate.acquire().await?;
        self.inner.fetch(url).await
    }

    fn name(&self) -> &'static str {
        "gated-feeds"
    }
}
