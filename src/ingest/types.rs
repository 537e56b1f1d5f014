// src/ingest/types.rs
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Where a candidate was discovered.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Feed,
    Search,
}

/// One document surfaced by a source for one subject, not yet classified.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Candidate {
    pub subject: String,
    pub title: String,
    pub link: String, // unique external identifier
    pub content: String,
    pub published_at: Option<DateTime<Utc>>,
    pub source_kind: SourceKind,
}

impl Candidate {
    /// Search hits only carry a snippet; the classifier needs the document body.
    pub fn needs_document_text(&self) -> bool {
        self.source_kind == SourceKind::Search
    }
}

/// One organic result returned by a search backend.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SearchHit {
    pub title: String,
    pub link: String,
}

/// Returns the raw feed document (XML) behind a feed URL.
#[async_trait::async_trait]
pub trait FeedFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<String>;
    fn name(&self) -> &'static str;
}

/// Runs one web-search query.
#[async_trait::async_trait]
pub trait SearchClient: Send + Sync {
    async fn search(&self, query: &str) -> Result<Vec<SearchHit>>;
    fn name(&self) -> &'static str;
}

/// Returns the raw body (usually HTML) of a document.
#[async_trait::async_trait]
pub trait DocumentFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<String>;
    fn name(&self) -> &'static str;
}
