// src/ingest/providers/fixture.rs
//! In-memory providers for tests and offline runs. Unknown URLs behave like
//! unreachable hosts; unknown queries return no hits.

use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::ingest::types::{DocumentFetcher, FeedFetcher, SearchClient, SearchHit};

#[derive(Default)]
pub struct FixtureFeeds {
    feeds: HashMap<String, String>,
}

impl FixtureFeeds {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, url: &str, xml: &str) -> Self {
        self.feeds.insert(url.to_string(), xml.to_string());
        self
    }
}

#[async_trait]
impl FeedFetcher for FixtureFeeds {
    async fn fetch(&self, url: &str) -> Result<String> {
        self.feeds
            .get(url)
            .cloned()
            .ok_or_else(|| anyhow!("no fixture feed for {url}"))
    }

    fn name(&self) -> &'static str {
        "fixture-feeds"
    }
}

#[derive(Default)]
pub struct FixtureSearch {
    hits: HashMap<String, Vec<SearchHit>>,
    pub queries: Mutex<Vec<String>>,
}

impl FixtureSearch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, query: &str, hits: &[(&str, &str)]) -> Self {
        let hits = hits
            .iter()
            .map(|(title, link)| SearchHit {
                title: title.to_string(),
                link: link.to_string(),
            })
            .collect();
        self.hits.insert(query.to_string(), hits);
        self
    }

    pub fn issued(&self) -> Vec<String> {
        self.queries.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl SearchClient for FixtureSearch {
    async fn search(&self, query: &str) -> Result<Vec<SearchHit>> {
        self.queries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(query.to_string());
        Ok(self.hits.get(query).cloned().unwrap_or_default())
    }

    fn name(&self) -> &'static str {
        "fixture-search"
    }
}

#[derive(Default)]
pub struct FixtureDocuments {
    docs: HashMap<String, String>,
}

impl FixtureDocuments {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, url: &str, body: &str) -> Self {
        self.docs.insert(url.to_string(), body.to_string());
        self
    }
}

#[async_trait]
impl DocumentFetcher for FixtureDocuments {
    async fn fetch(&self, url: &str) -> Result<String> {
        self.docs
            .get(url)
            .cloned()
            .ok_or_else(|| anyhow!("connection refused: {url}"))
    }

    fn name(&self) -> &'static str {
        "fixture-documents"
    }
}
