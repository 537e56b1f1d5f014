// src/ingest/providers/document.rs
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;

use crate::ingest::types::DocumentFetcher;

/// Fetches full article bodies for search hits.
pub struct HttpDocumentFetcher {
    client: reqwest::Client,
}

impl HttpDocumentFetcher {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent("Mozilla/5.0 (compatible; regwatch/0.1)")
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(20))
            .build()
            .context("building document http client")?;
        Ok(Self { client })
    }
}

#[async_trait]
impl DocumentFetcher for HttpDocumentFetcher {
    async fn fetch(&self, url: &str) -> Result<String> {
        // Certificate failures surface as send() errors and are handled by the gateway.
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .context("document http get()")?
            .error_for_status()
            .context("document non-2xx")?;
        resp.text().await.context("document http .text()")
    }

    fn name(&self) -> &'static str {
        "document-http"
    }
}
