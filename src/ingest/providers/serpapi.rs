// src/ingest/providers/serpapi.rs
//! Google search through SerpApi. A missing key is a normal configuration and
//! yields no results instead of an error.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;

use crate::config::SearchSettings;
use crate::ingest::types::{SearchClient, SearchHit};

const SERPAPI_ENDPOINT: &str = "https://serpapi.com/search.json";

#[derive(Debug, Deserialize)]
struct SerpResponse {
    #[serde(default)]
    organic_results: Vec<SerpResult>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SerpResult {
    #[serde(default)]
    title: String,
    #[serde(default)]
    link: String,
}

pub struct SerpApiClient {
    http: reqwest::Client,
    api_key: Option<String>,
    settings: SearchSettings,
}

impl SerpApiClient {
    /// Reads `SERP_API_KEY`; an empty or absent key disables searching.
    pub fn from_env(settings: SearchSettings) -> Result<Self> {
        let api_key = std::env::var("SERP_API_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty());
        Self::new(api_key, settings)
    }

    pub fn new(api_key: Option<String>, settings: SearchSettings) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("building serpapi http client")?;
        Ok(Self {
            http,
            api_key,
            settings,
        })
    }
}

/// Keep only absolute http(s) links, as the organic list sometimes carries relative ones.
fn into_hits(resp: SerpResponse) -> Vec<SearchHit> {
    resp.organic_results
        .into_iter()
        .filter(|r| r.link.starts_with("http"))
        .map(|r| SearchHit {
            title: r.title,
            link: r.link,
        })
        .collect()
}

#[async_trait]
impl SearchClient for SerpApiClient {
    async fn search(&self, query: &str) -> Result<Vec<SearchHit>> {
        let Some(key) = self.api_key.as_deref() else {
            tracing::debug!(target: "ingest", query, "search disabled (no SERP_API_KEY)");
            return Ok(Vec::new());
        };

        let num = self.settings.results_per_query.to_string();
        let resp = self
            .http
            .get(SERPAPI_ENDPOINT)
            .query(&[
                ("engine", "google"),
                ("q", query),
                ("hl", self.settings.language.as_str()),
                ("gl", self.settings.country.as_str()),
                ("num", num.as_str()),
                ("api_key", key),
            ])
            .send()
            .await
            .context("serpapi request failed")?;

        let body: SerpResponse = resp.json().await.context("parsing serpapi response")?;
        if let Some(err) = &body.error {
            // Quota exhaustion and "no results" both arrive here.
            tracing::info!(target: "ingest", query, error = %err, "search returned no results");
        }
        Ok(into_hits(body))
    }

    fn name(&self) -> &'static str {
        "serpapi"
    }
}
