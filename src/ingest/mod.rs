// src/ingest/mod.rs
pub mod providers;
pub mod types;

use std::collections::HashSet;
use std::sync::Arc;

use metrics::{counter, describe_counter, describe_histogram};
use once_cell::sync::OnceCell;

use crate::config::Subject;
use crate::ingest::types::{
    Candidate, DocumentFetcher, FeedFetcher, SearchClient, SearchHit, SourceKind,
};

/// Cap for feed titles/descriptions.
const TEXT_CAP: usize = 1500;
/// Cap for full document bodies handed to the classifier.
const DOCUMENT_CAP: usize = 6000;

/// One-time metrics registration (so series show up on /metrics).
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("ingest_events_total", "Total candidates parsed from feeds.");
        describe_counter!(
            "ingest_search_hits_total",
            "Search hits kept after per-fetch link dedup."
        );
        describe_counter!(
            "ingest_provider_errors_total",
            "Feed/search/document fetch errors (absorbed as empty results)."
        );
        describe_histogram!("ingest_parse_ms", "Feed parse time in milliseconds.");
    });
}

/// Normalize text: decode entities, strip tags, collapse whitespace, trim, strip stray punctuation.
pub fn normalize_text(s: &str) -> String {
    normalize_capped(s, TEXT_CAP)
}

fn normalize_capped(s: &str, cap: usize) -> String {
    // 1) HTML entity decode
    let mut out = html_escape::decode_html_entities(s).to_string();

    // 2) Strip HTML tags
    static RE_TAGS: OnceCell<regex::Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| regex::Regex::new(r"(?is)</?[^>]+>").unwrap());
    out = re_tags.replace_all(&out, " ").to_string();

    // 3) Normalize “ ” ‘ ’ « » to ASCII quotes
    out = out
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");

    // 4) Collapse whitespace
    static RE_WS: OnceCell<regex::Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| regex::Regex::new(r"\s+").unwrap());
    out = re_ws.replace_all(&out, " ").to_string();
    out = out.trim().to_string();

    // 5) Strip trailing sentence punctuation (keep quotes)
    while let Some(last) = out.chars().last() {
        if matches!(last, '!' | '?' | '.' | ',') {
            out.pop();
        } else {
            break;
        }
    }

    // 6) Length cap
    if out.chars().count() > cap {
        out = out.chars().take(cap).collect();
    }

    out
}

/// Reduce an HTML page to classifier-ready text. Script/style bodies and
/// comments are dropped before tags are stripped.
pub fn extract_document_text(html: &str) -> String {
    static RE_NOISE: OnceCell<regex::Regex> = OnceCell::new();
    let re_noise = RE_NOISE.get_or_init(|| {
        regex::Regex::new(r"(?is)<script\b.*?</script>|<style\b.*?</style>|<noscript\b.*?</noscript>|<!--.*?-->")
            .unwrap()
    });
    let cleaned = re_noise.replace_all(html, " ");
    normalize_capped(&cleaned, DOCUMENT_CAP)
}

/// Keep the first occurrence of every link, preserving discovery order.
pub fn dedup_by_link(candidates: Vec<Candidate>) -> Vec<Candidate> {
    let mut seen: HashSet<String> = HashSet::new();
    candidates
        .into_iter()
        .filter(|c| seen.insert(c.link.clone()))
        .collect()
}

/// Expand the `{subject}` placeholder of each variant template.
pub fn expand_variants(subject: &str, templates: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(templates.len());
    for t in templates {
        let q = t.replace("{subject}", subject).trim().to_string();
        if !q.is_empty() && !out.contains(&q) {
            out.push(q);
        }
    }
    if out.is_empty() {
        out.push(subject.to_string());
    }
    out
}

/// Single entry point over feeds, search and document bodies.
/// Every fetch degrades to an empty result; nothing here returns an error.
#[derive(Clone)]
pub struct SourceGateway {
    feeds: Arc<dyn FeedFetcher>,
    search: Arc<dyn SearchClient>,
    documents: Arc<dyn DocumentFetcher>,
    variants: Vec<String>,
}

impl SourceGateway {
    pub fn new(
        feeds: Arc<dyn FeedFetcher>,
        search: Arc<dyn SearchClient>,
        documents: Arc<dyn DocumentFetcher>,
        variants: Vec<String>,
    ) -> Self {
        ensure_metrics_described();
        Self {
            feeds,
            search,
            documents,
            variants,
        }
    }

    pub fn search_variants(&self) -> &[String] {
        &self.variants
    }

    /// Feed candidates (when a feed is configured) followed by search candidates.
    /// Cross-source duplicates are left in place; the seen filter handles them in order.
    pub async fn fetch_candidates(&self, subject: &Subject) -> Vec<Candidate> {
        let mut out = Vec::new();
        if let Some(url) = subject.feed_url.as_deref() {
            out.extend(self.fetch_from_feed(&subject.name, url).await);
        }
        out.extend(self.fetch_from_search(&subject.name, &self.variants).await);
        out
    }

    pub async fn fetch_from_feed(&self, subject: &str, feed_url: &str) -> Vec<Candidate> {
        let xml = match self.feeds.fetch(feed_url).await {
            Ok(xml) => xml,
            Err(e) => {
                tracing::warn!(
                    target: "ingest",
                    subject, feed_url, provider = self.feeds.name(), error = ?e,
                    "feed unavailable, treating as empty"
                );
                counter!("ingest_provider_errors_total").increment(1);
                return Vec::new();
            }
        };
        match providers::rss::parse_feed(subject, &xml) {
            Ok(items) => dedup_by_link(items),
            Err(e) => {
                tracing::warn!(
                    target: "ingest",
                    subject, feed_url, error = ?e,
                    "feed malformed, treating as empty"
                );
                counter!("ingest_provider_errors_total").increment(1);
                Vec::new()
            }
        }
    }

    /// One query per variant; hits are merged and deduplicated by link.
    pub async fn fetch_from_search(&self, subject: &str, variants: &[String]) -> Vec<Candidate> {
        let mut hits: Vec<SearchHit> = Vec::new();
        for query in expand_variants(subject, variants) {
            match self.search.search(&query).await {
                Ok(mut v) => hits.append(&mut v),
                Err(e) => {
                    tracing::warn!(
                        target: "ingest",
                        subject, query = %query, provider = self.search.name(), error = ?e,
                        "search unavailable, treating as empty"
                    );
                    counter!("ingest_provider_errors_total").increment(1);
                }
            }
        }

        let candidates = hits
            .into_iter()
            .map(|h| Candidate {
                subject: subject.to_string(),
                title: normalize_text(&h.title),
                link: h.link,
                content: String::new(),
                published_at: None,
                source_kind: SourceKind::Search,
            })
            .collect();
        let kept = dedup_by_link(candidates);
        counter!("ingest_search_hits_total").increment(kept.len() as u64);
        kept
    }

    /// Raw hits for one ad-hoc query, no variant expansion.
    pub async fn search_hits(&self, query: &str) -> Vec<SearchHit> {
        match self.search.search(query).await {
            Ok(hits) => hits,
            Err(e) => {
                tracing::warn!(target: "ingest", query, error = ?e, "search unavailable");
                counter!("ingest_provider_errors_total").increment(1);
                Vec::new()
            }
        }
    }

    /// Empty string means "unusable": transport, TLS, status and decode errors all land here.
    pub async fn fetch_document_text(&self, url: &str) -> String {
        match self.documents.fetch(url).await {
            Ok(body) => extract_document_text(&body),
            Err(e) => {
                tracing::info!(
                    target: "ingest",
                    link = url, provider = self.documents.name(), error = %e,
                    "document unreachable"
                );
                counter!("ingest_provider_errors_total").increment(1);
                String::new()
            }
        }
    }
}
