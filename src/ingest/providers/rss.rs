// src/ingest/providers/rss.rs
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use metrics::{counter, histogram};
use quick_xml::de::from_str;
use serde::Deserialize;
use time::format_description::well_known::{Rfc2822, Rfc3339};
use time::OffsetDateTime;

use crate::ingest::normalize_text;
use crate::ingest::types::{Candidate, FeedFetcher, SourceKind};

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}

#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    item: Vec<Item>,
}

#[derive(Debug, Deserialize)]
struct Item {
    title: Option<String>,
    link: Option<String>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
    description: Option<String>,
}

/// Feeds disagree on date formats; RFC 2822 is the RSS norm, RFC 3339 shows up in the wild.
pub fn parse_pub_date(ts: &str) -> Option<DateTime<Utc>> {
    let ts = ts.trim();
    let parsed = OffsetDateTime::parse(ts, &Rfc2822)
        .or_else(|_| OffsetDateTime::parse(ts, &Rfc3339))
        .ok()?;
    DateTime::<Utc>::from_timestamp(parsed.unix_timestamp(), 0)
}

/// Parse an RSS 2.0 document into candidates for `subject`.
/// Items without a link cannot be deduplicated and are dropped.
pub fn parse_feed(subject: &str, xml: &str) -> Result<Vec<Candidate>> {
    let t0 = std::time::Instant::now();
    let xml_clean = scrub_html_entities_for_xml(xml);
    let rss: Rss = from_str(&xml_clean).context("parsing rss xml")?;

    let mut out = Vec::with_capacity(rss.channel.item.len());
    for it in rss.channel.item {
        let Some(link) = it.link.map(|l| l.trim().to_string()).filter(|l| !l.is_empty()) else {
            continue;
        };
        out.push(Candidate {
            subject: subject.to_string(),
            title: normalize_text(it.title.as_deref().unwrap_or_default()),
            link,
            content: normalize_text(it.description.as_deref().unwrap_or_default()),
            published_at: it.pub_date.as_deref().and_then(parse_pub_date),
            source_kind: SourceKind::Feed,
        });
    }

    let ms = t0.elapsed().as_secs_f64() * 1_000.0;
    histogram!("ingest_parse_ms").record(ms);
    counter!("ingest_events_total").increment(out.len() as u64);
    Ok(out)
}

/// Plain HTTP GET of the feed document.
pub struct HttpFeedFetcher {
    client: reqwest::Client,
}

impl HttpFeedFetcher {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent("regwatch/0.1")
            .timeout(Duration::from_secs(15))
            .build()
            .context("building rss http client")?;
        Ok(Self { client })
    }
}

#[async_trait]
impl FeedFetcher for HttpFeedFetcher {
    async fn fetch(&self, url: &str) -> Result<String> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .context("rss http get()")?
            .error_for_status()
            .context("rss non-2xx")?;
        resp.text().await.context("rss http .text()")
    }

    fn name(&self) -> &'static str {
        "rss-http"
    }
}

fn scrub_html_entities_for_xml(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&ndash;", "-")
        .replace("&mdash;", "-")
        .replace("&ldquo;", "\"")
        .replace("&rdquo;", "\"")
        .replace("&lsquo;", "'")
        .replace("&rsquo;", "'")
        .replace("&eacute;", "é")
        .replace("&egrave;", "è")
        .replace("&agrave;", "à")
}
