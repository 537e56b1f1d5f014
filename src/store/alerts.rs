// src/store/alerts.rs
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use metrics::counter;
use serde::{Deserialize, Serialize};

use super::{read_json_or_default, write_json_atomic};
use crate::ingest::types::{Candidate, SourceKind};

/// A candidate the classifier confirmed as relevant. Never mutated once stored.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Alert {
    pub subject: String,
    pub title: String,
    pub summary: String,
    pub link: String,
    #[serde(default)]
    pub published_at: Option<DateTime<Utc>>,
    pub source_kind: SourceKind,
}

impl Alert {
    pub fn from_candidate(c: &Candidate, summary: String) -> Self {
        Self {
            subject: c.subject.clone(),
            title: c.title.clone(),
            summary,
            link: c.link.clone(),
            published_at: c.published_at,
            source_kind: c.source_kind,
        }
    }
}

/// Append-only alert log stored as one JSON array.
///
/// There is no content dedup here: uniqueness is only as strong as the seen
/// filter upstream. Clones share one append lock, so the scan's flush and
/// manual appends never interleave their load-concat-persist cycles.
#[derive(Debug, Clone)]
pub struct AlertStore {
    path: PathBuf,
    append_lock: Arc<Mutex<()>>,
}

impl AlertStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            append_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Missing or corrupt storage reads as empty.
    pub fn load_all(&self) -> Vec<Alert> {
        read_json_or_default(&self.path).0
    }

    /// Load, concatenate, persist. Returns the new total.
    pub fn append_all(&self, batch: &[Alert]) -> Result<usize> {
        let _guard = self.append_lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut all = self.load_all();
        if batch.is_empty() {
            return Ok(all.len());
        }
        all.extend_from_slice(batch);
        write_json_atomic(&self.path, &all)
            .with_context(|| format!("writing alerts to {}", self.path.display()))?;
        counter!("alerts_appended_total").increment(batch.len() as u64);
        tracing::info!(
            target: "store",
            appended = batch.len(), total = all.len(),
            "alerts appended"
        );
        Ok(all.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn alert(link: &str) -> Alert {
        Alert {
            subject: "FICT".into(),
            title: "Arrêté".into(),
            summary: "Nouvelle limite".into(),
            link: link.into(),
            published_at: None,
            source_kind: SourceKind::Feed,
        }
    }

    #[test]
    fn append_grows_by_batch_len() {
        let dir = tempfile::tempdir().unwrap();
        let store = AlertStore::new(dir.path().join("alerts.json"));
        assert_eq!(store.append_all(&[alert("a"), alert("b")]).unwrap(), 2);
        assert_eq!(store.append_all(&[alert("c")]).unwrap(), 3);
        assert_eq!(store.append_all(&[]).unwrap(), 3);
        let links: Vec<_> = store.load_all().into_iter().map(|a| a.link).collect();
        assert_eq!(links, vec!["a", "b", "c"]);
    }

    #[test]
    fn same_link_twice_is_kept_twice() {
        let dir = tempfile::tempdir().unwrap();
        let store = AlertStore::new(dir.path().join("alerts.json"));
        store.append_all(&[alert("a")]).unwrap();
        store.append_all(&[alert("a")]).unwrap();
        assert_eq!(store.load_all().len(), 2);
    }

    #[test]
    fn corrupt_file_is_replaced_by_batch() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("alerts.json");
        fs::write(&p, "not json at all").unwrap();
        let store = AlertStore::new(&p);
        store.append_all(&[alert("x")]).unwrap();
        let raw = fs::read_to_string(&p).unwrap();
        let parsed: Vec<Alert> = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed, vec![alert("x")]);
    }

    #[test]
    fn concurrent_appends_through_clones_lose_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let store = AlertStore::new(dir.path().join("alerts.json"));

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let store = store.clone();
                std::thread::spawn(move || {
                    for i in 0..5 {
                        store.append_all(&[alert(&format!("{t}-{i}"))]).unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(store.load_all().len(), 40);
    }
}
