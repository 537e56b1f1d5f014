// src/store/seen.rs
use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};

use super::{read_json_or_default, write_json_atomic, LoadOutcome};

/// Links that have already been handed to the classifier, whatever the outcome.
///
/// The on-disk record is a JSON array of strings; order carries no meaning but
/// insertion order is kept so the file diffs cleanly between scans.
#[derive(Debug)]
pub struct SeenStore {
    path: PathBuf,
    order: Vec<String>,
    index: HashSet<String>,
}

impl SeenStore {
    /// Open and load. Never fails: missing or corrupt storage starts empty.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let (order, _) = Self::load_all(&path);
        let index = order.iter().cloned().collect();
        Self { path, order, index }
    }

    /// Duplicates in the file are collapsed.
    pub fn load_all(path: &Path) -> (Vec<String>, LoadOutcome) {
        let (raw, outcome): (Vec<String>, _) = read_json_or_default(path);
        let mut seen = HashSet::with_capacity(raw.len());
        let links = raw.into_iter().filter(|l| seen.insert(l.clone())).collect();
        (links, outcome)
    }

    pub fn contains(&self, link: &str) -> bool {
        self.index.contains(link)
    }

    /// Record `link` and flush before returning. Returns `false` (and writes
    /// nothing) when the link was already present.
    ///
    /// A failed flush keeps the link in memory, so the current scan still
    /// never classifies it twice; the next successful flush persists it.
    pub fn mark_seen(&mut self, link: &str) -> bool {
        if !self.index.insert(link.to_string()) {
            return false;
        }
        self.order.push(link.to_string());
        if let Err(e) = self.persist() {
            tracing::warn!(
                target: "store",
                link, path = %self.path.display(), error = %e,
                "seen link not persisted"
            );
        }
        true
    }

    pub fn persist(&self) -> io::Result<()> {
        write_json_atomic(&self.path, &self.order)
    }

    pub fn links(&self) -> &[String] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}
