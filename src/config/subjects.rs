// src/config/subjects.rs
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const ENV_SUBJECTS_PATH: &str = "SUBJECTS_PATH";

/// A watched topic. `nom`/`rss` keys are accepted for older subject files.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Subject {
    #[serde(alias = "nom")]
    pub name: String,
    #[serde(default, alias = "rss", skip_serializing_if = "Option::is_none")]
    pub feed_url: Option<String>,
}

impl Subject {
    pub fn new(name: &str, feed_url: Option<&str>) -> Self {
        Self {
            name: name.to_string(),
            feed_url: feed_url.map(str::to_string),
        }
    }
}

/// Load subjects from an explicit path. Supports TOML or JSON formats.
/// Unlike the state stores this is strict: a scan without subjects cannot start.
pub fn load_subjects_from(path: &Path) -> Result<Vec<Subject>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading subjects from {}", path.display()))?;
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    parse_subjects(&content, ext.as_str())
        .with_context(|| format!("parsing subjects from {}", path.display()))
}

/// `$SUBJECTS_PATH` wins over the configured path.
pub fn resolve_subjects_path(configured: &Path) -> PathBuf {
    std::env::var(ENV_SUBJECTS_PATH)
        .map(PathBuf::from)
        .unwrap_or_else(|_| configured.to_path_buf())
}

fn parse_subjects(s: &str, hint_ext: &str) -> Result<Vec<Subject>> {
    // Try TOML first if hinted or content looks like toml.
    let try_toml = hint_ext == "toml" || s.contains("[[subjects]]");
    if try_toml {
        if let Ok(v) = parse_toml(s) {
            return Ok(v);
        }
    }
    if let Ok(v) = parse_json(s) {
        return Ok(v);
    }
    if !try_toml {
        if let Ok(v) = parse_toml(s) {
            return Ok(v);
        }
    }
    Err(anyhow!("unsupported subjects format"))
}

fn parse_toml(s: &str) -> Result<Vec<Subject>> {
    #[derive(Deserialize)]
    struct TomlSubjects {
        subjects: Vec<Subject>,
    }
    let v: TomlSubjects = toml::from_str(s)?;
    Ok(clean_list(v.subjects))
}

fn parse_json(s: &str) -> Result<Vec<Subject>> {
    let v: Vec<Subject> = serde_json::from_str(s)?;
    Ok(clean_list(v))
}

/// Trim names, drop empty ones and blank feed URLs. Config order is kept.
fn clean_list(items: Vec<Subject>) -> Vec<Subject> {
    items
        .into_iter()
        .filter_map(|mut s| {
            s.name = s.name.trim().to_string();
            s.feed_url = s
                .feed_url
                .map(|u| u.trim().to_string())
                .filter(|u| !u.is_empty());
            (!s.name.is_empty()).then_some(s)
        })
        .collect()
}
