// src/config/scan.rs
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::{env, fs};

pub const DEFAULT_SCAN_CONFIG_PATH: &str = "config/scan.toml";
pub const ENV_SCAN_CONFIG_PATH: &str = "SCAN_CONFIG_PATH";

pub const DEFAULT_PROMPT_TEMPLATE: &str = "Vérifie si cet article mentionne un changement réglementaire officiel en lien avec le sujet '{subject}'.
Titre : {title}
Contenu : {content}
Réponds uniquement par :
'Oui, résumé: <ton résumé>'
ou
'Non'";

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}
fn default_subjects_path() -> PathBuf {
    PathBuf::from("config/subjects.json")
}
fn default_model() -> String {
    "gpt-4".to_string()
}
fn default_affirmative() -> String {
    "oui".to_string()
}
fn default_delimiter() -> String {
    "résumé:".to_string()
}
fn default_template() -> String {
    DEFAULT_PROMPT_TEMPLATE.to_string()
}
fn default_rate_limit_backoff() -> u64 {
    10
}
fn default_transient_backoff() -> u64 {
    5
}
fn default_max_backoff() -> u64 {
    120
}
fn default_max_attempts() -> u32 {
    6
}
fn default_language() -> String {
    "fr".to_string()
}
fn default_results() -> u32 {
    10
}
fn default_variants() -> Vec<String> {
    vec![
        "{subject}".to_string(),
        "{subject} nouvelle réglementation".to_string(),
    ]
}

/// Top-level settings, loaded from `config/scan.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Directory holding seen links, alerts and the job status snapshot.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default = "default_subjects_path")]
    pub subjects_path: PathBuf,
    #[serde(default)]
    pub classifier: ClassifierSettings,
    #[serde(default)]
    pub search: SearchSettings,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            subjects_path: default_subjects_path(),
            classifier: ClassifierSettings::default(),
            search: SearchSettings::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierSettings {
    #[serde(default = "default_model")]
    pub model: String,
    /// Answer prefix meaning "relevant" (case-insensitive).
    #[serde(default = "default_affirmative")]
    pub affirmative_token: String,
    /// Marker after which the summary starts.
    #[serde(default = "default_delimiter")]
    pub summary_delimiter: String,
    /// Placeholders: `{subject}`, `{title}`, `{content}`.
    #[serde(default = "default_template")]
    pub prompt_template: String,
    #[serde(default)]
    pub retry: RetrySettings,
}

impl Default for ClassifierSettings {
    fn default() -> Self {
        Self {
            model: default_model(),
            affirmative_token: default_affirmative(),
            summary_delimiter: default_delimiter(),
            prompt_template: default_template(),
            retry: RetrySettings::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrySettings {
    #[serde(default = "default_rate_limit_backoff")]
    pub rate_limit_backoff_secs: u64,
    #[serde(default = "default_transient_backoff")]
    pub transient_backoff_secs: u64,
    #[serde(default = "default_max_backoff")]
    pub max_backoff_secs: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            rate_limit_backoff_secs: default_rate_limit_backoff(),
            transient_backoff_secs: default_transient_backoff(),
            max_backoff_secs: default_max_backoff(),
            max_attempts: default_max_attempts(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchSettings {
    /// `hl` parameter.
    #[serde(default = "default_language")]
    pub language: String,
    /// `gl` parameter.
    #[serde(default = "default_language")]
    pub country: String,
    #[serde(default = "default_results")]
    pub results_per_query: u32,
    /// Query templates; `{subject}` is replaced by the subject name.
    #[serde(default = "default_variants")]
    pub variants: Vec<String>,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            language: default_language(),
            country: default_language(),
            results_per_query: default_results(),
            variants: default_variants(),
        }
    }
}

impl ScanConfig {
    pub fn from_toml_str(s: &str) -> anyhow::Result<Self> {
        let mut cfg: ScanConfig = toml::from_str(s)?;
        cfg.sanitize();
        Ok(cfg)
    }

    /// Reads and parses `path`. If reading/parsing fails, returns `ScanConfig::default()`.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(s) => Self::from_toml_str(&s).unwrap_or_else(|e| {
                tracing::warn!(path = %path.display(), error = %e, "invalid scan config, using defaults");
                Self::default()
            }),
            Err(_) => {
                tracing::info!(path = %path.display(), "no scan config, using defaults");
                Self::default()
            }
        }
    }

    /// `$SCAN_CONFIG_PATH`, else `config/scan.toml`.
    pub fn load_default() -> Self {
        let path = env::var(ENV_SCAN_CONFIG_PATH)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_SCAN_CONFIG_PATH));
        Self::load_from_file(path)
    }

    fn sanitize(&mut self) {
        let c = &mut self.classifier;
        c.affirmative_token = c.affirmative_token.trim().to_string();
        if c.affirmative_token.is_empty() {
            c.affirmative_token = default_affirmative();
        }
        c.summary_delimiter = c.summary_delimiter.trim().to_string();
        if c.summary_delimiter.is_empty() {
            c.summary_delimiter = default_delimiter();
        }
        c.retry.max_attempts = c.retry.max_attempts.max(1);
        if c.retry.max_backoff_secs < c.retry.rate_limit_backoff_secs {
            c.retry.max_backoff_secs = c.retry.rate_limit_backoff_secs;
        }
        if self.search.results_per_query == 0 {
            self.search.results_per_query = default_results();
        }
    }
}
