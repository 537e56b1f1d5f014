//! Classifier backends: provider abstraction + concrete providers.
//!
//! A backend takes one free-text prompt and a model id and returns free text.
//! It reports *why* a call failed so the caller can pick a backoff; it never
//! retries on its own.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BackendError {
    /// The provider asked us to slow down (HTTP 429).
    #[error("rate limited: {0}")]
    RateLimited(String),
    /// Network hiccup, 5xx, undecodable body: worth retrying.
    #[error("transient backend error: {0}")]
    Transient(String),
    /// Retrying cannot help (no key, rejected credentials).
    #[error("backend unavailable: {0}")]
    Fatal(String),
}

#[async_trait]
pub trait ClassifierBackend: Send + Sync {
    async fn complete(&self, prompt: &str, model: &str) -> Result<String, BackendError>;
    /// Provider name for diagnostics.
    fn name(&self) -> &'static str;
    /// `false` when the backend can never answer (e.g. no API key).
    fn is_enabled(&self) -> bool {
        true
    }
}

pub type DynBackend = Arc<dyn ClassifierBackend>;

/// Factory: build a backend according to environment variables.
///
/// * If `CLASSIFIER_TEST_MODE=mock`, returns a deterministic mock answering "Non".
/// * Else if `OPENAI_API_KEY` is missing, returns a disabled backend.
/// * Else builds the OpenAI chat-completions backend.
pub fn build_backend_from_env() -> DynBackend {
    if std::env::var("CLASSIFIER_TEST_MODE")
        .map(|v| v == "mock")
        .unwrap_or(false)
    {
        return Arc::new(MockBackend::fixed("Non"));
    }

    match std::env::var("OPENAI_API_KEY") {
        Ok(key) if !key.trim().is_empty() => match OpenAiBackend::new(key) {
            Ok(b) => Arc::new(b),
            Err(e) => {
                tracing::warn!(target: "classifier", error = %e, "openai backend unavailable");
                Arc::new(DisabledBackend)
            }
        },
        _ => {
            tracing::warn!(target: "classifier", "OPENAI_API_KEY missing, classifier disabled");
            Arc::new(DisabledBackend)
        }
    }
}

/// OpenAI provider (uses Chat Completions API).
pub struct OpenAiBackend {
    http: reqwest::Client,
    api_key: String,
    endpoint: String,
}

impl OpenAiBackend {
    pub fn new(api_key: String) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent("regwatch/0.1")
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(60))
            .build()?;
        Ok(Self {
            http,
            api_key,
            endpoint: "https://api.openai.com/v1/chat/completions".to_string(),
        })
    }
}

#[derive(Serialize)]
struct Msg<'a> {
    role: &'a str,
    content: &'a str,
}
#[derive(Serialize)]
struct Req<'a> {
    model: &'a str,
    messages: Vec<Msg<'a>>,
    temperature: f32,
}
#[derive(Deserialize)]
struct Resp {
    choices: Vec<Choice>,
}
#[derive(Deserialize)]
struct Choice {
    message: ChoiceMsg,
}
#[derive(Deserialize)]
struct ChoiceMsg {
    #[serde(default)]
    content: Option<String>,
}

#[async_trait]
impl ClassifierBackend for OpenAiBackend {
    async fn complete(&self, prompt: &str, model: &str) -> Result<String, BackendError> {
        let req = Req {
            model,
            messages: vec![Msg {
                role: "user",
                content: prompt,
            }],
            temperature: 0.0,
        };

        let resp = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&req)
            .send()
            .await
            .map_err(|e| BackendError::Transient(e.to_string()))?;

        let status = resp.status();
        if status.as_u16() == 429 {
            let body = resp.text().await.unwrap_or_default();
            return Err(BackendError::RateLimited(truncate(&body, 200)));
        }
        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(BackendError::Fatal(format!("openai rejected credentials ({status})")));
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(BackendError::Transient(format!(
                "openai status {status}: {}",
                truncate(&body, 200)
            )));
        }

        let body: Resp = resp
            .json()
            .await
            .map_err(|e| BackendError::Transient(format!("decoding openai response: {e}")))?;
        Ok(body
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default()
            .trim()
            .to_string())
    }

    fn name(&self) -> &'static str {
        "openai"
    }
}

fn truncate(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

/// Always fails fast; used when no provider is configured.
pub struct DisabledBackend;

#[async_trait]
impl ClassifierBackend for DisabledBackend {
    async fn complete(&self, _prompt: &str, _model: &str) -> Result<String, BackendError> {
        Err(BackendError::Fatal("classifier disabled".to_string()))
    }
    fn name(&self) -> &'static str {
        "disabled"
    }
    fn is_enabled(&self) -> bool {
        false
    }
}

type Responder = Box<dyn Fn(&str, usize) -> Result<String, BackendError> + Send + Sync>;

/// Deterministic backend for tests/local runs. Records every prompt it receives.
pub struct MockBackend {
    responder: Responder,
    calls: AtomicUsize,
    prompts: Mutex<Vec<String>>,
}

impl MockBackend {
    pub fn fixed(answer: &str) -> Self {
        let answer = answer.to_string();
        Self::from_fn(move |_, _| Ok(answer.clone()))
    }

    /// `f(prompt, call_index)`; `call_index` starts at 0 and counts every call.
    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn(&str, usize) -> Result<String, BackendError> + Send + Sync + 'static,
    {
        Self {
            responder: Box::new(f),
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl ClassifierBackend for MockBackend {
    async fn complete(&self, prompt: &str, _model: &str) -> Result<String, BackendError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(prompt.to_string());
        (self.responder)(prompt, n)
    }
    fn name(&self) -> &'static str {
        "mock"
    }
}
