// src/classify/mod.rs
//! Classifier: prompt rendering, bounded retry with exponential backoff, and
//! the typed answer decoder.

pub mod backend;
pub mod decode;

use std::time::Duration;

use metrics::{counter, describe_counter};
use once_cell::sync::OnceCell;
use thiserror::Error;

use crate::config::{ClassifierSettings, RetrySettings};
pub use backend::{BackendError, ClassifierBackend, DynBackend, MockBackend};
pub use decode::{AnswerFormat, ClassificationResult};

fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("classifier_calls_total", "Backend calls, including retries.");
        describe_counter!("classifier_retries_total", "Backend calls that were retried.");
        describe_counter!("classifier_relevant_total", "Answers decoded as relevant.");
        describe_counter!(
            "classifier_unavailable_total",
            "Classifications abandoned after the retry cap."
        );
    });
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ClassifierError {
    #[error("classifier unavailable after {attempts} attempt(s): {last_error}")]
    Unavailable { attempts: u32, last_error: String },
}

/// Backoff schedule. Each failure kind starts from its own base delay and
/// doubles per attempt, capped at `max_backoff`. Gives up after `max_attempts`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub rate_limit_backoff: Duration,
    pub transient_backoff: Duration,
    pub max_backoff: Duration,
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetrySettings::default())
    }
}

impl From<&RetrySettings> for RetryPolicy {
    fn from(s: &RetrySettings) -> Self {
        Self {
            rate_limit_backoff: Duration::from_secs(s.rate_limit_backoff_secs),
            transient_backoff: Duration::from_secs(s.transient_backoff_secs),
            max_backoff: Duration::from_secs(s.max_backoff_secs),
            max_attempts: s.max_attempts.max(1),
        }
    }
}

impl RetryPolicy {
    /// Delay before the retry that follows failed attempt number `attempt` (1-based).
    pub fn delay_for(&self, err: &BackendError, attempt: u32) -> Duration {
        let base = match err {
            BackendError::RateLimited(_) => self.rate_limit_backoff,
            _ => self.transient_backoff,
        };
        let factor = 1u32 << attempt.saturating_sub(1).min(16);
        base.saturating_mul(factor).min(self.max_backoff)
    }
}

/// What the prompt template gets to see about one candidate.
#[derive(Debug, Clone, Copy)]
pub struct PromptContext<'a> {
    pub subject: &'a str,
    pub title: &'a str,
    pub content: &'a str,
}

pub struct Classifier {
    backend: DynBackend,
    model: String,
    template: String,
    format: AnswerFormat,
    retry: RetryPolicy,
}

impl Classifier {
    pub fn new(
        backend: DynBackend,
        model: impl Into<String>,
        template: impl Into<String>,
        format: AnswerFormat,
        retry: RetryPolicy,
    ) -> Self {
        ensure_metrics_described();
        Self {
            backend,
            model: model.into(),
            template: template.into(),
            format,
            retry,
        }
    }

    pub fn from_settings(backend: DynBackend, s: &ClassifierSettings) -> Self {
        Self::new(
            backend,
            s.model.clone(),
            s.prompt_template.clone(),
            AnswerFormat::new(&s.affirmative_token, &s.summary_delimiter),
            RetryPolicy::from(&s.retry),
        )
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn is_enabled(&self) -> bool {
        self.backend.is_enabled()
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// `{content}` is substituted last so placeholders inside article text stay literal.
    pub fn render_prompt(&self, ctx: &PromptContext<'_>) -> String {
        self.template
            .replace("{subject}", ctx.subject)
            .replace("{title}", ctx.title)
            .replace("{content}", ctx.content)
    }

    pub async fn classify(
        &self,
        ctx: &PromptContext<'_>,
    ) -> Result<ClassificationResult, ClassifierError> {
        let prompt = self.render_prompt(ctx);
        let answer = self.complete_raw(&prompt, &self.model).await?;
        let result = self.format.decode(&answer);
        if result.relevant {
            counter!("classifier_relevant_total").increment(1);
        }
        Ok(result)
    }

    /// Backend call wrapped in the retry policy; returns the raw answer text.
    pub async fn complete_raw(&self, prompt: &str, model: &str) -> Result<String, ClassifierError> {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            counter!("classifier_calls_total").increment(1);
            let err = match self.backend.complete(prompt, model).await {
                Ok(text) => return Ok(text.trim().to_string()),
                Err(e) => e,
            };

            let give_up = matches!(err, BackendError::Fatal(_)) || attempt >= self.retry.max_attempts;
            if give_up {
                tracing::error!(
                    target: "classifier",
                    backend = self.backend.name(), attempt, error = %err,
                    "classifier giving up"
                );
                counter!("classifier_unavailable_total").increment(1);
                return Err(ClassifierError::Unavailable {
                    attempts: attempt,
                    last_error: err.to_string(),
                });
            }

            let delay = self.retry.delay_for(&err, attempt);
            tracing::warn!(
                target: "classifier",
                backend = self.backend.name(), attempt,
                delay_ms = delay.as_millis() as u64, error = %err,
                "classifier call failed, retrying"
            );
            counter!("classifier_retries_total").increment(1);
            tokio::time::sleep(delay).await;
        }
    }
}
