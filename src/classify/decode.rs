// src/classify/decode.rs
//! The one place that tolerates free-text backend output.

use serde::{Deserialize, Serialize};

/// Structured verdict for one candidate. `summary` is `Some` iff `relevant`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub relevant: bool,
    pub summary: Option<String>,
}

impl ClassificationResult {
    pub fn not_relevant() -> Self {
        Self {
            relevant: false,
            summary: None,
        }
    }

    pub fn relevant(summary: impl Into<String>) -> Self {
        Self {
            relevant: true,
            summary: Some(summary.into()),
        }
    }
}

/// Expected answer shape: `<affirmative>[sep] <delimiter> <summary>`, e.g.
/// `Oui, résumé: Nouvelle limite de résidus`. Anything else is "not relevant".
#[derive(Debug, Clone)]
pub struct AnswerFormat {
    affirmative: String,
    delimiter: String,
}

impl AnswerFormat {
    pub fn new(affirmative: &str, delimiter: &str) -> Self {
        Self {
            affirmative: affirmative.trim().to_string(),
            delimiter: delimiter.trim().to_string(),
        }
    }

    pub fn decode(&self, answer: &str) -> ClassificationResult {
        let line = answer.trim_start().lines().next().unwrap_or_default();

        let Some(rest) = strip_prefix_ci(line, &self.affirmative) else {
            return ClassificationResult::not_relevant();
        };
        // "Ouistiti" is not "Oui".
        if rest.chars().next().is_some_and(char::is_alphanumeric) {
            return ClassificationResult::not_relevant();
        }
        let rest = rest.trim_start_matches(|c: char| {
            c.is_whitespace() || matches!(c, ',' | ';' | ':' | '.' | '-')
        });
        let Some(summary) = strip_prefix_ci(rest, &self.delimiter) else {
            return ClassificationResult::not_relevant();
        };
        let summary = summary.trim();
        if summary.is_empty() {
            return ClassificationResult::not_relevant();
        }
        ClassificationResult::relevant(summary)
    }
}

impl Default for AnswerFormat {
    fn default() -> Self {
        Self::new("oui", "résumé:")
    }
}

/// Case-insensitive (Unicode lowercase) prefix strip. Whitespace in `s` is
/// skipped before punctuation in `prefix`, so "résumé :" matches "résumé:".
fn strip_prefix_ci<'a>(s: &'a str, prefix: &str) -> Option<&'a str> {
    let mut rest = s;
    for pc in prefix.chars() {
        if pc.is_ascii_punctuation() {
            rest = rest.trim_start();
        }
        let mut it = rest.chars();
        let sc = it.next()?;
        if !sc.to_lowercase().eq(pc.to_lowercase()) {
            return None;
        }
        rest = it.as_str();
    }
    Some(rest)
}
