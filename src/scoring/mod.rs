use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use thiserror::Error;

use crate::http::{is_transient_status, is_transient_transport};
use crate::processing::retry::Retryable;

pub mod gemini;

#[derive(Debug, Error)]
pub enum ScoreError {
    #[error("scoring request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("scoring API returned {status}: {message}")]
    Status {
        status: reqwest::StatusCode,
        message: String,
    },
    #[error("model returned an empty response")]
    EmptyResponse,
    #[error("could not read a score from model reply: {0}")]
    Malformed(String),
    #[error("score {0} is outside 0..=1")]
    OutOfRange(f32),
}

impl Retryable for ScoreError {
    fn is_transient(&self) -> bool {
        match self {
            ScoreError::Http(e) => is_transient_transport(e),
            ScoreError::Status { status, .. } => is_transient_status(*status),
            ScoreError::EmptyResponse | ScoreError::Malformed(_) | ScoreError::OutOfRange(_) => {
                false
            }
        }
    }
}

pub type ScoreResult<T> = Result<T, ScoreError>;

/// Rates how likely a page is to be a grant opportunity for Bay Area
/// nonprofits, from 0 to 1.
#[async_trait]
pub trait RelevanceScorer: Send + Sync {
    async fn score(&self, url: &str, preview: &str) -> ScoreResult<f32>;
}

/// Instruction sent to the model together with the page preview.
pub fn relevance_prompt(url: &str, preview: &str) -> String {
    format!(
        "You review web pages for a grant-discovery platform serving Bay Area nonprofits.\n\
         Rate how likely this page is a currently relevant grant or funding opportunity \
         that a San Francisco Bay Area nonprofit could apply for. Directory pages, news \
         articles, job postings and pages for individuals score low.\n\
         Reply with JSON only, in the form {{\"score\": <number between 0 and 1>}}.\n\n\
         URL: {url}\n\
         Page text:\n{preview}"
    )
}

#[derive(Debug, Deserialize)]
struct ScoreReply {
    score: f32,
}

/// A number labelled as the score, e.g. `Relevance: 0.65` or `score is 0.2`.
static LABELLED_SCORE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\b(?:score|relevance)\b"?\s*(?:is\s+|of\s+)?[:=]?\s*(-?\d+(?:\.\d+)?)"#)
        .expect("valid score pattern")
});

fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(inner) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let inner = inner.strip_prefix("json").unwrap_or(inner);
    inner.strip_suffix("```").unwrap_or(inner).trim()
}

/// Reads the relevance score from a model reply.
///
/// Accepts `{"score": x}` JSON (optionally fenced), a bare number, or a number
/// labelled `score`/`relevance` in free text. Other numbers in prose are never
/// read as a score. Anything unreadable or outside `0..=1` is an error so that
/// the candidate is rejected.
pub fn parse_relevance_score(reply: &str) -> ScoreResult<f32> {
    let text = strip_code_fence(reply);
    if text.is_empty() {
        return Err(ScoreError::EmptyResponse);
    }

    let score = if let Ok(parsed) = serde_json::from_str::<ScoreReply>(text) {
        parsed.score
    } else if let Ok(value) = text.parse::<f32>() {
        value
    } else {
        LABELLED_SCORE
            .captures(text)
            .and_then(|caps| caps.get(1))
            .and_then(|m| m.as_str().parse::<f32>().ok())
            .ok_or_else(|| ScoreError::Malformed(text.chars().take(120).collect()))?
    };

    if !score.is_finite() || !(0.0..=1.0).contains(&score) {
        return Err(ScoreError::OutOfRange(score));
    }
    Ok(score)
}
