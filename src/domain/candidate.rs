use chrono::{DateTime, Utc};
use serde::Serialize;

/// A single organic result returned by the search API.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub url: String,
    pub title: String,
    pub snippet: String,
}

/// A URL surfaced by search that may or may not be a genuine grant page.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CandidateUrl {
    pub url: String,
    pub title: String,
    pub snippet: String,
    /// Search query that produced this candidate.
    pub query: String,
    pub discovered_at: DateTime<Utc>,
}

impl CandidateUrl {
    pub fn from_hit(hit: SearchHit, query: &str) -> Self {
        Self {
            url: hit.url,
            title: hit.title,
            snippet: hit.snippet,
            query: query.to_string(),
            discovered_at: Utc::now(),
        }
    }
}

/// Furthest processing stage a candidate reached. Stages only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Discovered,
    Fetched,
    Scored,
}

/// Terminal state of a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateStatus {
    Accepted,
    Rejected,
    TimedOut,
    Error,
}

/// Applies the relevance threshold. A score equal to the threshold passes.
pub fn decide(score: f32, threshold: f32) -> CandidateStatus {
    if score >= threshold {
        CandidateStatus::Accepted
    } else {
        CandidateStatus::Rejected
    }
}

/// Result of checking one candidate URL.
#[derive(Debug, Clone, Serialize)]
pub struct CandidateOutcome {
    pub candidate: CandidateUrl,
    pub stage: Stage,
    pub score: Option<f32>,
    pub preview: Option<String>,
    pub status: CandidateStatus,
    pub error: Option<String>,
}

impl CandidateOutcome {
    pub fn scored(candidate: CandidateUrl, preview: String, score: f32, threshold: f32) -> Self {
        Self {
            candidate,
            stage: Stage::Scored,
            score: Some(score),
            preview: Some(preview),
            status: decide(score, threshold),
            error: None,
        }
    }

    /// The page could not be judged; it is rejected rather than let through.
    pub fn rejected(candidate: CandidateUrl, stage: Stage, error: String) -> Self {
        Self {
            candidate,
            stage,
            score: None,
            preview: None,
            status: CandidateStatus::Rejected,
            error: Some(error),
        }
    }

    pub fn failed(candidate: CandidateUrl, stage: Stage, error: String) -> Self {
        Self {
            candidate,
            stage,
            score: None,
            preview: None,
            status: CandidateStatus::Error,
            error: Some(error),
        }
    }

    pub fn timed_out(candidate: CandidateUrl, stage: Stage) -> Self {
        Self {
            candidate,
            stage,
            score: None,
            preview: None,
            status: CandidateStatus::TimedOut,
            error: Some("processing deadline exceeded".to_string()),
        }
    }

    pub fn is_accepted(&self) -> bool {
        self.status == CandidateStatus::Accepted
    }
}
