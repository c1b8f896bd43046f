use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::domain::candidate::CandidateOutcome;

/// Review state assigned to freshly staged candidates.
pub const PENDING_REVIEW: &str = "pending_review";

/// Row written to the `grant_staging` table for an accepted candidate.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewGrantCandidate {
    pub url: String,
    pub title: String,
    pub snippet: String,
    pub search_query: String,
    pub relevance_score: f32,
    pub preview: String,
    pub discovered_at: DateTime<Utc>,
    pub status: String,
}

impl NewGrantCandidate {
    /// Builds a staging row from an accepted, scored outcome. Any other
    /// outcome yields `None`.
    pub fn from_outcome(outcome: &CandidateOutcome) -> Option<Self> {
        if !outcome.is_accepted() {
            return None;
        }
        let relevance_score = outcome.score?;
        let candidate = &outcome.candidate;
        Some(Self {
            url: candidate.url.clone(),
            title: candidate.title.clone(),
            snippet: candidate.snippet.clone(),
            search_query: candidate.query.clone(),
            relevance_score,
            preview: outcome.preview.clone().unwrap_or_default(),
            discovered_at: candidate.discovered_at,
            status: PENDING_REVIEW.to_string(),
        })
    }
}
