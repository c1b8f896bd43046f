use async_trait::async_trait;
use thiserror::Error;

use crate::domain::candidate::SearchHit;
use crate::http::{is_transient_status, is_transient_transport};
use crate::processing::retry::Retryable;

pub mod serpapi;

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("failed to build search client: {0}")]
    Build(String),
    /// Stored without its URL, which carries the API key.
    #[error("search request failed: {0}")]
    Http(reqwest::Error),
    #[error("search API returned {status}: {message}")]
    Status {
        status: reqwest::StatusCode,
        message: String,
    },
    #[error("search API error: {0}")]
    Api(String),
    #[error("failed to decode search response: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for SearchError {
    fn from(e: reqwest::Error) -> Self {
        SearchError::Http(e.without_url())
    }
}

impl Retryable for SearchError {
    fn is_transient(&self) -> bool {
        match self {
            SearchError::Http(e) => is_transient_transport(e),
            SearchError::Status { status, .. } => is_transient_status(*status),
            SearchError::Build(_) | SearchError::Api(_) | SearchError::Decode(_) => false,
        }
    }
}

pub type SearchResult<T> = Result<T, SearchError>;

/// An abstraction over web search APIs that turn a query into candidate
/// result URLs.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Runs a single query and returns its organic results in rank order.
    /// A query with no results is `Ok` with an empty list.
    async fn search(&self, query: &str) -> SearchResult<Vec<SearchHit>>;
}
