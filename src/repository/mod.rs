use async_trait::async_trait;
use thiserror::Error;

use crate::domain::grant::NewGrantCandidate;
use crate::http::{is_transient_status, is_transient_transport};
use crate::processing::retry::Retryable;

pub mod supabase;

pub use supabase::SupabaseRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("invalid repository configuration: {0}")]
    Build(String),
    #[error("repository request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("repository returned {status}: {message}")]
    Status {
        status: reqwest::StatusCode,
        message: String,
    },
    #[error("failed to decode repository response: {0}")]
    Decode(String),
}

impl Retryable for RepositoryError {
    fn is_transient(&self) -> bool {
        match self {
            RepositoryError::Http(e) => is_transient_transport(e),
            RepositoryError::Status { status, .. } => is_transient_status(*status),
            RepositoryError::Build(_) | RepositoryError::Decode(_) => false,
        }
    }
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// Seed data read at the start of a run.
#[async_trait]
pub trait SeedReader: Send + Sync {
    /// Names of funders whose grant pages should be searched for.
    async fn list_funder_names(&self) -> RepositoryResult<Vec<String>>;

    /// URLs already imported or staged, used to skip known candidates.
    async fn list_known_urls(&self) -> RepositoryResult<Vec<String>>;
}

#[async_trait]
pub trait CandidateWriter: Send + Sync {
    /// Stages accepted candidates for review. Candidates whose URL is already
    /// staged are ignored. Returns the number of rows actually staged.
    async fn stage_candidates(&self, candidates: &[NewGrantCandidate]) -> RepositoryResult<usize>;
}
