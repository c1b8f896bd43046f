use thiserror::Error;

use crate::browser::RenderError;
use crate::scoring::ScoreError;

pub mod discovery;
pub mod filter;
pub mod preview;
pub mod retry;

/// Why a single candidate could not be judged.
#[derive(Debug, Error)]
pub enum CheckError {
    #[error(transparent)]
    Render(#[from] RenderError),
    #[error("page has no readable text")]
    EmptyPage,
    #[error(transparent)]
    Score(#[from] ScoreError),
}
