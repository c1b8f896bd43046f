pub mod browser;
pub mod domain;
pub mod http;
pub mod models;
pub mod processing;
pub mod repository;
pub mod scoring;
pub mod search;

/// Minimum LLM relevance score (inclusive) for a candidate to be accepted.
pub const RELEVANCE_THRESHOLD: f32 = 0.7;

/// Maximum number of characters of page text sent to the relevance scorer.
pub const PREVIEW_LENGTH: usize = 2000;

/// Upper bound on concurrent fetch/score operations and concurrent searches.
pub const MAX_CONCURRENT_CHECKS: usize = 3;

/// Per-URL deadline covering render, preview extraction and scoring.
pub const MAX_PROCESSING_TIME_SECS: u64 = 30;

/// Number of candidate URLs processed per batch.
pub const BATCH_SIZE: usize = 10;

/// Gemini model used for relevance scoring.
pub const GEMINI_MODEL: &str = "gemini-1.5-flash-latest";
