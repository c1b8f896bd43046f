use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::OwnedSemaphorePermit;

use crate::processing::retry::Retryable;

pub mod chrome;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("failed to launch browser: {0}")]
    Launch(String),
    #[error("failed to open tab: {0}")]
    Tab(String),
    #[error("navigation to {url} failed: {message}")]
    Navigation { url: String, message: String },
    #[error("failed to read rendered content of {url}: {message}")]
    Content { url: String, message: String },
    #[error("browser pool is closed")]
    PoolClosed,
    #[error("render budget for {url} ran out")]
    Timeout { url: String },
    #[error("render task failed: {0}")]
    Task(String),
}

impl Retryable for RenderError {
    fn is_transient(&self) -> bool {
        matches!(
            self,
            RenderError::Tab(_) | RenderError::Navigation { .. } | RenderError::Content { .. }
        )
    }
}

pub type RenderResult<T> = Result<T, RenderError>;

/// A fully rendered page.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedPage {
    /// URL that was requested.
    pub url: String,
    /// URL after redirects.
    pub final_url: String,
    pub title: Option<String>,
    pub html: String,
}

/// Renderer capacity reserved for one candidate. Dropping the slot hands the
/// capacity back.
#[derive(Debug, Default)]
pub struct RenderSlot {
    _permit: Option<OwnedSemaphorePermit>,
}

impl RenderSlot {
    pub fn new(permit: OwnedSemaphorePermit) -> Self {
        Self {
            _permit: Some(permit),
        }
    }
}

/// Loads a URL and returns its HTML after scripts have run.
#[async_trait]
pub trait PageRenderer: Send + Sync {
    /// Waits until the renderer has room for another candidate. Renderers
    /// without a limit of their own return a free slot immediately.
    async fn reserve(&self) -> RenderResult<RenderSlot> {
        Ok(RenderSlot::default())
    }

    /// Renders `url` using capacity reserved by [`PageRenderer::reserve`].
    async fn render(&self, slot: &RenderSlot, url: &str) -> RenderResult<RenderedPage>;
}
