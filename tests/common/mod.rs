//! Fakes shared by the integration tests.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use grant_discovery::browser::{PageRenderer, RenderError, RenderResult, RenderSlot, RenderedPage};
use grant_discovery::domain::candidate::SearchHit;
use grant_discovery::domain::grant::NewGrantCandidate;
use grant_discovery::processing::discovery::{Discoverer, DiscoverySettings};
use grant_discovery::processing::retry::RetryPolicy;
use grant_discovery::repository::{
    CandidateWriter, RepositoryError, RepositoryResult, SeedReader,
};
use grant_discovery::scoring::{RelevanceScorer, ScoreError, ScoreResult};
use grant_discovery::search::{SearchError, SearchProvider, SearchResult};
use tokio::sync::Semaphore;

/// Tracks how many calls are in flight and the highest count observed.
#[derive(Default)]
pub struct InFlightGauge {
    current: AtomicUsize,
    peak: AtomicUsize,
}

impl InFlightGauge {
    fn enter(&self) {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
    }

    fn exit(&self) {
        self.current.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

/// Search results keyed by query; queries listed in `failing` return an error.
#[derive(Default)]
pub struct FakeSearch {
    results: HashMap<String, Vec<String>>,
    failing: Vec<String>,
    pub calls: Mutex<Vec<String>>,
}

impl FakeSearch {
    pub fn with_results(mut self, query: &str, urls: &[&str]) -> Self {
        self.results.insert(
            query.to_string(),
            urls.iter().map(|u| u.to_string()).collect(),
        );
        self
    }

    pub fn failing(mut self, query: &str) -> Self {
        self.failing.push(query.to_string());
        self
    }
}

#[async_trait]
impl SearchProvider for FakeSearch {
    async fn search(&self, query: &str) -> SearchResult<Vec<SearchHit>> {
        self.calls.lock().unwrap().push(query.to_string());
        if self.failing.iter().any(|q| q == query) {
            return Err(SearchError::Api(format!("quota exhausted for '{query}'")));
        }
        Ok(self
            .results
            .get(query)
            .map(|urls| {
                urls.iter()
                    .map(|url| SearchHit {
                        url: url.clone(),
                        title: format!("Title of {url}"),
                        snippet: String::new(),
                    })
                    .collect()
            })
            .unwrap_or_default())
    }
}

/// What the fake browser does for a URL.
#[derive(Clone)]
pub enum PageBehavior {
    Html(String),
    Hang,
    Fail,
    /// Fails transiently this many times, then serves the HTML.
    Flaky(usize, String),
}

pub fn page(text: &str) -> PageBehavior {
    PageBehavior::Html(format!(
        "<html><head><title>{text}</title></head><body><p>{text}</p></body></html>"
    ))
}

pub struct FakeRenderer {
    pages: HashMap<String, PageBehavior>,
    delay: Duration,
    attempts: Mutex<HashMap<String, usize>>,
    pub gauge: InFlightGauge,
    pub completed: Mutex<Vec<String>>,
}

impl FakeRenderer {
    pub fn new(delay: Duration) -> Self {
        Self {
            pages: HashMap::new(),
            delay,
            attempts: Mutex::new(HashMap::new()),
            gauge: InFlightGauge::default(),
            completed: Mutex::new(Vec::new()),
        }
    }

    pub fn with_page(mut self, url: &str, behavior: PageBehavior) -> Self {
        self.pages.insert(url.to_string(), behavior);
        self
    }

    pub fn attempts(&self, url: &str) -> usize {
        self.attempts.lock().unwrap().get(url).copied().unwrap_or(0)
    }
}

struct GaugeGuard<'a>(&'a InFlightGauge);

impl<'a> GaugeGuard<'a> {
    fn enter(gauge: &'a InFlightGauge) -> Self {
        gauge.enter();
        Self(gauge)
    }
}

impl Drop for GaugeGuard<'_> {
    fn drop(&mut self) {
        self.0.exit();
    }
}

#[async_trait]
impl PageRenderer for FakeRenderer {
    async fn render(&self, _slot: &RenderSlot, url: &str) -> RenderResult<RenderedPage> {
        let _guard = GaugeGuard::enter(&self.gauge);
        let attempt = {
            let mut attempts = self.attempts.lock().unwrap();
            let count = attempts.entry(url.to_string()).or_insert(0);
            *count += 1;
            *count
        };

        tokio::time::sleep(self.delay).await;

        let html = match self.pages.get(url).cloned() {
            Some(PageBehavior::Html(html)) => html,
            Some(PageBehavior::Hang) => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                unreachable!("hanging page must be cancelled by the deadline")
            }
            Some(PageBehavior::Flaky(failures, html)) if attempt > failures => html,
            Some(PageBehavior::Flaky(..)) => {
                return Err(RenderError::Navigation {
                    url: url.to_string(),
                    message: "net::ERR_CONNECTION_RESET".to_string(),
                });
            }
            Some(PageBehavior::Fail) | None => {
                return Err(RenderError::Launch("browser crashed".to_string()));
            }
        };

        self.completed.lock().unwrap().push(url.to_string());
        Ok(RenderedPage {
            url: url.to_string(),
            final_url: url.to_string(),
            title: None,
            html,
        })
    }
}

/// A renderer shaped like the browser pool: a fixed number of slots, and
/// page loads that block a worker thread until they finish on their own.
pub struct BlockingRenderer {
    semaphore: Arc<Semaphore>,
    load_time: Duration,
    hanging: HashMap<String, Duration>,
    pub gauge: InFlightGauge,
}

impl BlockingRenderer {
    pub fn new(slots: usize, load_time: Duration) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(slots)),
            load_time,
            hanging: HashMap::new(),
            gauge: InFlightGauge::default(),
        }
    }

    /// Loading `url` blocks its thread for `hang`, past any deadline.
    pub fn with_hanging(mut self, url: &str, hang: Duration) -> Self {
        self.hanging.insert(url.to_string(), hang);
        self
    }
}

#[async_trait]
impl PageRenderer for BlockingRenderer {
    async fn reserve(&self) -> RenderResult<RenderSlot> {
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| RenderError::PoolClosed)?;
        Ok(RenderSlot::new(permit))
    }

    async fn render(&self, _slot: &RenderSlot, url: &str) -> RenderResult<RenderedPage> {
        let _guard = GaugeGuard::enter(&self.gauge);
        let load_time = self.hanging.get(url).copied().unwrap_or(self.load_time);
        let text = url.to_string();
        let html = tokio::task::spawn_blocking(move || {
            std::thread::sleep(load_time);
            format!("<html><body><p>Grant program at {text}</p></body></html>")
        })
        .await
        .map_err(|e| RenderError::Task(e.to_string()))?;

        Ok(RenderedPage {
            url: url.to_string(),
            final_url: url.to_string(),
            title: None,
            html,
        })
    }
}

/// Scores keyed by URL; URLs without a score get a malformed reply.
pub struct FakeScorer {
    scores: HashMap<String, f32>,
    delay: Duration,
    pub gauge: InFlightGauge,
    pub max_preview_chars: AtomicUsize,
}

impl FakeScorer {
    pub fn new(delay: Duration) -> Self {
        Self {
            scores: HashMap::new(),
            delay,
            gauge: InFlightGauge::default(),
            max_preview_chars: AtomicUsize::new(0),
        }
    }

    pub fn with_score(mut self, url: &str, score: f32) -> Self {
        self.scores.insert(url.to_string(), score);
        self
    }
}

#[async_trait]
impl RelevanceScorer for FakeScorer {
    async fn score(&self, url: &str, preview: &str) -> ScoreResult<f32> {
        let _guard = GaugeGuard::enter(&self.gauge);
        self.max_preview_chars
            .fetch_max(preview.chars().count(), Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.scores
            .get(url)
            .copied()
            .ok_or_else(|| ScoreError::Malformed("I cannot tell".to_string()))
    }
}

/// In-memory seed data and staging table. Like the real staging upsert,
/// rows whose URL is already staged are skipped and not counted.
#[derive(Default)]
pub struct MemoryRepository {
    pub funders: Vec<String>,
    pub known_urls: Vec<String>,
    /// Staged by someone else after the known URLs were read.
    pub staged_elsewhere: Vec<String>,
    pub fail_seeds: bool,
    pub fail_writes: bool,
    pub staged: Mutex<Vec<NewGrantCandidate>>,
}

impl MemoryRepository {
    pub fn staged_urls(&self) -> Vec<String> {
        let mut urls: Vec<String> = self
            .staged
            .lock()
            .unwrap()
            .iter()
            .map(|c| c.url.clone())
            .collect();
        urls.sort();
        urls
    }
}

#[async_trait]
impl SeedReader for MemoryRepository {
    async fn list_funder_names(&self) -> RepositoryResult<Vec<String>> {
        if self.fail_seeds {
            return Err(RepositoryError::Decode("funders unavailable".to_string()));
        }
        Ok(self.funders.clone())
    }

    async fn list_known_urls(&self) -> RepositoryResult<Vec<String>> {
        if self.fail_seeds {
            return Err(RepositoryError::Decode("grants unavailable".to_string()));
        }
        Ok(self.known_urls.clone())
    }
}

#[async_trait]
impl CandidateWriter for MemoryRepository {
    async fn stage_candidates(&self, candidates: &[NewGrantCandidate]) -> RepositoryResult<usize> {
        if self.fail_writes {
            return Err(RepositoryError::Decode("insert rejected".to_string()));
        }
        let mut staged = self.staged.lock().unwrap();
        let mut inserted = 0;
        for candidate in candidates {
            let duplicate = self.staged_elsewhere.contains(&candidate.url)
                || staged.iter().any(|row| row.url == candidate.url);
            if !duplicate {
                staged.push(candidate.clone());
                inserted += 1;
            }
        }
        Ok(inserted)
    }
}

/// Defaults with no retries and a short deadline.
pub fn test_settings(max_processing_time: Duration) -> DiscoverySettings {
    DiscoverySettings {
        max_processing_time,
        retry: RetryPolicy::none(),
        ..Default::default()
    }
}

pub fn discoverer(
    search: Arc<FakeSearch>,
    renderer: Arc<FakeRenderer>,
    scorer: Arc<FakeScorer>,
    settings: DiscoverySettings,
) -> Discoverer {
    Discoverer::new(search, renderer, scorer, settings)
}
