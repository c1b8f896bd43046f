use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use futures::{StreamExt, stream};
use serde::Serialize;

use crate::browser::{PageRenderer, RenderSlot};
use crate::domain::candidate::{CandidateOutcome, CandidateStatus, CandidateUrl, Stage};
use crate::domain::grant::NewGrantCandidate;
use crate::models::config::ImporterConfig;
use crate::processing::CheckError;
use crate::processing::filter::{CandidateFilter, DEFAULT_BLOCKED_DOMAINS};
use crate::processing::preview::extract_preview;
use crate::processing::retry::RetryPolicy;
use crate::repository::{CandidateWriter, SeedReader};
use crate::scoring::RelevanceScorer;
use crate::search::SearchProvider;
use crate::{
    BATCH_SIZE, MAX_CONCURRENT_CHECKS, MAX_PROCESSING_TIME_SECS, PREVIEW_LENGTH,
    RELEVANCE_THRESHOLD,
};

/// Knobs of a discovery run.
#[derive(Debug, Clone)]
pub struct DiscoverySettings {
    pub relevance_threshold: f32,
    pub preview_length: usize,
    pub max_concurrent_checks: usize,
    pub max_processing_time: Duration,
    pub batch_size: usize,
    pub retry: RetryPolicy,
    pub blocked_domains: Vec<String>,
    /// Print accepted candidates instead of staging them.
    pub dry_run: bool,
}

impl Default for DiscoverySettings {
    fn default() -> Self {
        Self {
            relevance_threshold: RELEVANCE_THRESHOLD,
            preview_length: PREVIEW_LENGTH,
            max_concurrent_checks: MAX_CONCURRENT_CHECKS,
            max_processing_time: Duration::from_secs(MAX_PROCESSING_TIME_SECS),
            batch_size: BATCH_SIZE,
            retry: RetryPolicy::default(),
            blocked_domains: DEFAULT_BLOCKED_DOMAINS.iter().map(|d| d.to_string()).collect(),
            dry_run: false,
        }
    }
}

impl From<&ImporterConfig> for DiscoverySettings {
    fn from(config: &ImporterConfig) -> Self {
        Self {
            relevance_threshold: config.relevance_threshold,
            preview_length: config.preview_length,
            max_concurrent_checks: config.max_concurrent_checks,
            max_processing_time: config.max_processing_time(),
            batch_size: config.batch_size,
            retry: config.retry_policy(),
            blocked_domains: config.blocked_domains.clone(),
            dry_run: config.dry_run,
        }
    }
}

/// Counters for one run.
#[derive(Debug, Default, Clone, Serialize)]
pub struct RunReport {
    pub queries: usize,
    pub queries_failed: usize,
    pub discovered: usize,
    pub filtered: usize,
    pub checked: usize,
    pub accepted: usize,
    pub rejected: usize,
    pub timed_out: usize,
    pub errored: usize,
    pub staged: usize,
    pub staging_failures: usize,
    pub accepted_urls: Vec<String>,
}

impl RunReport {
    fn record(&mut self, outcomes: &[CandidateOutcome]) {
        for outcome in outcomes {
            self.checked += 1;
            match outcome.status {
                CandidateStatus::Accepted => {
                    self.accepted += 1;
                    self.accepted_urls.push(outcome.candidate.url.clone());
                }
                CandidateStatus::Rejected => self.rejected += 1,
                CandidateStatus::TimedOut => self.timed_out += 1,
                CandidateStatus::Error => self.errored += 1,
            }
        }
    }

    /// A run failed as a whole when no query could be run or accepted
    /// candidates could not be written.
    pub fn is_failure(&self) -> bool {
        (self.queries > 0 && self.queries_failed == self.queries) || self.staging_failures > 0
    }
}

/// Configured queries followed by one query per funder, trimmed and without
/// duplicates.
pub fn build_queries(configured: &[String], funder_names: &[String]) -> Vec<String> {
    let funder_queries = funder_names
        .iter()
        .map(|name| name.trim())
        .filter(|name| !name.is_empty())
        .map(|name| format!("{name} grant opportunities"));

    let mut seen = HashSet::new();
    configured
        .iter()
        .map(|q| q.trim().to_string())
        .chain(funder_queries)
        .filter(|q| !q.is_empty())
        .filter(|q| seen.insert(q.to_lowercase()))
        .collect()
}

/// Search, render, score and stage grant candidates.
///
/// Every external collaborator is injected so that tests can substitute fakes.
pub struct Discoverer {
    search: Arc<dyn SearchProvider>,
    renderer: Arc<dyn PageRenderer>,
    scorer: Arc<dyn RelevanceScorer>,
    settings: DiscoverySettings,
}

impl Discoverer {
    pub fn new(
        search: Arc<dyn SearchProvider>,
        renderer: Arc<dyn PageRenderer>,
        scorer: Arc<dyn RelevanceScorer>,
        settings: DiscoverySettings,
    ) -> Self {
        Self {
            search,
            renderer,
            scorer,
            settings,
        }
    }

    pub fn settings(&self) -> &DiscoverySettings {
        &self.settings
    }

    /// Runs every query with at most `max_concurrent_checks` searches in
    /// flight. A failing query is logged and counted; the others still run.
    /// Candidates keep query order.
    pub async fn search_all(
        &self,
        queries: &[String],
        report: &mut RunReport,
    ) -> Vec<CandidateUrl> {
        let results = stream::iter(queries)
            .map(|query| async move {
                let result = self
                    .settings
                    .retry
                    .run("search", || self.search.search(query))
                    .await;
                (query, result)
            })
            .buffered(self.settings.max_concurrent_checks.max(1))
            .collect::<Vec<_>>()
            .await;

        let mut candidates = Vec::new();
        for (query, result) in results {
            match result {
                Ok(hits) => {
                    if hits.is_empty() {
                        log::warn!("Search for '{query}' returned no results");
                    }
                    candidates
                        .extend(hits.into_iter().map(|hit| CandidateUrl::from_hit(hit, query)));
                }
                Err(e) => {
                    log::error!("Search for '{query}' failed, skipping: {e}");
                    report.queries_failed += 1;
                }
            }
        }
        candidates
    }

    /// Checks one batch with at most `max_concurrent_checks` candidates in
    /// flight. Outcomes are in completion order.
    pub async fn process_batch(&self, batch: Vec<CandidateUrl>) -> Vec<CandidateOutcome> {
        stream::iter(batch)
            .map(|candidate| self.check_candidate(candidate))
            .buffer_unordered(self.settings.max_concurrent_checks.max(1))
            .collect()
            .await
    }

    /// Renders, previews and scores a candidate within the per-URL deadline.
    /// The deadline starts once the renderer has a slot for the candidate.
    /// Never fails: every problem becomes a terminal outcome.
    pub async fn check_candidate(&self, candidate: CandidateUrl) -> CandidateOutcome {
        let slot = match self.renderer.reserve().await {
            Ok(slot) => slot,
            Err(e) => {
                log::error!("No renderer slot for {}: {e}", candidate.url);
                return CandidateOutcome::failed(candidate, Stage::Discovered, e.to_string());
            }
        };

        let mut stage = Stage::Discovered;
        let result = tokio::time::timeout(
            self.settings.max_processing_time,
            self.evaluate(&candidate, slot, &mut stage),
        )
        .await;

        let outcome = match result {
            Ok(Ok((preview, score))) => CandidateOutcome::scored(
                candidate,
                preview,
                score,
                self.settings.relevance_threshold,
            ),
            Ok(Err(CheckError::Render(e))) => {
                log::warn!("Failed to render {}: {e}", candidate.url);
                CandidateOutcome::failed(candidate, stage, e.to_string())
            }
            Ok(Err(e)) => {
                log::warn!("Could not score {}, rejecting: {e}", candidate.url);
                CandidateOutcome::rejected(candidate, stage, e.to_string())
            }
            Err(_) => {
                log::warn!(
                    "Timed out after {:?} processing {} (reached {:?})",
                    self.settings.max_processing_time,
                    candidate.url,
                    stage
                );
                CandidateOutcome::timed_out(candidate, stage)
            }
        };

        log::debug!(
            "{} -> {:?} (score {:?})",
            outcome.candidate.url,
            outcome.status,
            outcome.score
        );
        outcome
    }

    async fn evaluate(
        &self,
        candidate: &CandidateUrl,
        slot: RenderSlot,
        stage: &mut Stage,
    ) -> Result<(String, f32), CheckError> {
        let url = candidate.url.as_str();
        let retry = self.settings.retry;

        let page = retry
            .run("render", || self.renderer.render(&slot, url))
            .await?;
        drop(slot);
        *stage = Stage::Fetched;

        let preview = extract_preview(&page.html, self.settings.preview_length);
        if preview.is_empty() {
            return Err(CheckError::EmptyPage);
        }

        let score = retry
            .run("score", || self.scorer.score(url, &preview))
            .await?;
        *stage = Stage::Scored;

        Ok((preview, score))
    }

    async fn stage_accepted<W>(
        &self,
        writer: &W,
        accepted: &[NewGrantCandidate],
        report: &mut RunReport,
    ) where
        W: CandidateWriter,
    {
        if self.settings.dry_run {
            for candidate in accepted {
                match serde_json::to_string(candidate) {
                    Ok(line) => println!("{line}"),
                    Err(e) => log::error!("Failed to serialize {}: {e}", candidate.url),
                }
            }
            return;
        }

        match self
            .settings
            .retry
            .run("stage", || writer.stage_candidates(accepted))
            .await
        {
            Ok(count) => {
                log::info!("Staged {count} accepted candidates");
                report.staged += count;
            }
            Err(e) => {
                log::error!("Failed to stage {} accepted candidates: {e}", accepted.len());
                report.staging_failures += 1;
            }
        }
    }

    /// Runs a full discovery pass: seed queries, search, filter, batched
    /// checks and staging of accepted candidates after each batch.
    pub async fn run<R>(&self, repo: &R, configured_queries: &[String]) -> RunReport
    where
        R: SeedReader + CandidateWriter,
    {
        let mut report = RunReport::default();

        let funders = match repo.list_funder_names().await {
            Ok(funders) => funders,
            Err(e) => {
                log::warn!("Failed to load funders, using configured queries only: {e}");
                vec![]
            }
        };
        let queries = build_queries(configured_queries, &funders);
        report.queries = queries.len();

        let known = match repo.list_known_urls().await {
            Ok(urls) => urls,
            Err(e) => {
                log::warn!("Failed to load known grant URLs, dedup is run-local: {e}");
                vec![]
            }
        };

        log::info!(
            "Running {} queries ({} from funders), {} known URLs",
            queries.len(),
            funders.len(),
            known.len()
        );

        let discovered = self.search_all(&queries, &mut report).await;
        report.discovered = discovered.len();

        let mut filter = CandidateFilter::new(&self.settings.blocked_domains, known);
        let candidates: Vec<CandidateUrl> = discovered
            .into_iter()
            .filter_map(|candidate| {
                let url = candidate.url.clone();
                match filter.admit(candidate) {
                    Ok(candidate) => Some(candidate),
                    Err(reason) => {
                        log::debug!("Skipping {url}: {reason}");
                        report.filtered += 1;
                        None
                    }
                }
            })
            .collect();

        let batch_size = self.settings.batch_size.max(1);
        let total_batches = candidates.len().div_ceil(batch_size);
        for (index, batch) in candidates.chunks(batch_size).enumerate() {
            log::info!(
                "Processing batch {}/{total_batches} ({} URLs)",
                index + 1,
                batch.len()
            );

            let outcomes = self.process_batch(batch.to_vec()).await;
            report.record(&outcomes);

            let accepted: Vec<NewGrantCandidate> = outcomes
                .iter()
                .filter_map(NewGrantCandidate::from_outcome)
                .collect();
            if !accepted.is_empty() {
                self.stage_accepted(repo, &accepted, &mut report).await;
            }
        }

        log::info!(
            "Finished discovery: queries={}, queries_failed={}, discovered={}, filtered={}, checked={}, accepted={}, rejected={}, timed_out={}, errored={}, staged={}",
            report.queries,
            report.queries_failed,
            report.discovered,
            report.filtered,
            report.checked,
            report.accepted,
            report.rejected,
            report.timed_out,
            report.errored,
            report.staged
        );

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queries_include_funders_without_duplicates() {
        let configured = vec![
            " Bay Area arts grants ".to_string(),
            "bay area arts grants".to_string(),
            String::new(),
        ];
        let funders = vec!["Hewlett Foundation".to_string(), "  ".to_string()];
        assert_eq!(
            build_queries(&configured, &funders),
            vec![
                "Bay Area arts grants".to_string(),
                "Hewlett Foundation grant opportunities".to_string(),
            ]
        );
    }

    #[test]
    fn report_counts_each_terminal_status() {
        use crate::domain::candidate::SearchHit;

        let candidate = |url: &str| {
            CandidateUrl::from_hit(
                SearchHit {
                    url: url.to_string(),
                    title: String::new(),
                    snippet: String::new(),
                },
                "q",
            )
        };
        let outcomes = vec![
            CandidateOutcome::scored(candidate("https://a.org"), "p".into(), 0.9, 0.7),
            CandidateOutcome::scored(candidate("https://b.org"), "p".into(), 0.1, 0.7),
            CandidateOutcome::timed_out(candidate("https://c.org"), Stage::Discovered),
            CandidateOutcome::failed(candidate("https://d.org"), Stage::Discovered, "x".into()),
        ];
        let mut report = RunReport::default();
        report.record(&outcomes);
        assert_eq!(report.checked, 4);
        assert_eq!(report.accepted, 1);
        assert_eq!(report.rejected, 1);
        assert_eq!(report.timed_out, 1);
        assert_eq!(report.errored, 1);
        assert_eq!(report.accepted_urls, vec!["https://a.org".to_string()]);
    }

    #[test]
    fn run_fails_when_every_query_fails() {
        let report = RunReport {
            queries: 2,
            queries_failed: 2,
            ..Default::default()
        };
        assert!(report.is_failure());
        let partial = RunReport {
            queries: 2,
            queries_failed: 1,
            ..Default::default()
        };
        assert!(!partial.is_failure());
    }

    #[test]
    fn settings_follow_config() {
        let config: ImporterConfig = serde_json::from_value(serde_json::json!({
            "supabase_url": "https://abc.supabase.co",
            "supabase_key": "k",
            "gemini_api_key": "k",
            "serpapi_api_key": "k",
            "batch_size": 5,
            "max_processing_time_secs": 12,
            "dry_run": true
        }))
        .expect("config");
        let settings = DiscoverySettings::from(&config);
        assert_eq!(settings.batch_size, 5);
        assert_eq!(settings.max_processing_time, Duration::from_secs(12));
        assert_eq!(settings.relevance_threshold, RELEVANCE_THRESHOLD);
        assert_eq!(settings.max_concurrent_checks, MAX_CONCURRENT_CHECKS);
        assert!(settings.dry_run);
    }
}
