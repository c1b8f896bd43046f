use std::collections::HashSet;

use thiserror::Error;
use url::Url;

use crate::domain::candidate::CandidateUrl;

/// Hosts that never carry grant listings of their own.
pub const DEFAULT_BLOCKED_DOMAINS: [&str; 8] = [
    "facebook.com",
    "twitter.com",
    "x.com",
    "instagram.com",
    "linkedin.com",
    "youtube.com",
    "tiktok.com",
    "reddit.com",
];

/// Document types the headless browser cannot render into HTML.
const DOCUMENT_EXTENSIONS: [&str; 6] = [".pdf", ".doc", ".docx", ".xls", ".xlsx", ".zip"];

const TRACKING_PARAMS: [&str; 3] = ["gclid", "fbclid", "mc_eid"];

/// Why a discovered URL was dropped before rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SkipReason {
    #[error("not a valid http(s) URL")]
    Invalid,
    #[error("host is blocklisted")]
    Blocked,
    #[error("non-HTML document")]
    Document,
    #[error("duplicate in this run")]
    Duplicate,
    #[error("already known")]
    Known,
}

/// Canonical form used for dedup: fragment and tracking parameters removed,
/// trailing slash trimmed from non-root paths.
pub fn normalize_url(raw: &str) -> Option<String> {
    let mut url = Url::parse(raw.trim()).ok()?;
    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return None;
    }

    url.set_fragment(None);

    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| !k.starts_with("utm_") && !TRACKING_PARAMS.contains(&k.as_ref()))
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    url.set_query(None);
    if !pairs.is_empty() {
        url.query_pairs_mut()
            .extend_pairs(pairs.iter().map(|(k, v)| (&**k, &**v)));
    }

    let path = url.path().to_string();
    if path.len() > 1 && path.ends_with('/') {
        url.set_path(path.trim_end_matches('/'));
    }

    Some(url.to_string())
}

fn host_matches(host: &str, domain: &str) -> bool {
    host == domain
        || host
            .strip_suffix(domain)
            .is_some_and(|prefix| prefix.ends_with('.'))
}

/// Admits each discovered candidate at most once per run.
pub struct CandidateFilter {
    blocked_domains: Vec<String>,
    known: HashSet<String>,
    seen: HashSet<String>,
}

impl CandidateFilter {
    pub fn new<I>(blocked_domains: &[String], known_urls: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        Self {
            blocked_domains: blocked_domains
                .iter()
                .map(|d| d.trim().trim_start_matches('.').to_ascii_lowercase())
                .filter(|d| !d.is_empty())
                .collect(),
            known: known_urls
                .into_iter()
                .filter_map(|url| normalize_url(&url))
                .collect(),
            seen: HashSet::new(),
        }
    }

    /// Returns the candidate with its URL normalized, or the reason it was
    /// dropped.
    pub fn admit(&mut self, mut candidate: CandidateUrl) -> Result<CandidateUrl, SkipReason> {
        let normalized = normalize_url(&candidate.url).ok_or(SkipReason::Invalid)?;
        let parsed = Url::parse(&normalized).map_err(|_| SkipReason::Invalid)?;
        let host = parsed.host_str().unwrap_or_default().to_ascii_lowercase();

        if self
            .blocked_domains
            .iter()
            .any(|domain| host_matches(&host, domain))
        {
            return Err(SkipReason::Blocked);
        }

        let path = parsed.path().to_ascii_lowercase();
        if DOCUMENT_EXTENSIONS.iter().any(|ext| path.ends_with(ext)) {
            return Err(SkipReason::Document);
        }

        if self.known.contains(&normalized) {
            return Err(SkipReason::Known);
        }

        if !self.seen.insert(normalized.clone()) {
            return Err(SkipReason::Duplicate);
        }

        candidate.url = normalized;
        Ok(candidate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::candidate::SearchHit;

    fn candidate(url: &str) -> CandidateUrl {
        CandidateUrl::from_hit(
            SearchHit {
                url: url.to_string(),
                title: String::new(),
                snippet: String::new(),
            },
            "q",
        )
    }

    fn default_blocklist() -> Vec<String> {
        DEFAULT_BLOCKED_DOMAINS.iter().map(|d| d.to_string()).collect()
    }

    #[test]
    fn normalization_drops_fragment_tracking_and_trailing_slash() {
        assert_eq!(
            normalize_url("https://fund.example.org/grants/?utm_source=x&cycle=2025&gclid=1#apply")
                .as_deref(),
            Some("https://fund.example.org/grants?cycle=2025")
        );
        assert_eq!(
            normalize_url("https://fund.example.org/").as_deref(),
            Some("https://fund.example.org/")
        );
    }

    #[test]
    fn normalization_keeps_other_params_around_tracking_ones() {
        assert_eq!(
            normalize_url("https://fund.example.org/apply?fbclid=abc&id=7&mc_eid=9&lang=en")
                .as_deref(),
            Some("https://fund.example.org/apply?id=7&lang=en")
        );
    }

    #[test]
    fn skip_reasons_read_as_log_text() {
        assert_eq!(SkipReason::Known.to_string(), "already known");
        assert_eq!(SkipReason::Document.to_string(), "non-HTML document");
    }

    #[test]
    fn normalization_rejects_non_http_urls() {
        assert!(normalize_url("mailto:grants@example.org").is_none());
        assert!(normalize_url("ftp://example.org/file").is_none());
        assert!(normalize_url("not a url").is_none());
    }

    #[test]
    fn blocks_listed_hosts_and_their_subdomains() {
        let mut filter = CandidateFilter::new(&default_blocklist(), Vec::new());
        assert_eq!(
            filter.admit(candidate("https://www.facebook.com/somefund")),
            Err(SkipReason::Blocked)
        );
        assert_eq!(
            filter.admit(candidate("https://youtube.com/watch?v=1")),
            Err(SkipReason::Blocked)
        );
        assert!(filter.admit(candidate("https://notfacebook.com/grants")).is_ok());
    }

    #[test]
    fn skips_documents_the_browser_cannot_render() {
        let mut filter = CandidateFilter::new(&[], Vec::new());
        assert_eq!(
            filter.admit(candidate("https://fund.example.org/guidelines.PDF")),
            Err(SkipReason::Document)
        );
    }

    #[test]
    fn deduplicates_within_a_run_and_against_known_urls() {
        let known = vec!["https://fund.example.org/old-grant/".to_string()];
        let mut filter = CandidateFilter::new(&[], known);

        let first = filter
            .admit(candidate("https://fund.example.org/new?utm_medium=email"))
            .expect("first occurrence admitted");
        assert_eq!(first.url, "https://fund.example.org/new");
        assert_eq!(
            filter.admit(candidate("https://fund.example.org/new#top")),
            Err(SkipReason::Duplicate)
        );
        assert_eq!(
            filter.admit(candidate("https://fund.example.org/old-grant")),
            Err(SkipReason::Known)
        );
    }
}
