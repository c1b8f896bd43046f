use async_trait::async_trait;
use serde::Deserialize;
use url::Url;

use crate::domain::candidate::SearchHit;
use crate::search::{SearchError, SearchProvider, SearchResult};

const SERPAPI_ENDPOINT: &str = "https://serpapi.com/search.json";

/// SerpAPI reports an empty result page through its `error` field.
const NO_RESULTS_MARKER: &str = "hasn't returned any results";

#[derive(Debug, Deserialize)]
struct SerpApiResponse {
    #[serde(default)]
    organic_results: Vec<OrganicResult>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OrganicResult {
    #[serde(default)]
    link: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    snippet: String,
}

fn parse_response(body: &str) -> SearchResult<Vec<SearchHit>> {
    let response: SerpApiResponse =
        serde_json::from_str(body).map_err(|e| SearchError::Decode(e.to_string()))?;

    if let Some(error) = response.error {
        if error.contains(NO_RESULTS_MARKER) {
            return Ok(vec![]);
        }
        return Err(SearchError::Api(error));
    }

    Ok(response
        .organic_results
        .into_iter()
        .filter(|r| !r.link.trim().is_empty())
        .map(|r| SearchHit {
            url: r.link.trim().to_string(),
            title: r.title.trim().to_string(),
            snippet: r.snippet.trim().to_string(),
        })
        .collect())
}

/// Extracts SerpAPI's `error` message from a failed response body, falling
/// back to the raw body.
fn error_message(body: &str) -> String {
    serde_json::from_str::<SerpApiResponse>(body)
        .ok()
        .and_then(|r| r.error)
        .unwrap_or_else(|| body.chars().take(200).collect())
}

/// Google search through SerpAPI.
pub struct SerpApiClient {
    api_key: String,
    endpoint: Url,
    results_per_query: usize,
    client: reqwest::Client,
}

impl SerpApiClient {
    pub fn new(
        api_key: &str,
        results_per_query: usize,
        client: reqwest::Client,
    ) -> SearchResult<Self> {
        Ok(Self {
            api_key: api_key.to_string(),
            endpoint: Url::parse(SERPAPI_ENDPOINT).map_err(|e| SearchError::Build(e.to_string()))?,
            results_per_query,
            client,
        })
    }

    /// Points the client at a different SerpAPI-compatible endpoint.
    pub fn with_endpoint(mut self, endpoint: Url) -> Self {
        self.endpoint = endpoint;
        self
    }

    fn request_url(&self, query: &str) -> Url {
        let mut url = self.endpoint.clone();
        url.query_pairs_mut()
            .append_pair("engine", "google")
            .append_pair("q", query)
            .append_pair("num", &self.results_per_query.to_string())
            .append_pair("api_key", &self.api_key);
        url
    }
}

#[async_trait]
impl SearchProvider for SerpApiClient {
    async fn search(&self, query: &str) -> SearchResult<Vec<SearchHit>> {
        log::debug!("Searching for '{query}'");

        let res = self.client.get(self.request_url(query)).send().await?;
        let status = res.status();
        let body = res.text().await?;
        if !status.is_success() {
            return Err(SearchError::Status {
                status,
                message: error_message(&body),
            });
        }

        let hits = parse_response(&body)?;
        log::debug!("Search for '{query}' returned {} results", hits.len());
        Ok(hits)
    }
}
