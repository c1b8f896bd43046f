use std::future::Future;

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use url::Url;

use crate::domain::grant::NewGrantCandidate;
use crate::repository::{CandidateWriter, RepositoryError, RepositoryResult, SeedReader};

const FUNDERS_TABLE: &str = "funders";
const GRANTS_TABLE: &str = "grants";
const STAGING_TABLE: &str = "grant_staging";

/// Rows requested per PostgREST call. The server may cap pages lower still.
const PAGE_SIZE: usize = 1000;

#[derive(Debug, Deserialize)]
struct FunderRow {
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UrlRow {
    #[serde(default)]
    url: Option<String>,
}

/// Fetches pages starting at offset 0 until a page comes back empty.
/// Stopping on an empty page rather than a short one keeps every row even
/// when the server caps pages below the requested size.
async fn collect_pages<T, F, Fut>(mut fetch_page: F) -> RepositoryResult<Vec<T>>
where
    F: FnMut(usize) -> Fut,
    Fut: Future<Output = RepositoryResult<Vec<T>>>,
{
    let mut rows = Vec::new();
    loop {
        let page = fetch_page(rows.len()).await?;
        if page.is_empty() {
            return Ok(rows);
        }
        rows.extend(page);
    }
}

/// Number of rows PostgREST returned for `return=representation`.
fn count_returned_rows(body: &str) -> RepositoryResult<usize> {
    serde_json::from_str::<Vec<UrlRow>>(body)
        .map(|rows| rows.len())
        .map_err(|e| RepositoryError::Decode(e.to_string()))
}

/// Supabase tables accessed through the PostgREST API.
pub struct SupabaseRepository {
    rest_url: Url,
    key: String,
    client: reqwest::Client,
}

impl SupabaseRepository {
    pub fn new(supabase_url: &str, key: &str, client: reqwest::Client) -> RepositoryResult<Self> {
        let base = Url::parse(&format!("{}/", supabase_url.trim_end_matches('/')))
            .map_err(|e| RepositoryError::Build(format!("invalid SUPABASE_URL: {e}")))?;
        let rest_url = base
            .join("rest/v1/")
            .map_err(|e| RepositoryError::Build(e.to_string()))?;
        Ok(Self {
            rest_url,
            key: key.to_string(),
            client,
        })
    }

    fn table_url(&self, table: &str, params: &[(&str, &str)]) -> RepositoryResult<Url> {
        let mut url = self
            .rest_url
            .join(table)
            .map_err(|e| RepositoryError::Build(e.to_string()))?;
        if !params.is_empty() {
            url.query_pairs_mut().extend_pairs(params.iter().copied());
        }
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        self.client
            .request(method, url)
            .header("apikey", &self.key)
            .bearer_auth(&self.key)
    }

    /// URL of one page of `column`, ordered by it so that offsets are stable.
    fn page_url(&self, table: &str, column: &str, offset: usize) -> RepositoryResult<Url> {
        let order = format!("{column}.asc");
        let limit = PAGE_SIZE.to_string();
        let offset = offset.to_string();
        self.table_url(
            table,
            &[
                ("select", column),
                ("order", &order),
                ("limit", &limit),
                ("offset", &offset),
            ],
        )
    }

    async fn select_page<T: DeserializeOwned>(
        &self,
        table: &str,
        column: &str,
        offset: usize,
    ) -> RepositoryResult<Vec<T>> {
        let url = self.page_url(table, column, offset)?;
        let res = self.request(Method::GET, url).send().await?;
        let status = res.status();
        let body = res.text().await?;
        if !status.is_success() {
            return Err(RepositoryError::Status {
                status,
                message: body.chars().take(200).collect(),
            });
        }
        serde_json::from_str(&body).map_err(|e| RepositoryError::Decode(e.to_string()))
    }

    /// Every row of a single column of `table`.
    async fn select_all<T: DeserializeOwned>(
        &self,
        table: &str,
        column: &str,
    ) -> RepositoryResult<Vec<T>> {
        let rows = collect_pages(|offset| self.select_page(table, column, offset)).await?;
        log::debug!("Read {} rows of {table}.{column}", rows.len());
        Ok(rows)
    }
}

#[async_trait]
impl SeedReader for SupabaseRepository {
    async fn list_funder_names(&self) -> RepositoryResult<Vec<String>> {
        let rows: Vec<FunderRow> = self.select_all(FUNDERS_TABLE, "name").await?;
        Ok(rows
            .into_iter()
            .filter_map(|r| r.name)
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty())
            .collect())
    }

    async fn list_known_urls(&self) -> RepositoryResult<Vec<String>> {
        let mut urls = Vec::new();
        for table in [GRANTS_TABLE, STAGING_TABLE] {
            let rows: Vec<UrlRow> = self.select_all(table, "url").await?;
            urls.extend(rows.into_iter().filter_map(|r| r.url));
        }
        Ok(urls)
    }
}

#[async_trait]
impl CandidateWriter for SupabaseRepository {
    async fn stage_candidates(&self, candidates: &[NewGrantCandidate]) -> RepositoryResult<usize> {
        if candidates.is_empty() {
            return Ok(0);
        }

        let url = self.table_url(STAGING_TABLE, &[("on_conflict", "url"), ("select", "url")])?;
        let res = self
            .request(Method::POST, url)
            .header("Prefer", "resolution=ignore-duplicates,return=representation")
            .json(candidates)
            .send()
            .await?;

        let status = res.status();
        let body = res.text().await?;
        if !status.is_success() {
            return Err(RepositoryError::Status {
                status,
                message: body.chars().take(200).collect(),
            });
        }

        // rows skipped as duplicates are not returned
        let inserted = count_returned_rows(&body)?;
        if inserted < candidates.len() {
            log::info!(
                "{} of {} candidates were already staged",
                candidates.len() - inserted,
                candidates.len()
            );
        }
        Ok(inserted)
    }
}
