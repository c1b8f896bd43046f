//! Configuration model loaded from external sources.

use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;

use crate::processing::filter::DEFAULT_BLOCKED_DOMAINS;
use crate::processing::retry::RetryPolicy;
use crate::{
    BATCH_SIZE, GEMINI_MODEL, MAX_CONCURRENT_CHECKS, MAX_PROCESSING_TIME_SECS, PREVIEW_LENGTH,
    RELEVANCE_THRESHOLD,
};

/// Environment variable naming the optional YAML settings file.
pub const CONFIG_PATH_VAR: &str = "GRANT_DISCOVERY_CONFIG";
pub const DEFAULT_CONFIG_FILE: &str = "grant-discovery.yaml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
    #[error("required setting {0} is missing or empty")]
    Missing(&'static str),
    #[error("invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

fn default_search_queries() -> Vec<String> {
    [
        "Bay Area nonprofit grant opportunities",
        "San Francisco foundation grants for nonprofits",
        "Oakland community foundation grant application",
    ]
    .iter()
    .map(|q| q.to_string())
    .collect()
}

fn default_relevance_threshold() -> f32 {
    RELEVANCE_THRESHOLD
}

fn default_preview_length() -> usize {
    PREVIEW_LENGTH
}

fn default_max_concurrent_checks() -> usize {
    MAX_CONCURRENT_CHECKS
}

fn default_max_processing_time_secs() -> u64 {
    MAX_PROCESSING_TIME_SECS
}

fn default_batch_size() -> usize {
    BATCH_SIZE
}

fn default_results_per_query() -> usize {
    10
}

fn default_retry_attempts() -> u32 {
    3
}

fn default_retry_base_delay_ms() -> u64 {
    500
}

fn default_retry_max_delay_ms() -> u64 {
    8_000
}

fn default_blocked_domains() -> Vec<String> {
    DEFAULT_BLOCKED_DOMAINS.iter().map(|d| d.to_string()).collect()
}

fn default_gemini_model() -> String {
    GEMINI_MODEL.to_string()
}

/// Settings for one importer run.
///
/// The four credentials have no defaults; every other field falls back to the
/// crate constants.
#[derive(Clone, Debug, Deserialize)]
pub struct ImporterConfig {
    #[serde(default)]
    pub supabase_url: String,
    #[serde(default)]
    pub supabase_key: String,
    #[serde(default)]
    pub gemini_api_key: String,
    #[serde(default)]
    pub serpapi_api_key: String,

    #[serde(default = "default_search_queries")]
    pub search_queries: Vec<String>,
    #[serde(default = "default_relevance_threshold")]
    pub relevance_threshold: f32,
    #[serde(default = "default_preview_length")]
    pub preview_length: usize,
    #[serde(default = "default_max_concurrent_checks")]
    pub max_concurrent_checks: usize,
    #[serde(default = "default_max_processing_time_secs")]
    pub max_processing_time_secs: u64,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_results_per_query")]
    pub results_per_query: usize,
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
    #[serde(default = "default_retry_max_delay_ms")]
    pub retry_max_delay_ms: u64,
    #[serde(default = "default_blocked_domains")]
    pub blocked_domains: Vec<String>,
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default = "default_gemini_model")]
    pub gemini_model: String,
}

impl ImporterConfig {
    /// Loads the settings file named by `GRANT_DISCOVERY_CONFIG` (or
    /// `grant-discovery.yaml`, if present) overlaid with process environment
    /// variables, then validates the result.
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var(CONFIG_PATH_VAR)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_FILE));
        Self::from_sources(Some(&path), Environment::default())
    }

    /// Builds the configuration from an optional file and an environment
    /// source. Environment values win over file values.
    pub fn from_sources(file: Option<&Path>, env: Environment) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();
        if let Some(path) = file {
            builder = builder.add_source(File::from(path).required(false));
        }
        let env = env
            .try_parsing(true)
            .list_separator(",")
            .with_list_parse_key("search_queries")
            .with_list_parse_key("blocked_domains");

        let config: ImporterConfig = builder.add_source(env).build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects missing credentials and settings that would stall a run.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let required = [
            ("SUPABASE_URL", &self.supabase_url),
            ("SUPABASE_KEY", &self.supabase_key),
            ("GEMINI_API_KEY", &self.gemini_api_key),
            ("SERPAPI_API_KEY", &self.serpapi_api_key),
        ];
        for (name, value) in required {
            if value.trim().is_empty() {
                return Err(ConfigError::Missing(name));
            }
        }

        if !(0.0..=1.0).contains(&self.relevance_threshold) {
            return Err(ConfigError::Invalid {
                field: "relevance_threshold",
                reason: format!("{} is outside 0..=1", self.relevance_threshold),
            });
        }

        let positive = [
            ("preview_length", self.preview_length as u64),
            ("max_concurrent_checks", self.max_concurrent_checks as u64),
            ("max_processing_time_secs", self.max_processing_time_secs),
            ("batch_size", self.batch_size as u64),
            ("results_per_query", self.results_per_query as u64),
            ("retry_attempts", self.retry_attempts as u64),
        ];
        for (field, value) in positive {
            if value == 0 {
                return Err(ConfigError::Invalid {
                    field,
                    reason: "must be greater than zero".to_string(),
                });
            }
        }

        Ok(())
    }

    pub fn max_processing_time(&self) -> Duration {
        Duration::from_secs(self.max_processing_time_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry_attempts,
            base_delay: Duration::from_millis(self.retry_base_delay_ms),
            max_delay: Duration::from_millis(self.retry_max_delay_ms),
        }
    }
}
