use std::sync::Arc;

use grant_discovery::browser::chrome::BrowserPool;
use grant_discovery::http::build_reqwest_client;
use grant_discovery::models::config::ImporterConfig;
use grant_discovery::processing::discovery::{Discoverer, DiscoverySettings};
use grant_discovery::repository::SupabaseRepository;
use grant_discovery::scoring::gemini::GeminiScorer;
use grant_discovery::search::serpapi::SerpApiClient;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));

    let config = match ImporterConfig::load() {
        Ok(config) => config,
        Err(e) => {
            log::error!("Invalid configuration: {e}");
            std::process::exit(1);
        }
    };

    let client = match build_reqwest_client(config.max_processing_time()) {
        Ok(client) => client,
        Err(e) => {
            log::error!("Failed to build HTTP client: {e}");
            std::process::exit(1);
        }
    };

    let search = match SerpApiClient::new(
        &config.serpapi_api_key,
        config.results_per_query,
        client.clone(),
    ) {
        Ok(search) => search,
        Err(e) => {
            log::error!("Failed to create search client: {e}");
            std::process::exit(1);
        }
    };

    let repo = match SupabaseRepository::new(
        &config.supabase_url,
        &config.supabase_key,
        client.clone(),
    ) {
        Ok(repo) => repo,
        Err(e) => {
            log::error!("Failed to create Supabase client: {e}");
            std::process::exit(1);
        }
    };

    let scorer = GeminiScorer::new(&config.gemini_api_key, &config.gemini_model, client);

    let renderer = match BrowserPool::launch(
        config.max_concurrent_checks,
        config.max_processing_time(),
    ) {
        Ok(renderer) => renderer,
        Err(e) => {
            log::error!("Failed to start headless browser: {e}");
            std::process::exit(1);
        }
    };

    let discoverer = Discoverer::new(
        Arc::new(search),
        Arc::new(renderer),
        Arc::new(scorer),
        DiscoverySettings::from(&config),
    );

    let report = discoverer.run(&repo, &config.search_queries).await;
    // exit() skips destructors; Chromium is killed when the pool drops
    drop(discoverer);

    if report.is_failure() {
        log::error!(
            "Discovery run failed: {} of {} queries failed, {} staging failures",
            report.queries_failed,
            report.queries,
            report.staging_failures
        );
        std::process::exit(1);
    }
}
