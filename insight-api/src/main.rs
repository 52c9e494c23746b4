//! News Insight API Server
//!
//! HTTP API server that serves feed items, cached AI clusters and on-demand
//! article analysis, and drives the incremental background scheduler.

mod routes;

use axum::{
    http::{header, Method},
    Router,
};
use insight_gemini::{GeminiClient, TextGenerator};
use insight_news::{ArticleScraper, HtmlScraper, RssClient, SourceFetcher};
use insight_services::{
    AggregationCache, AggregationCacheConfig, CacheStore, IncrementalScheduler, InvokerConfig,
    MemoryCacheStore, ModelInvoker, NewsAnalyzer, SchedulerConfig, SqliteCacheStore,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// How often expired cache entries are swept
const PURGE_INTERVAL: Duration = Duration::from_secs(3600);

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub fetcher: Arc<dyn SourceFetcher>,
    pub scraper: Arc<dyn ArticleScraper>,
    pub invoker: Arc<ModelInvoker>,
    pub analyzer: Arc<NewsAnalyzer>,
    pub cache: Arc<AggregationCache>,
    /// Background scheduler (optional - disabled with SCHEDULER_ENABLED=false)
    pub scheduler: Option<Arc<IncrementalScheduler>>,
}

/// Build the router with all layers
pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    Router::new()
        .nest("/api", routes::api_routes())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

fn open_cache_store() -> Arc<dyn CacheStore> {
    let cache_db_path =
        std::env::var("CACHE_DB_PATH").unwrap_or_else(|_| "data/news_cache.db".to_string());
    info!("Initializing news cache at: {}", cache_db_path);

    match SqliteCacheStore::new(&cache_db_path) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            warn!("Failed to open {}: {}. Falling back to in-memory cache.", cache_db_path, e);
            Arc::new(MemoryCacheStore::new())
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env.local file
    if let Err(e) = dotenvy::from_filename(".env.local") {
        // Not an error if the file doesn't exist
        if !matches!(e, dotenvy::Error::Io(_)) {
            eprintln!("Warning: Failed to load .env.local: {}", e);
        }
    }

    // Initialize logging
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,insight_api=debug,insight_services=debug")),
        )
        .init();

    info!("Starting News Insight API");

    // Text generation
    let gemini = GeminiClient::from_env()?;
    if !gemini.is_configured() {
        warn!("GEMINI_API_KEY not set - analysis endpoints will report a missing key");
    }
    let invoker = Arc::new(ModelInvoker::new(Arc::new(gemini), InvokerConfig::from_env()));
    let analyzer = Arc::new(NewsAnalyzer::new(invoker.clone()));

    // Persistent aggregation cache
    let cache = Arc::new(AggregationCache::new(
        open_cache_store(),
        AggregationCacheConfig::from_env(),
    ));

    // News collaborators
    let fetcher: Arc<dyn SourceFetcher> = Arc::new(RssClient::new());
    let scraper: Arc<dyn ArticleScraper> = Arc::new(HtmlScraper::new()?);

    // Incremental scheduler (enabled unless SCHEDULER_ENABLED=false)
    let scheduler_enabled = std::env::var("SCHEDULER_ENABLED")
        .ok()
        .and_then(|v| v.trim().parse::<bool>().ok())
        .unwrap_or(true);
    let scheduler = if scheduler_enabled {
        let scheduler = Arc::new(IncrementalScheduler::new(
            fetcher.clone(),
            analyzer.clone(),
            cache.clone(),
            SchedulerConfig::from_env(),
        ));
        scheduler.clone().start();
        Some(scheduler)
    } else {
        info!("Incremental scheduler disabled");
        None
    };

    // Hourly expiry sweep
    let cache_for_purge = Arc::clone(&cache);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(PURGE_INTERVAL);
        loop {
            ticker.tick().await;
            if let Err(e) = cache_for_purge.purge_expired() {
                error!("Cache purge failed: {}", e);
            }
        }
    });

    let state = AppState {
        fetcher,
        scraper,
        invoker,
        analyzer,
        cache,
        scheduler,
    };

    // Start server
    let port = std::env::var("SERVER_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(3001);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("Server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app(state)).await?;

    Ok(())
}
