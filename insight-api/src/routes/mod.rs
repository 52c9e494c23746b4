//! API route definitions

mod analyze;
mod cache;
mod health;
mod news;
mod usage;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json, Router,
};

use crate::AppState;

/// Create all API routes
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .merge(health::routes())
        .merge(news::routes())
        .merge(analyze::routes())
        .merge(usage::routes())
        .merge(cache::routes())
}

/// JSON `{"error": ..}` response with the given status
pub(crate) fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(serde_json::json!({
            "error": message.into()
        })),
    )
        .into_response()
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
    };
    use insight_core::{FeedItem, ModelCandidate};
    use insight_gemini::{Generation, GenerationError, TextGenerator};
    use insight_news::{ArticleScraper, NewsError, ScrapedArticle, SourceFetcher};
    use insight_services::{
        AggregationCache, AggregationCacheConfig, InvokerConfig, MemoryCacheStore, ModelInvoker,
        NewsAnalyzer,
    };
    use tower::ServiceExt;

    use crate::{app, AppState};

    pub const MODEL: &str = "test-model";

    /// Generator answering every call with the same reply
    pub struct FixedGenerator {
        pub configured: bool,
        pub reply: Generation,
        pub calls: AtomicUsize,
    }

    #[async_trait]
    impl TextGenerator for FixedGenerator {
        fn is_configured(&self) -> bool {
            self.configured
        }

        async fn generate_content(
            &self,
            _model: &str,
            _prompt: &str,
        ) -> Result<Generation, GenerationError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.reply.clone())
        }
    }

    #[derive(Default)]
    pub struct FakeFetcher {
        pub items: HashMap<String, Vec<FeedItem>>,
    }

    #[async_trait]
    impl SourceFetcher for FakeFetcher {
        async fn fetch_items(&self, source_id: &str) -> Result<Vec<FeedItem>, NewsError> {
            self.items
                .get(source_id)
                .cloned()
                .ok_or_else(|| NewsError::InvalidConfig(format!("unknown category {}", source_id)))
        }

        fn source_ids(&self) -> Vec<String> {
            self.items.keys().cloned().collect()
        }
    }

    pub struct FakeScraper {
        pub body: String,
    }

    #[async_trait]
    impl ArticleScraper for FakeScraper {
        async fn scrape_article(&self, _url: &str) -> Result<ScrapedArticle, NewsError> {
            Ok(ScrapedArticle {
                title: Some("Headline".to_string()),
                body: self.body.clone(),
                image_url: None,
            })
        }
    }

    pub struct TestApp {
        pub state: AppState,
        pub generator: Arc<FixedGenerator>,
    }

    impl TestApp {
        pub fn new(reply: Generation) -> Self {
            Self::build(true, reply, FakeFetcher::default(), "Article body")
        }

        pub fn build(configured: bool, reply: Generation, fetcher: FakeFetcher, body: &str) -> Self {
            let generator = Arc::new(FixedGenerator {
                configured,
                reply,
                calls: AtomicUsize::new(0),
            });
            let config = InvokerConfig {
                candidates: ModelCandidate::ordered(&[MODEL]),
                min_request_interval: Duration::ZERO,
                fallback_delay: Duration::ZERO,
                rate_limit_backoff: Duration::ZERO,
                ..Default::default()
            };
            let invoker = Arc::new(ModelInvoker::new(generator.clone(), config));

            let state = AppState {
                fetcher: Arc::new(fetcher),
                scraper: Arc::new(FakeScraper {
                    body: body.to_string(),
                }),
                analyzer: Arc::new(NewsAnalyzer::new(invoker.clone())),
                invoker,
                cache: Arc::new(AggregationCache::new(
                    Arc::new(MemoryCacheStore::new()),
                    AggregationCacheConfig::default(),
                )),
                scheduler: None,
            };

            Self { state, generator }
        }

        pub fn calls(&self) -> usize {
            self.generator.calls.load(Ordering::SeqCst)
        }

        pub async fn send(&self, request: Request<Body>) -> (StatusCode, serde_json::Value) {
            let response = app(self.state.clone()).oneshot(request).await.unwrap();
            let status = response.status();
            let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
            let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
            (status, json)
        }

        pub async fn get(&self, uri: &str) -> (StatusCode, serde_json::Value) {
            self.send(Request::get(uri).body(Body::empty()).unwrap()).await
        }

        pub async fn post(&self, uri: &str, body: serde_json::Value) -> (StatusCode, serde_json::Value) {
            self.send(
                Request::post(uri)
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
        }
    }
}
