//! Full-article analysis endpoint

use axum::{
    extract::State, http::StatusCode, response::IntoResponse, routing::post, Json, Router,
};
use insight_core::AnalysisResponse;
use serde::Deserialize;
use tracing::{debug, error};

use super::error_response;
use crate::AppState;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct AnalyzeRequest {
    /// Article URL to scrape and analyze
    pub url: String,
}

/// Create analysis routes
pub fn routes() -> Router<AppState> {
    Router::new().route("/analyze", post(analyze_article))
}

/// POST /api/analyze - Scrape an article and analyze its text
/// Successful analyses are cached per URL
async fn analyze_article(
    State(state): State<AppState>,
    Json(request): Json<AnalyzeRequest>,
) -> impl IntoResponse {
    let url = request.url.trim();
    if url.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "URL is required");
    }

    if let Some(cached) = state.cache.get_article_analysis(url) {
        debug!("Serving cached analysis for {}", url);
        return (StatusCode::OK, Json(cached)).into_response();
    }

    let article = match state.scraper.scrape_article(url).await {
        Ok(article) => article,
        Err(e) => {
            error!("Failed to scrape {}: {}", url, e);
            return error_response(
                StatusCode::BAD_GATEWAY,
                format!("Failed to fetch article: {}", e),
            );
        }
    };

    if article.body.trim().is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "Could not extract article text");
    }

    let analysis = state.analyzer.analyze_text(&article.body).await;
    let response = AnalysisResponse {
        analysis,
        full_text: article.body,
    };

    if !response.analysis.is_error() {
        if let Err(e) = state.cache.put_article_analysis(url, &response) {
            error!("Failed to cache analysis for {}: {}", url, e);
        }
    }

    (StatusCode::OK, Json(response)).into_response()
}

#[cfg(test)]
mod tests {
    use insight_gemini::Generation;

    use super::*;
    use crate::routes::test_support::{FakeFetcher, TestApp};

    const ANALYSIS: &str = r#"{"summary":"Rates rise","economic_impact":"e","global_impact":"g","impact_rating":7,"urgency":"High"}"#;

    #[tokio::test]
    async fn test_missing_url_is_rejected() {
        let app = TestApp::new(Generation::ok(ANALYSIS));

        let (status, body) = app.post("/api/analyze", serde_json::json!({})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "URL is required");

        let (status, _) = app
            .post("/api/analyze", serde_json::json!({"url": "   "}))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(app.calls(), 0);
    }

    #[tokio::test]
    async fn test_empty_scrape_is_rejected() {
        let app = TestApp::build(true, Generation::ok(ANALYSIS), FakeFetcher::default(), "  ");
        let (status, body) = app
            .post("/api/analyze", serde_json::json!({"url": "https://x/1"}))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Could not extract article text");
    }

    #[tokio::test]
    async fn test_analysis_is_cached_per_url() {
        let app = TestApp::new(Generation::ok(ANALYSIS));
        let request = serde_json::json!({"url": "https://x/1"});

        let (status, body) = app.post("/api/analyze", request.clone()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["analysis"]["impact_rating"], 7);
        assert_eq!(body["full_text"], "Article body");

        let (status, again) = app.post("/api/analyze", request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(again, body);
        assert_eq!(app.calls(), 1);
    }

    #[tokio::test]
    async fn test_failed_analysis_is_not_cached() {
        let app = TestApp::build(false, Generation::ok(ANALYSIS), FakeFetcher::default(), "Text");
        let request = serde_json::json!({"url": "https://x/2"});

        let (status, body) = app.post("/api/analyze", request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["analysis"]["summary"], "API Key Missing");
        assert!(app.state.cache.get_article_analysis("https://x/2").is_none());
    }
}
