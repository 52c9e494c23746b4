//! Model usage and availability endpoints

use axum::{extract::State, response::Json, routing::get, Router};
use insight_core::{ModelStatus, UsageSnapshot};

use crate::AppState;

/// Create usage routes
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/usage", get(get_usage))
        .route("/models", get(get_models))
}

/// GET /api/usage - Call counts in the current window
async fn get_usage(State(state): State<AppState>) -> Json<UsageSnapshot> {
    Json(state.invoker.usage_stats())
}

/// GET /api/models - Configured candidates with cooldown state
async fn get_models(State(state): State<AppState>) -> Json<Vec<ModelStatus>> {
    Json(state.invoker.model_statuses())
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use insight_gemini::Generation;

    use crate::routes::test_support::{TestApp, MODEL};

    #[tokio::test]
    async fn test_usage_and_models_after_failure() {
        let app = TestApp::new(Generation::status(429, "quota"));
        app.state.invoker.invoke("prompt", None).await.unwrap_err();

        let (status, usage) = app.get("/api/usage").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(usage["totalCalls"], 1);
        assert_eq!(usage["rateLimitCount"], 1);
        assert_eq!(usage["perModelRateLimits"][MODEL], 1);

        let (_, models) = app.get("/api/models").await;
        assert_eq!(models[0]["id"], MODEL);
        assert_eq!(models[0]["coolingDown"], true);
    }
}
