//! Health check endpoints

use axum::{extract::State, http::StatusCode, response::Json, routing::get, Router};
use insight_services::RateLimiterStats;
use serde::Serialize;

use crate::AppState;

/// Health check response
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthResponse {
    status: String,
    model_configured: bool,
    scheduler_enabled: bool,
    scheduler_categories: Vec<String>,
    total_calls: u64,
    rate_limit_count: u64,
    in_flight: usize,
    throttle: RateLimiterStats,
}

/// Health check handler
async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let usage = state.invoker.usage_stats();
    let model_configured = state.invoker.is_configured();

    let status = if model_configured { "healthy" } else { "degraded" };

    let response = HealthResponse {
        status: status.to_string(),
        model_configured,
        scheduler_enabled: state.scheduler.is_some(),
        scheduler_categories: state
            .scheduler
            .as_ref()
            .map(|s| s.categories().to_vec())
            .unwrap_or_default(),
        total_calls: usage.total_calls,
        rate_limit_count: usage.rate_limit_count,
        in_flight: state.invoker.in_flight(),
        throttle: state.invoker.throttle_stats(),
    };

    let code = if model_configured {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (code, Json(response))
}

/// Simple liveness check (always returns OK if server is running)
async fn liveness() -> &'static str {
    "OK"
}

/// Create health routes
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_check))
        .route("/health/live", get(liveness))
}
