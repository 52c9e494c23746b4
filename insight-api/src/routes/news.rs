//! News feed and cluster endpoints

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use insight_core::ClusterRecord;
use insight_services::aggregation_cache::merge_records;
use serde::Deserialize;
use tracing::{error, info};

use super::error_response;
use crate::AppState;

const DEFAULT_CATEGORY: &str = "world";
const DEFAULT_LANGUAGE: &str = "English";

/// Query parameters for raw feed items
#[derive(Debug, Deserialize)]
pub struct FeedQuery {
    pub category: Option<String>,
}

/// Query parameters for cached clusters
#[derive(Debug, Deserialize)]
pub struct MergedQuery {
    pub tab: Option<String>,
    pub lang: Option<String>,
    /// Records cached under this model are listed first
    pub model: Option<String>,
}

/// Body of an on-demand clustering request
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ClusterRequest {
    /// Cache tab; defaults to the category
    pub tab: Option<String>,
    pub category: Option<String>,
    pub lang: Option<String>,
    pub model: Option<String>,
}

/// Create news routes
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/news", get(get_feed))
        .route("/news/merged", get(get_merged))
        .route("/news/cluster", post(cluster_category))
}

/// GET /api/news?category=... - Raw feed items
async fn get_feed(
    State(state): State<AppState>,
    Query(params): Query<FeedQuery>,
) -> impl IntoResponse {
    let category = params.category.unwrap_or_else(|| DEFAULT_CATEGORY.to_string());

    match state.fetcher.fetch_items(&category).await {
        Ok(items) => (StatusCode::OK, Json(items)).into_response(),
        Err(e) => {
            error!("Failed to fetch feed {}: {}", category, e);
            error_response(StatusCode::BAD_GATEWAY, format!("Failed to fetch news: {}", e))
        }
    }
}

/// GET /api/news/merged?tab=...&lang=... - Cached clusters; never calls the model
async fn get_merged(
    State(state): State<AppState>,
    Query(params): Query<MergedQuery>,
) -> impl IntoResponse {
    let tab = match params.tab {
        Some(tab) if !tab.trim().is_empty() => tab,
        _ => return error_response(StatusCode::BAD_REQUEST, "Query parameter 'tab' is required"),
    };
    let lang = params.lang.unwrap_or_else(|| DEFAULT_LANGUAGE.to_string());

    let mut records = state.cache.get_all_for_tab(&tab, &lang);
    if let Some(preferred) = params
        .model
        .as_deref()
        .and_then(|model| state.cache.get(&tab, &lang, model))
    {
        records = merge_records(preferred, records, usize::MAX);
    }

    (StatusCode::OK, Json(records)).into_response()
}

/// POST /api/news/cluster - Cluster a category feed through the model and cache it
async fn cluster_category(
    State(state): State<AppState>,
    Json(request): Json<ClusterRequest>,
) -> impl IntoResponse {
    let category = request
        .category
        .unwrap_or_else(|| DEFAULT_CATEGORY.to_string());
    let tab = request.tab.unwrap_or_else(|| category.clone());
    let lang = request.lang.unwrap_or_else(|| DEFAULT_LANGUAGE.to_string());

    let items = match state.fetcher.fetch_items(&category).await {
        Ok(items) => items,
        Err(e) => {
            error!("Failed to fetch feed {}: {}", category, e);
            return error_response(StatusCode::BAD_GATEWAY, format!("Failed to fetch news: {}", e));
        }
    };

    let clusters = match state
        .analyzer
        .cluster_items(&items, &lang, request.model.as_deref())
        .await
    {
        Ok(clusters) => clusters,
        Err(e) => {
            error!("Clustering {} failed: {}", category, e);
            let status = if e.is_unavailable() {
                StatusCode::SERVICE_UNAVAILABLE
            } else {
                StatusCode::INTERNAL_SERVER_ERROR
            };
            return error_response(status, e.to_string());
        }
    };

    let cacheable = !clusters.iter().any(ClusterRecord::is_error);
    if let Some(first) = clusters.first().filter(|_| cacheable) {
        match state
            .cache
            .merge(&tab, &lang, &first.model_used, clusters.clone())
        {
            Ok(merged) => info!(
                "Cached {} clusters for {} ({} total)",
                clusters.len(),
                tab,
                merged.len()
            ),
            Err(e) => error!("Failed to cache clusters for {}: {}", tab, e),
        }
    }

    (StatusCode::OK, Json(clusters)).into_response()
}
