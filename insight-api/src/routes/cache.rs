//! Cache inspection and maintenance endpoints

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use insight_services::StoredCacheEntry;
use serde::Serialize;
use tracing::error;

use super::error_response;
use crate::AppState;

/// Stored entry without its payload
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CacheEntrySummary {
    cache_key: String,
    tab: String,
    language: String,
    model: String,
    /// Number of records for cluster lists; absent for article analyses
    record_count: Option<usize>,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

impl From<StoredCacheEntry> for CacheEntrySummary {
    fn from(entry: StoredCacheEntry) -> Self {
        let record_count = serde_json::from_str::<Vec<serde_json::Value>>(&entry.data_json)
            .ok()
            .map(|records| records.len());

        Self {
            cache_key: entry.cache_key,
            tab: entry.tab,
            language: entry.language,
            model: entry.model,
            record_count,
            created_at: entry.created_at,
            expires_at: entry.expires_at,
        }
    }
}

/// Create cache routes
pub fn routes() -> Router<AppState> {
    Router::new().route("/cache", get(list_entries).delete(clear_entries))
}

/// GET /api/cache - Stored entries, newest first
async fn list_entries(State(state): State<AppState>) -> impl IntoResponse {
    match state.cache.entries() {
        Ok(entries) => {
            let summaries: Vec<CacheEntrySummary> = entries.into_iter().map(Into::into).collect();
            (StatusCode::OK, Json(summaries)).into_response()
        }
        Err(e) => {
            error!("Failed to list cache entries: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

/// DELETE /api/cache - Remove every entry
async fn clear_entries(State(state): State<AppState>) -> impl IntoResponse {
    match state.cache.clear_all() {
        Ok(cleared) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "cleared": cleared
            })),
        )
            .into_response(),
        Err(e) => {
            error!("Failed to clear cache: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}
