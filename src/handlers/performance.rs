use crate::AppState;
use crate::error::AppError;
use crate::services::cache::CacheStats;
use axum::{Json, extract::State};
use serde_json::{Value, json};

#[utoipa::path(
    get,
    path = "/api/performance/cache-stats",
    responses(
        (status = 200, description = "Result-cache statistics", body = CacheStats)
    )
)]
pub async fn cache_stats(State(state): State<AppState>) -> Result<Json<CacheStats>, AppError> {
    Ok(Json(state.cache.stats().await?))
}

#[utoipa::path(
    get,
    path = "/api/performance/overview",
    responses(
        (status = 200, description = "Cache and analysis counters combined")
    )
)]
pub async fn overview(State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    let cache = state.cache.stats().await?;
    let analysis = state.detection.stats.snapshot();
    Ok(Json(json!({
        "cache": cache,
        "analysis": analysis,
    })))
}
