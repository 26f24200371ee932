use crate::AppState;
use crate::error::AppError;
use crate::models::{AnalyzeRequest, AnalyzeResponse, MediaKind};
use crate::services::detection::AnalysisStatsSnapshot;
use axum::{Json, extract::State};
use serde_json::{Value, json};
use std::time::Duration;
use tracing::{info, warn};

#[utoipa::path(
    get,
    path = "/api/analyze/status",
    responses(
        (status = 200, description = "Analysis service liveness")
    )
)]
pub async fn analyze_status() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "supported_types": [
            MediaKind::Image,
            MediaKind::Video,
            MediaKind::Audio,
        ],
    }))
}

#[utoipa::path(
    get,
    path = "/api/analyze/stats",
    responses(
        (status = 200, description = "In-process analysis counters", body = AnalysisStatsSnapshot)
    )
)]
pub async fn analyze_stats(State(state): State<AppState>) -> Json<AnalysisStatsSnapshot> {
    Json(state.detection.stats.snapshot())
}

#[utoipa::path(
    post,
    path = "/api/analyze",
    request_body = AnalyzeRequest,
    responses(
        (status = 200, description = "Analysis verdict", body = AnalyzeResponse),
        (status = 400, description = "Declared type does not match the upload"),
        (status = 404, description = "Unknown file id")
    )
)]
pub async fn analyze(
    State(state): State<AppState>,
    Json(request): Json<AnalyzeRequest>,
) -> Result<Json<AnalyzeResponse>, AppError> {
    let stored = state
        .uploads
        .get(&request.file_id)
        .await
        .ok_or_else(|| AppError::NotFound(format!("No upload with id {}", request.file_id)))?;

    if stored.kind != request.file_type {
        return Err(AppError::BadRequest(format!(
            "Declared type '{}' does not match uploaded '{}'",
            request.file_type, stored.kind
        )));
    }

    let result = state
        .detection
        .analyze_file(&stored.path, stored.kind, stored.metadata.clone())
        .await?;

    info!(
        "Analysis of {} finished: ai={} confidence={}",
        stored.metadata.name, result.is_ai_generated, result.confidence_score
    );

    schedule_deletion(state.clone(), request.file_id.clone());

    Ok(Json(AnalyzeResponse {
        success: true,
        result,
    }))
}

/// Uploads are single-use. The file is removed shortly after the
/// verdict goes out, leaving the grace period for a client re-read.
fn schedule_deletion(state: AppState, file_id: String) {
    let delay = Duration::from_secs(state.config.delete_after_analysis_secs);
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        if let Some(stored) = state.uploads.remove(&file_id).await {
            if let Err(e) = state.cleanup.delete_file(&stored.path).await {
                warn!(
                    "Deferred delete of {} failed: {}",
                    stored.path.display(),
                    e
                );
            }
        }
    });
}
