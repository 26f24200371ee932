use crate::AppState;
use crate::error::AppError;
use axum::{Json, extract::State};
use serde::Deserialize;
use serde_json::{Value, json};
use utoipa::ToSchema;

#[derive(Deserialize, ToSchema)]
pub struct UnblockRequest {
    pub ip: String,
}

#[utoipa::path(
    get,
    path = "/api/security/stats",
    responses(
        (status = 200, description = "Security and cleanup state")
    )
)]
pub async fn stats(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "security": state.security.stats(),
        "cleanup": state.cleanup.stats().await,
        "pending_uploads": state.uploads.len().await,
    }))
}

#[utoipa::path(
    post,
    path = "/api/security/unblock-ip",
    request_body = UnblockRequest,
    responses(
        (status = 200, description = "IP removed from the block list"),
        (status = 400, description = "Not a valid IP address")
    )
)]
pub async fn unblock_ip(
    State(state): State<AppState>,
    Json(request): Json<UnblockRequest>,
) -> Result<Json<Value>, AppError> {
    let ip = request
        .ip
        .parse()
        .map_err(|_| AppError::BadRequest(format!("'{}' is not a valid IP address", request.ip)))?;
    let removed = state.security.unblock(ip);
    Ok(Json(json!({
        "success": true,
        "was_blocked": removed,
    })))
}

#[utoipa::path(
    post,
    path = "/api/security/cleanup-now",
    responses(
        (status = 200, description = "Immediate cleanup sweep results")
    )
)]
pub async fn cleanup_now(State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    let files_deleted = state.cleanup.sweep().await?;
    let cache_entries_removed = state.cache.sweep().await?;
    Ok(Json(json!({
        "success": true,
        "files_deleted": files_deleted,
        "cache_entries_removed": cache_entries_removed,
    })))
}

#[utoipa::path(
    get,
    path = "/api/security/health",
    operation_id = "security_health",
    responses(
        (status = 200, description = "Derived security health with issue list")
    )
)]
pub async fn health(State(state): State<AppState>) -> Json<Value> {
    let security = state.security.stats();
    let cleanup = state.cleanup.stats().await;

    let mut issues: Vec<String> = Vec::new();
    if security.blocked_ips.len() > 100 {
        issues.push(format!("{} IPs currently blocked", security.blocked_ips.len()));
    }
    if cleanup.stored_files >= cleanup.max_files {
        issues.push(format!(
            "stored file count {} at or over the {} cap",
            cleanup.stored_files, cleanup.max_files
        ));
    }

    let status = if issues.is_empty() { "healthy" } else { "degraded" };
    Json(json!({
        "status": status,
        "issues": issues,
    }))
}
