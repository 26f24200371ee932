use axum::Json;
use chrono::Utc;
use serde_json::{Value, json};

#[utoipa::path(
    get,
    path = "/api/health",
    responses(
        (status = 200, description = "Service is alive")
    )
)]
pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "ai-media-detector",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": Utc::now(),
    }))
}
