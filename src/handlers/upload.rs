use crate::AppState;
use crate::error::AppError;
use crate::models::{
    Dimensions, FileMetadata, MediaKind, UploadResponse, UploadedFileInfo,
};
use crate::utils::validation::{ALLOWED_MIME_TYPES, ValidationError, validate_upload};
use axum::{
    Json,
    extract::{Multipart, State},
};
use chrono::Utc;
use lofty::file::AudioFile;
use lofty::probe::Probe;
use serde_json::{Value, json};
use std::io::Cursor;
use std::path::Path;
use tracing::info;
use uuid::Uuid;

#[utoipa::path(
    get,
    path = "/api/upload/status",
    responses(
        (status = 200, description = "Upload limits and supported types")
    )
)]
pub async fn upload_status(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "max_file_size": state.config.max_file_size,
        "allowed_types": ALLOWED_MIME_TYPES,
    }))
}

#[utoipa::path(
    post,
    path = "/api/upload",
    request_body(content = String, description = "Multipart form with a single 'file' field"),
    responses(
        (status = 200, description = "File stored for analysis", body = UploadResponse),
        (status = 400, description = "Validation failed"),
        (status = 413, description = "File too large")
    )
)]
pub async fn upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, AppError> {
    let mut payload: Option<(String, Option<String>, Vec<u8>)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(format!("Invalid multipart body: {}", e)))?
    {
        if field.name() == Some("file") {
            let filename = field
                .file_name()
                .map(|s| s.to_string())
                .ok_or_else(|| AppError::BadRequest("Missing filename".to_string()))?;
            let content_type = field.content_type().map(|s| s.to_string());
            let bytes = field
                .bytes()
                .await
                .map_err(|e| AppError::BadRequest(format!("Failed to read upload: {}", e)))?;
            payload = Some((filename, content_type, bytes.to_vec()));
            break;
        }
    }

    let (filename, content_type, bytes) =
        payload.ok_or_else(|| AppError::BadRequest("No 'file' field in upload".to_string()))?;

    let (sanitized, kind) = validate_upload(
        &filename,
        content_type.as_deref(),
        bytes.len(),
        &bytes[..bytes.len().min(512)],
        state.config.max_file_size,
    )
    .map_err(|e| match e.downcast_ref::<ValidationError>() {
        Some(v) if v.code == "FILE_TOO_LARGE" => AppError::PayloadTooLarge(v.message.clone()),
        Some(v) if v.code == "INVALID_MIME_TYPE" => AppError::UnsupportedMedia(v.message.clone()),
        _ => AppError::BadRequest(e.to_string()),
    })?;

    let mime_type = content_type.unwrap_or_else(|| "application/octet-stream".to_string());
    let (duration, dimensions) = probe_media(&bytes, kind).await;

    let id = Uuid::new_v4().to_string();
    let ext = Path::new(&sanitized)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("bin");
    let stored_path = Path::new(&state.config.upload_dir).join(format!("{}.{}", id, ext));

    tokio::fs::write(&stored_path, &bytes)
        .await
        .map_err(|e| AppError::Internal(format!("Failed to store upload: {}", e)))?;

    let metadata = FileMetadata {
        name: sanitized.clone(),
        size: bytes.len() as u64,
        mime_type,
        upload_time: Utc::now(),
        duration,
        dimensions,
    };

    state
        .uploads
        .register(&id, stored_path.clone(), kind, metadata.clone())
        .await;

    info!(
        "Stored upload {} ({} bytes, {}) as {}",
        sanitized,
        metadata.size,
        kind,
        stored_path.display()
    );

    Ok(Json(UploadResponse {
        success: true,
        message: "File uploaded successfully".to_string(),
        file: UploadedFileInfo {
            id,
            kind,
            metadata,
        },
    }))
}

/// Best-effort probe: image dimensions via `image`, duration via
/// `lofty`. Failures just leave the fields empty.
async fn probe_media(bytes: &[u8], kind: MediaKind) -> (Option<f64>, Option<Dimensions>) {
    match kind {
        MediaKind::Image => {
            let dimensions = image::io::Reader::new(Cursor::new(bytes))
                .with_guessed_format()
                .ok()
                .and_then(|reader| reader.into_dimensions().ok())
                .map(|(width, height)| Dimensions { width, height });
            (None, dimensions)
        }
        MediaKind::Video | MediaKind::Audio => {
            let owned = bytes.to_vec();
            let duration = tokio::task::spawn_blocking(move || {
                let mut cursor = Cursor::new(owned);
                let tagged = Probe::new(&mut cursor).guess_file_type().ok()?.read().ok()?;
                Some(tagged.properties().duration().as_secs_f64())
            })
            .await
            .ok()
            .flatten();
            (duration, None)
        }
    }
}
