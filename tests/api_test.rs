use ai_media_detector::config::AppConfig;
use ai_media_detector::middleware::security::SecurityService;
use ai_media_detector::services::cache::ResultCache;
use ai_media_detector::services::cleanup::CleanupService;
use ai_media_detector::services::detection::DetectionService;
use ai_media_detector::services::uploads::UploadRegistry;
use ai_media_detector::{AppState, create_app};
use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use http_body_util::BodyExt;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use tower::ServiceExt;

const BOUNDARY: &str = "---------------------------123456789012345678901234567";

async fn test_state(root: &std::path::Path) -> AppState {
    let config = AppConfig {
        upload_dir: root.join("uploads").to_string_lossy().into_owned(),
        temp_dir: root.join("temp").to_string_lossy().into_owned(),
        cache_dir: root.join("cache").to_string_lossy().into_owned(),
        ..AppConfig::development()
    };

    let cache = ResultCache::new(
        &config.cache_dir,
        config.cache_max_age_hours,
        config.cache_max_size,
    );
    cache.init().await.unwrap();

    let cleanup = CleanupService::new(
        vec![
            PathBuf::from(&config.upload_dir),
            PathBuf::from(&config.temp_dir),
        ],
        config.file_max_age_minutes,
        config.max_stored_files,
        config.cleanup_interval_minutes,
    );
    cleanup.init().await.unwrap();

    AppState {
        detection: Arc::new(DetectionService::new(cache.clone(), &config.temp_dir)),
        cache,
        cleanup,
        security: Arc::new(SecurityService::new(config.strict_security)),
        uploads: Arc::new(UploadRegistry::default()),
        config,
    }
}

fn multipart_upload(filename: &str, content_type: &str, bytes: &[u8]) -> Request<Body> {
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
    body.extend_from_slice(
        format!(
            "Content-Disposition: form-data; name=\"file\"; filename=\"{}\"\r\n",
            filename
        )
        .as_bytes(),
    );
    body.extend_from_slice(format!("Content-Type: {}\r\n\r\n", content_type).as_bytes());
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());

    Request::builder()
        .method("POST")
        .uri("/api/upload")
        .header("User-Agent", "Mozilla/5.0 (integration tests)")
        .header(
            "Content-Type",
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(body))
        .unwrap()
}

fn png_bytes() -> Vec<u8> {
    let img = image::GrayImage::from_fn(32, 32, |x, y| {
        image::Luma([((x * 31 + y * 17 + x * y) % 256) as u8])
    });
    let mut out = std::io::Cursor::new(Vec::new());
    image::DynamicImage::ImageLuma8(img)
        .write_to(&mut out, image::ImageFormat::Png)
        .unwrap();
    out.into_inner()
}

#[tokio::test]
async fn test_health() {
    let dir = tempfile::tempdir().unwrap();
    let app = create_app(test_state(dir.path()).await);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/health")
                .header("User-Agent", "Mozilla/5.0 (integration tests)")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["status"], "ok");
}

#[tokio::test]
async fn test_upload_and_analyze_flow() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(dir.path()).await;
    let app = create_app(state);

    // 1. Upload an image whose name declares an AI tool
    let response = app
        .clone()
        .oneshot(multipart_upload(
            "midjourney_test.png",
            "image/png",
            &png_bytes(),
        ))
        .await
        .unwrap();

    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    if status != StatusCode::OK {
        panic!(
            "Upload failed with status {}: {:?}",
            status,
            String::from_utf8_lossy(&body)
        );
    }

    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["success"], true);
    let file_id = json["file"]["id"].as_str().unwrap().to_string();
    assert!(!file_id.is_empty());
    assert_eq!(json["file"]["type"], "image");
    assert_eq!(json["file"]["metadata"]["dimensions"]["width"], 32);

    // 2. Analyze it
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/analyze")
                .header("User-Agent", "Mozilla/5.0 (integration tests)")
                .header("Content-Type", "application/json")
                .body(Body::from(format!(
                    r#"{{"file_id": "{}", "file_type": "image"}}"#,
                    file_id
                )))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["success"], true);
    assert_eq!(json["result"]["is_ai_generated"], true);
    assert!(json["result"]["confidence_score"].as_u64().unwrap() > 40);

    // 3. Stats reflect the run
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/analyze/stats")
                .header("User-Agent", "Mozilla/5.0 (integration tests)")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["total_analyses"], 1);
    assert_eq!(json["images"], 1);
    assert_eq!(json["ai_detected"], 1);
}

#[tokio::test]
async fn test_analyze_type_mismatch_and_unknown_id() {
    let dir = tempfile::tempdir().unwrap();
    let app = create_app(test_state(dir.path()).await);

    let response = app
        .clone()
        .oneshot(multipart_upload("photo.png", "image/png", &png_bytes()))
        .await
        .unwrap();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json: Value = serde_json::from_slice(&body).unwrap();
    let file_id = json["file"]["id"].as_str().unwrap().to_string();

    // Declared video for an image upload
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/analyze")
                .header("User-Agent", "Mozilla/5.0 (integration tests)")
                .header("Content-Type", "application/json")
                .body(Body::from(format!(
                    r#"{{"file_id": "{}", "file_type": "video"}}"#,
                    file_id
                )))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // Unknown id
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/analyze")
                .header("User-Agent", "Mozilla/5.0 (integration tests)")
                .header("Content-Type", "application/json")
                .body(Body::from(
                    r#"{"file_id": "no-such-id", "file_type": "image"}"#,
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_upload_rejects_disallowed_type() {
    let dir = tempfile::tempdir().unwrap();
    let app = create_app(test_state(dir.path()).await);

    let response = app
        .oneshot(multipart_upload(
            "report.pdf",
            "application/pdf",
            b"%PDF-1.5 not really",
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
}

#[tokio::test]
async fn test_upload_rejects_executable_masquerading_as_image() {
    let dir = tempfile::tempdir().unwrap();
    let app = create_app(test_state(dir.path()).await);

    let mut fake = vec![0x4D, 0x5A];
    fake.extend_from_slice(&[0u8; 64]);
    let response = app
        .oneshot(multipart_upload("cute_cat.png", "image/png", &fake))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_upload_rate_limit() {
    let dir = tempfile::tempdir().unwrap();
    let app = create_app(test_state(dir.path()).await);
    let png = png_bytes();

    let mut last_status = StatusCode::OK;
    for i in 0..11 {
        let response = app
            .clone()
            .oneshot(multipart_upload(
                &format!("photo_{}.png", i),
                "image/png",
                &png,
            ))
            .await
            .unwrap();
        last_status = response.status();
    }
    assert_eq!(last_status, StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn test_security_debug_routes() {
    let dir = tempfile::tempdir().unwrap();
    let app = create_app(test_state(dir.path()).await);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/security/stats")
                .header("User-Agent", "Mozilla/5.0 (integration tests)")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["security"]["strict_mode"], false);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/security/unblock-ip")
                .header("User-Agent", "Mozilla/5.0 (integration tests)")
                .header("Content-Type", "application/json")
                .body(Body::from(r#"{"ip": "203.0.113.99"}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/security/cleanup-now")
                .header("User-Agent", "Mozilla/5.0 (integration tests)")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_debug_routes_absent_in_production() {
    let dir = tempfile::tempdir().unwrap();
    let mut state = test_state(dir.path()).await;
    state.config.debug_routes = false;
    let app = create_app(state);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/security/stats")
                .header("User-Agent", "Mozilla/5.0 (integration tests)")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
