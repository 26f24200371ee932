pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod utils;

use crate::config::AppConfig;
use crate::middleware::security::SecurityService;
use crate::services::cache::ResultCache;
use crate::services::cleanup::CleanupService;
use crate::services::detection::DetectionService;
use crate::services::uploads::UploadRegistry;
use axum::{
    Router,
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
};
use std::sync::Arc;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::health::health,
        handlers::upload::upload,
        handlers::upload::upload_status,
        handlers::analyze::analyze,
        handlers::analyze::analyze_status,
        handlers::analyze::analyze_stats,
        handlers::performance::cache_stats,
        handlers::performance::overview,
        handlers::security::stats,
        handlers::security::unblock_ip,
        handlers::security::cleanup_now,
        handlers::security::health,
    ),
    components(
        schemas(
            models::MediaKind,
            models::FileMetadata,
            models::Dimensions,
            models::AnalysisResult,
            models::UploadedFileInfo,
            models::UploadResponse,
            models::AnalyzeRequest,
            models::AnalyzeResponse,
            handlers::security::UnblockRequest,
            services::cache::CacheStats,
            services::cleanup::CleanupStats,
            services::detection::AnalysisStatsSnapshot,
            middleware::security::SecurityStats,
        )
    ),
    tags(
        (name = "upload", description = "File upload endpoints"),
        (name = "analyze", description = "AI-generation analysis endpoints"),
        (name = "ops", description = "Operational and debug endpoints")
    )
)]
pub struct ApiDoc;

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub cache: ResultCache,
    pub detection: Arc<DetectionService>,
    pub cleanup: Arc<CleanupService>,
    pub security: Arc<SecurityService>,
    pub uploads: Arc<UploadRegistry>,
}

pub fn create_app(state: AppState) -> Router {
    let mut app = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/api/health", get(handlers::health::health))
        .route(
            "/api/upload",
            post(handlers::upload::upload).layer(from_fn_with_state(
                state.clone(),
                middleware::security::upload_rate_limit,
            )),
        )
        .route("/api/upload/status", get(handlers::upload::upload_status))
        .route(
            "/api/analyze",
            post(handlers::analyze::analyze).layer(from_fn_with_state(
                state.clone(),
                middleware::security::analyze_rate_limit,
            )),
        )
        .route("/api/analyze/status", get(handlers::analyze::analyze_status))
        .route("/api/analyze/stats", get(handlers::analyze::analyze_stats))
        .route(
            "/api/performance/cache-stats",
            get(handlers::performance::cache_stats),
        )
        .route(
            "/api/performance/overview",
            get(handlers::performance::overview),
        );

    if state.config.debug_routes {
        app = app
            .route("/api/security/stats", get(handlers::security::stats))
            .route(
                "/api/security/unblock-ip",
                post(handlers::security::unblock_ip),
            )
            .route(
                "/api/security/cleanup-now",
                post(handlers::security::cleanup_now),
            )
            .route("/api/security/health", get(handlers::security::health));
    }

    app.layer(from_fn_with_state(
        state.clone(),
        middleware::security::security_middleware,
    ))
    .layer(from_fn(middleware::request_id::request_id_middleware))
    .with_state(state)
}
