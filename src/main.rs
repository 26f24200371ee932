use ai_media_detector::config::AppConfig;
use ai_media_detector::middleware::security::SecurityService;
use ai_media_detector::services::cache::ResultCache;
use ai_media_detector::services::cleanup::CleanupService;
use ai_media_detector::services::detection::DetectionService;
use ai_media_detector::services::uploads::UploadRegistry;
use ai_media_detector::{AppState, create_app};
use dotenvy::dotenv;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    // Initialize tracing with EnvFilter
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ai_media_detector=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("🚀 Starting AI media detector...");

    let config = AppConfig::from_env();
    info!(
        "⚙️  Config: max size={}MB, file max age={}m, cache cap={}MB, strict={}",
        config.max_file_size / 1024 / 1024,
        config.file_max_age_minutes,
        config.cache_max_size / 1024 / 1024,
        config.strict_security
    );

    let cache = ResultCache::new(
        &config.cache_dir,
        config.cache_max_age_hours,
        config.cache_max_size,
    );
    cache.init().await?;

    let cleanup = CleanupService::new(
        vec![
            PathBuf::from(&config.upload_dir),
            PathBuf::from(&config.temp_dir),
        ],
        config.file_max_age_minutes,
        config.max_stored_files,
        config.cleanup_interval_minutes,
    );
    cleanup.init().await?;

    let detection = Arc::new(DetectionService::new(cache.clone(), &config.temp_dir));
    let security = Arc::new(SecurityService::new(config.strict_security));
    let uploads = Arc::new(UploadRegistry::default());

    let state = AppState {
        config: config.clone(),
        cache: cache.clone(),
        detection,
        cleanup: cleanup.clone(),
        security: security.clone(),
        uploads,
    };

    // Setup Shutdown Channel
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    // Background workers: auto-delete, cache sweeper, suspicion reset
    tokio::spawn(cleanup.clone().run(shutdown_rx.clone()));
    tokio::spawn(cache.clone().run_sweeper(shutdown_rx.clone()));
    tokio::spawn(security.clone().run_reset(shutdown_rx));

    let app = create_app(state)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &axum::http::Request<_>| {
                    let request_id = request
                        .headers()
                        .get("x-request-id")
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or("unknown");
                    tracing::info_span!(
                        "http_request",
                        method = %request.method(),
                        uri = %request.uri(),
                        request_id = %request_id,
                    )
                })
                .on_request(|request: &axum::http::Request<_>, _span: &tracing::Span| {
                    info!("📥 {} {}", request.method(), request.uri());
                })
                .on_response(
                    |response: &axum::http::Response<_>,
                     latency: std::time::Duration,
                     _span: &tracing::Span| {
                        info!(
                            "📤 Finished in {:?} with status {}",
                            latency,
                            response.status()
                        );
                    },
                ),
        )
        .layer(CorsLayer::permissive())
        .layer(axum::extract::DefaultBodyLimit::max(config.max_file_size));

    let addr = SocketAddr::from(([127, 0, 0, 1], config.port));
    info!("✅ Server ready at http://{}", addr);
    info!("📖 Swagger UI: http://{}/swagger-ui", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        shutdown_signal().await;
        let _ = shutdown_tx.send(true);
    })
    .await?;

    info!("🛑 Server shut down gracefully.");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("⌨️  Ctrl+C received, starting graceful shutdown...");
        },
        _ = terminate => {
            info!("💤 SIGTERM received, starting graceful shutdown...");
        },
    }
}
