use crate::models::{AnalysisResult, FileMetadata, MediaKind};
use crate::services::Verdict;
use crate::services::cache::ResultCache;
use crate::services::{audio_analysis, image_analysis, video_analysis};
use crate::utils::fingerprint::file_fingerprint;
use anyhow::Result;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::{info, warn};

const RETRY_ATTEMPTS: u32 = 2;
const RETRY_BASE_DELAY: Duration = Duration::from_secs(2);

/// In-process analysis counters, reset on restart.
#[derive(Default)]
pub struct AnalysisStats {
    pub total: AtomicU64,
    pub images: AtomicU64,
    pub videos: AtomicU64,
    pub audio: AtomicU64,
    pub ai_detected: AtomicU64,
    pub total_processing_ms: AtomicU64,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct AnalysisStatsSnapshot {
    pub total_analyses: u64,
    pub images: u64,
    pub videos: u64,
    pub audio: u64,
    pub ai_detected: u64,
    pub avg_processing_time_ms: u64,
}

impl AnalysisStats {
    pub fn record(&self, kind: MediaKind, result: &AnalysisResult) {
        self.total.fetch_add(1, Ordering::Relaxed);
        match kind {
            MediaKind::Image => self.images.fetch_add(1, Ordering::Relaxed),
            MediaKind::Video => self.videos.fetch_add(1, Ordering::Relaxed),
            MediaKind::Audio => self.audio.fetch_add(1, Ordering::Relaxed),
        };
        if result.is_ai_generated {
            self.ai_detected.fetch_add(1, Ordering::Relaxed);
        }
        self.total_processing_ms
            .fetch_add(result.processing_time_ms, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> AnalysisStatsSnapshot {
        let total = self.total.load(Ordering::Relaxed);
        let total_ms = self.total_processing_ms.load(Ordering::Relaxed);
        AnalysisStatsSnapshot {
            total_analyses: total,
            images: self.images.load(Ordering::Relaxed),
            videos: self.videos.load(Ordering::Relaxed),
            audio: self.audio.load(Ordering::Relaxed),
            ai_detected: self.ai_detected.load(Ordering::Relaxed),
            avg_processing_time_ms: if total > 0 { total_ms / total } else { 0 },
        }
    }
}

/// Dispatches a file to the analyzer for its kind, in front of the
/// result cache and behind a short retry loop.
pub struct DetectionService {
    cache: ResultCache,
    temp_dir: PathBuf,
    pub stats: Arc<AnalysisStats>,
}

impl DetectionService {
    pub fn new(cache: ResultCache, temp_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache,
            temp_dir: temp_dir.into(),
            stats: Arc::new(AnalysisStats::default()),
        }
    }

    pub async fn analyze_file(
        &self,
        path: &Path,
        kind: MediaKind,
        metadata: FileMetadata,
    ) -> Result<AnalysisResult> {
        let fingerprint = file_fingerprint(path).await?;

        if let Some(cached) = self.cache.get(&fingerprint).await {
            info!("Returning cached analysis for {}", metadata.name);
            self.stats.record(kind, &cached);
            return Ok(cached);
        }

        let started = Instant::now();
        let verdict = self.run_with_retry(path, kind, &metadata).await?;
        let processing_time_ms = started.elapsed().as_millis() as u64;

        let result = AnalysisResult {
            is_ai_generated: verdict.is_ai_generated,
            confidence_score: verdict.confidence,
            detection_method: verdict.method.to_string(),
            processing_time_ms,
            file_info: metadata,
            detected_features: verdict.detected_features,
            explanation: verdict.explanation,
        };

        if let Err(e) = self.cache.put(&fingerprint, &result).await {
            warn!("Failed to cache analysis result: {}", e);
        }
        self.stats.record(kind, &result);
        Ok(result)
    }

    async fn run_with_retry(
        &self,
        path: &Path,
        kind: MediaKind,
        metadata: &FileMetadata,
    ) -> Result<Verdict> {
        let mut delay = RETRY_BASE_DELAY;
        let mut last_err = None;

        for attempt in 1..=RETRY_ATTEMPTS {
            match self.run_analysis(path, kind, metadata).await {
                Ok(verdict) => return Ok(verdict),
                Err(e) => {
                    warn!(
                        "Analysis attempt {}/{} failed for {}: {}",
                        attempt, RETRY_ATTEMPTS, metadata.name, e
                    );
                    last_err = Some(e);
                    if attempt < RETRY_ATTEMPTS {
                        tokio::time::sleep(delay).await;
                        delay *= 2;
                    }
                }
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("analysis failed")))
    }

    async fn run_analysis(
        &self,
        path: &Path,
        kind: MediaKind,
        metadata: &FileMetadata,
    ) -> Result<Verdict> {
        match kind {
            MediaKind::Image => {
                // The pixel passes run on a bounded working copy
                match image_analysis::optimize_for_analysis(path, &self.temp_dir).await {
                    Ok(optimized) => {
                        let verdict = image_analysis::analyze(&optimized, &metadata.name).await;
                        let _ = tokio::fs::remove_file(&optimized).await;
                        verdict
                    }
                    Err(e) => {
                        warn!("Could not optimize {} for analysis: {}", metadata.name, e);
                        image_analysis::analyze(path, &metadata.name).await
                    }
                }
            }
            MediaKind::Video => {
                video_analysis::analyze(path, &metadata.name, &metadata.mime_type, metadata.dimensions)
                    .await
            }
            MediaKind::Audio => audio_analysis::analyze(path, &metadata.name).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn metadata(name: &str, mime: &str, size: u64) -> FileMetadata {
        FileMetadata {
            name: name.to_string(),
            size,
            mime_type: mime.to_string(),
            upload_time: Utc::now(),
            duration: None,
            dimensions: None,
        }
    }

    #[tokio::test]
    async fn test_analyze_image_and_cache_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ResultCache::new(dir.path().join("cache"), 24, 1024 * 1024);
        cache.init().await.unwrap();
        tokio::fs::create_dir_all(dir.path().join("temp"))
            .await
            .unwrap();

        let service = DetectionService::new(cache, dir.path().join("temp"));

        let path = dir.path().join("dalle_render.png");
        let img = image::GrayImage::from_fn(32, 32, |x, y| {
            image::Luma([((x * 13 + y * 7) % 256) as u8])
        });
        image::DynamicImage::ImageLuma8(img).save(&path).unwrap();

        let meta = metadata("dalle_render.png", "image/png", 100);
        let first = service
            .analyze_file(&path, MediaKind::Image, meta.clone())
            .await
            .unwrap();
        assert!(first.is_ai_generated);

        // Second call must come from the cache: identical verdict, and the
        // stats counter advances per call
        let second = service
            .analyze_file(&path, MediaKind::Image, meta)
            .await
            .unwrap();
        assert_eq!(first.confidence_score, second.confidence_score);
        assert_eq!(service.stats.snapshot().total_analyses, 2);
        assert_eq!(service.stats.snapshot().images, 2);
    }

    #[tokio::test]
    async fn test_missing_file_errors() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ResultCache::new(dir.path().join("cache"), 24, 1024 * 1024);
        cache.init().await.unwrap();
        let service = DetectionService::new(cache, dir.path());

        let meta = metadata("ghost.png", "image/png", 0);
        let err = service
            .analyze_file(&dir.path().join("ghost.png"), MediaKind::Image, meta)
            .await;
        assert!(err.is_err());
    }

    #[tokio::test]
    async fn test_stats_snapshot_counts_ai() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ResultCache::new(dir.path().join("cache"), 24, 1024 * 1024);
        cache.init().await.unwrap();
        let service = DetectionService::new(cache, dir.path());

        let path = dir.path().join("tts_sample.mp3");
        tokio::fs::write(&path, vec![0u8; 150 * 1024]).await.unwrap();

        let meta = metadata("tts_sample.mp3", "audio/mpeg", 150 * 1024);
        let result = service
            .analyze_file(&path, MediaKind::Audio, meta)
            .await
            .unwrap();

        let snapshot = service.stats.snapshot();
        assert_eq!(snapshot.audio, 1);
        assert_eq!(snapshot.ai_detected, u64::from(result.is_ai_generated));
    }
}
