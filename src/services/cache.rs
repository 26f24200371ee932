use crate::models::AnalysisResult;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::watch;
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// One cached analysis verdict, persisted as `<fingerprint>.json`.
#[derive(Debug, Serialize, Deserialize)]
pub struct CacheEntry {
    pub timestamp_ms: u64,
    pub result: AnalysisResult,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct CacheStats {
    pub entries: usize,
    pub total_size_bytes: u64,
    pub max_size_bytes: u64,
    pub max_age_hours: u64,
}

/// Flat-file result cache: one JSON file per fingerprint, expired by age,
/// bounded by aggregate size with oldest-first eviction.
#[derive(Clone)]
pub struct ResultCache {
    dir: PathBuf,
    max_age: Duration,
    max_size: u64,
}

impl ResultCache {
    pub fn new(dir: impl Into<PathBuf>, max_age_hours: u64, max_size: u64) -> Self {
        Self {
            dir: dir.into(),
            max_age: Duration::from_secs(max_age_hours * 3600),
            max_size,
        }
    }

    pub async fn init(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        Ok(())
    }

    fn entry_path(&self, fingerprint: &str) -> PathBuf {
        self.dir.join(format!("{}.json", fingerprint))
    }

    /// Fetch a fresh entry; a stale one is deleted on the way out.
    pub async fn get(&self, fingerprint: &str) -> Option<AnalysisResult> {
        let path = self.entry_path(fingerprint);
        let bytes = tokio::fs::read(&path).await.ok()?;

        let entry: CacheEntry = match serde_json::from_slice(&bytes) {
            Ok(e) => e,
            Err(e) => {
                warn!("Discarding unreadable cache entry {}: {}", fingerprint, e);
                let _ = tokio::fs::remove_file(&path).await;
                return None;
            }
        };

        if now_ms().saturating_sub(entry.timestamp_ms) > self.max_age.as_millis() as u64 {
            debug!("Cache entry {} expired", fingerprint);
            let _ = tokio::fs::remove_file(&path).await;
            return None;
        }

        debug!("Cache hit for {}", fingerprint);
        Some(entry.result)
    }

    pub async fn put(&self, fingerprint: &str, result: &AnalysisResult) -> Result<()> {
        let entry = CacheEntry {
            timestamp_ms: now_ms(),
            result: result.clone(),
        };
        let bytes = serde_json::to_vec(&entry)?;
        tokio::fs::write(self.entry_path(fingerprint), bytes).await?;
        Ok(())
    }

    pub async fn stats(&self) -> Result<CacheStats> {
        let mut entries = 0;
        let mut total = 0u64;
        let mut dir = tokio::fs::read_dir(&self.dir).await?;
        while let Some(item) = dir.next_entry().await? {
            if item.path().extension().map(|e| e == "json").unwrap_or(false) {
                entries += 1;
                total += item.metadata().await.map(|m| m.len()).unwrap_or(0);
            }
        }
        Ok(CacheStats {
            entries,
            total_size_bytes: total,
            max_size_bytes: self.max_size,
            max_age_hours: self.max_age.as_secs() / 3600,
        })
    }

    /// Drop expired entries, then evict oldest-first until usage is back
    /// under 80% of the size bound.
    pub async fn sweep(&self) -> Result<usize> {
        let mut removed = 0;
        let mut live: Vec<(PathBuf, u64, u64)> = Vec::new(); // (path, timestamp_ms, size)

        let mut dir = tokio::fs::read_dir(&self.dir).await?;
        while let Some(item) = dir.next_entry().await? {
            let path = item.path();
            if !path.extension().map(|e| e == "json").unwrap_or(false) {
                continue;
            }

            let size = item.metadata().await.map(|m| m.len()).unwrap_or(0);
            let timestamp = match read_timestamp(&path).await {
                Some(ts) => ts,
                None => {
                    let _ = tokio::fs::remove_file(&path).await;
                    removed += 1;
                    continue;
                }
            };

            if now_ms().saturating_sub(timestamp) > self.max_age.as_millis() as u64 {
                let _ = tokio::fs::remove_file(&path).await;
                removed += 1;
            } else {
                live.push((path, timestamp, size));
            }
        }

        let mut total: u64 = live.iter().map(|(_, _, s)| s).sum();
        if total > self.max_size {
            let target = self.max_size * 8 / 10;
            live.sort_by_key(|(_, ts, _)| *ts);
            for (path, _, size) in live {
                if total <= target {
                    break;
                }
                if tokio::fs::remove_file(&path).await.is_ok() {
                    total = total.saturating_sub(size);
                    removed += 1;
                }
            }
        }

        if removed > 0 {
            info!("Cache sweep removed {} entries", removed);
        }
        Ok(removed)
    }

    /// Hourly sweeper, stopped through the shutdown channel.
    pub async fn run_sweeper(self, mut shutdown: watch::Receiver<bool>) {
        loop {
            tokio::select! {
                _ = sleep(Duration::from_secs(3600)) => {
                    if let Err(e) = self.sweep().await {
                        warn!("Cache sweep failed: {}", e);
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("Cache sweeper shutting down");
                        return;
                    }
                }
            }
        }
    }
}

async fn read_timestamp(path: &Path) -> Option<u64> {
    let bytes = tokio::fs::read(path).await.ok()?;
    let entry: CacheEntry = serde_json::from_slice(&bytes).ok()?;
    Some(entry.timestamp_ms)
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FileMetadata;
    use chrono::Utc;

    fn sample_result() -> AnalysisResult {
        AnalysisResult {
            is_ai_generated: true,
            confidence_score: 72,
            detection_method: "image-heuristics".to_string(),
            processing_time_ms: 12,
            file_info: FileMetadata {
                name: "x.png".to_string(),
                size: 10,
                mime_type: "image/png".to_string(),
                upload_time: Utc::now(),
                duration: None,
                dimensions: None,
            },
            detected_features: vec!["EXIF data missing".to_string()],
            explanation: "test".to_string(),
        }
    }

    #[tokio::test]
    async fn test_put_then_get() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ResultCache::new(dir.path(), 24, 1024 * 1024);
        cache.init().await.unwrap();

        assert!(cache.get("abc").await.is_none());
        cache.put("abc", &sample_result()).await.unwrap();

        let hit = cache.get("abc").await.unwrap();
        assert!(hit.is_ai_generated);
        assert_eq!(hit.confidence_score, 72);
    }

    #[tokio::test]
    async fn test_expired_entry_is_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ResultCache::new(dir.path(), 24, 1024 * 1024);
        cache.init().await.unwrap();

        let stale = CacheEntry {
            timestamp_ms: now_ms() - 25 * 3600 * 1000,
            result: sample_result(),
        };
        tokio::fs::write(
            dir.path().join("old.json"),
            serde_json::to_vec(&stale).unwrap(),
        )
        .await
        .unwrap();

        assert!(cache.get("old").await.is_none());
        assert!(!dir.path().join("old.json").exists());
    }

    #[tokio::test]
    async fn test_sweep_expires_and_evicts() {
        let dir = tempfile::tempdir().unwrap();
        // Tiny size bound so eviction triggers
        let cache = ResultCache::new(dir.path(), 24, 300);
        cache.init().await.unwrap();

        let stale = CacheEntry {
            timestamp_ms: now_ms() - 25 * 3600 * 1000,
            result: sample_result(),
        };
        tokio::fs::write(
            dir.path().join("stale.json"),
            serde_json::to_vec(&stale).unwrap(),
        )
        .await
        .unwrap();

        cache.put("fresh1", &sample_result()).await.unwrap();
        cache.put("fresh2", &sample_result()).await.unwrap();

        let removed = cache.sweep().await.unwrap();
        assert!(removed >= 1);
        assert!(!dir.path().join("stale.json").exists());

        let stats = cache.stats().await.unwrap();
        assert!(stats.total_size_bytes <= 300 * 8 / 10 || stats.entries <= 1);
    }

    #[tokio::test]
    async fn test_corrupt_entry_is_removed() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ResultCache::new(dir.path(), 24, 1024);
        cache.init().await.unwrap();

        tokio::fs::write(dir.path().join("bad.json"), b"not json")
            .await
            .unwrap();
        assert!(cache.get("bad").await.is_none());
        assert!(!dir.path().join("bad.json").exists());
    }
}
