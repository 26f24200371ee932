use anyhow::Result;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime};
use tokio::sync::watch;
use tokio::time::sleep;
use tracing::{info, warn};

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct CleanupStats {
    pub files_deleted_total: u64,
    pub sweeps_run: u64,
    pub stored_files: usize,
    pub max_age_minutes: u64,
    pub max_files: usize,
}

/// Deletes uploads that outlived their welcome. Files are transient by
/// contract: analyzed then discarded, never archived.
pub struct CleanupService {
    dirs: Vec<PathBuf>,
    max_age: Duration,
    max_files: usize,
    interval: Duration,
    deleted_total: AtomicU64,
    sweeps: AtomicU64,
}

impl CleanupService {
    pub fn new(
        dirs: Vec<PathBuf>,
        max_age_minutes: u64,
        max_files: usize,
        interval_minutes: u64,
    ) -> Arc<Self> {
        Arc::new(Self {
            dirs,
            max_age: Duration::from_secs(max_age_minutes * 60),
            max_files,
            interval: Duration::from_secs(interval_minutes * 60),
            deleted_total: AtomicU64::new(0),
            sweeps: AtomicU64::new(0),
        })
    }

    pub async fn init(&self) -> Result<()> {
        for dir in &self.dirs {
            tokio::fs::create_dir_all(dir).await?;
        }
        Ok(())
    }

    /// Age pass then count pass. Oldest files go first when the count cap
    /// is still exceeded after expiring by age.
    pub async fn sweep(&self) -> Result<u64> {
        let mut deleted = 0u64;
        let mut remaining: Vec<(PathBuf, SystemTime)> = Vec::new();
        let now = SystemTime::now();

        for dir in &self.dirs {
            let mut entries = match tokio::fs::read_dir(dir).await {
                Ok(e) => e,
                Err(e) => {
                    warn!("Cleanup cannot read {}: {}", dir.display(), e);
                    continue;
                }
            };

            while let Some(item) = entries.next_entry().await? {
                let meta = match item.metadata().await {
                    Ok(m) if m.is_file() => m,
                    _ => continue,
                };
                let modified = meta.modified().unwrap_or(now);
                let age = now.duration_since(modified).unwrap_or_default();

                if age > self.max_age {
                    if self.remove(&item.path()).await {
                        deleted += 1;
                    }
                } else {
                    remaining.push((item.path(), modified));
                }
            }
        }

        if remaining.len() > self.max_files {
            remaining.sort_by_key(|(_, modified)| *modified);
            let excess = remaining.len() - self.max_files;
            for (path, _) in remaining.into_iter().take(excess) {
                if self.remove(&path).await {
                    deleted += 1;
                }
            }
        }

        self.sweeps.fetch_add(1, Ordering::Relaxed);
        if deleted > 0 {
            info!("Cleanup sweep deleted {} files", deleted);
        }
        Ok(deleted)
    }

    async fn remove(&self, path: &Path) -> bool {
        match tokio::fs::remove_file(path).await {
            Ok(()) => {
                self.deleted_total.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(e) => {
                warn!("Failed to delete {}: {}", path.display(), e);
                false
            }
        }
    }

    /// Delete one file right now (used after analysis completes).
    pub async fn delete_file(&self, path: &Path) -> Result<()> {
        tokio::fs::remove_file(path).await?;
        self.deleted_total.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    pub async fn stats(&self) -> CleanupStats {
        let mut stored = 0;
        for dir in &self.dirs {
            if let Ok(mut entries) = tokio::fs::read_dir(dir).await {
                while let Ok(Some(item)) = entries.next_entry().await {
                    if item.metadata().await.map(|m| m.is_file()).unwrap_or(false) {
                        stored += 1;
                    }
                }
            }
        }
        CleanupStats {
            files_deleted_total: self.deleted_total.load(Ordering::Relaxed),
            sweeps_run: self.sweeps.load(Ordering::Relaxed),
            stored_files: stored,
            max_age_minutes: self.max_age.as_secs() / 60,
            max_files: self.max_files,
        }
    }

    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        info!(
            "Auto-delete worker started (max_age={}m, max_files={}, interval={}m)",
            self.max_age.as_secs() / 60,
            self.max_files,
            self.interval.as_secs() / 60
        );
        loop {
            tokio::select! {
                _ = sleep(self.interval) => {
                    if let Err(e) = self.sweep().await {
                        warn!("Cleanup sweep failed: {}", e);
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("Auto-delete worker shutting down");
                        return;
                    }
                }
            }
        }
    }
}
