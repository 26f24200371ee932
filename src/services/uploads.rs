use crate::models::{FileMetadata, MediaKind};
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::sync::Mutex;

#[derive(Debug, Clone)]
pub struct StoredUpload {
    pub path: PathBuf,
    pub kind: MediaKind,
    pub metadata: FileMetadata,
}

/// Maps upload ids to their on-disk location. In-memory only: uploads
/// are transient and a restart invalidates outstanding ids anyway.
#[derive(Default)]
pub struct UploadRegistry {
    inner: Mutex<HashMap<String, StoredUpload>>,
}

impl UploadRegistry {
    pub async fn register(
        &self,
        id: &str,
        path: PathBuf,
        kind: MediaKind,
        metadata: FileMetadata,
    ) {
        self.inner.lock().await.insert(
            id.to_string(),
            StoredUpload {
                path,
                kind,
                metadata,
            },
        );
    }

    pub async fn get(&self, id: &str) -> Option<StoredUpload> {
        self.inner.lock().await.get(id).cloned()
    }

    pub async fn remove(&self, id: &str) -> Option<StoredUpload> {
        self.inner.lock().await.remove(id)
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[tokio::test]
    async fn test_register_get_remove() {
        let registry = UploadRegistry::default();
        let metadata = FileMetadata {
            name: "a.png".to_string(),
            size: 1,
            mime_type: "image/png".to_string(),
            upload_time: Utc::now(),
            duration: None,
            dimensions: None,
        };

        registry
            .register("id1", PathBuf::from("/tmp/a.png"), MediaKind::Image, metadata)
            .await;
        assert_eq!(registry.len().await, 1);

        let stored = registry.get("id1").await.unwrap();
        assert_eq!(stored.kind, MediaKind::Image);

        assert!(registry.remove("id1").await.is_some());
        assert!(registry.get("id1").await.is_none());
    }
}
