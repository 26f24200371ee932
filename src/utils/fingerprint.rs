use anyhow::Result;
use sha2::{Digest, Sha256};
use std::path::Path;
use std::time::UNIX_EPOCH;

/// Fingerprint a file by identity, not content: path, size and mtime.
/// Reading the whole file would defeat the point of the cache lookup.
pub async fn file_fingerprint(path: &Path) -> Result<String> {
    let meta = tokio::fs::metadata(path).await?;
    let mtime_ms = meta
        .modified()?
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0);

    Ok(fingerprint_parts(&path.to_string_lossy(), meta.len(), mtime_ms))
}

pub fn fingerprint_parts(path: &str, size: u64, mtime_ms: u128) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("{}-{}-{}", path, size, mtime_ms).as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_is_stable() {
        let a = fingerprint_parts("/tmp/a.png", 100, 1_700_000_000_000);
        let b = fingerprint_parts("/tmp/a.png", 100, 1_700_000_000_000);
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_fingerprint_changes_with_mtime() {
        let a = fingerprint_parts("/tmp/a.png", 100, 1);
        let b = fingerprint_parts("/tmp/a.png", 100, 2);
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_file_fingerprint() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sample.bin");
        tokio::fs::write(&path, b"payload").await.unwrap();

        let fp1 = file_fingerprint(&path).await.unwrap();
        let fp2 = file_fingerprint(&path).await.unwrap();
        assert_eq!(fp1, fp2);

        assert!(file_fingerprint(&dir.path().join("missing")).await.is_err());
    }
}
