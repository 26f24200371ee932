use crate::models::Dimensions;
use crate::services::Verdict;
use crate::utils::filename;
use anyhow::{Context, Result};
use lofty::file::AudioFile;
use lofty::probe::Probe;
use once_cell::sync::Lazy;
use regex::Regex;
use std::io::Cursor;
use std::path::Path;

const CONFIDENCE_CAP: f32 = 95.0;

static DEFAULT_TOOL_NAMES: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"^video_\d{4}-\d{2}-\d{2}",
        r"^output_\d+",
        r"^render_\d+",
        r"^generated_\d+",
        r"^ai_video_\d+",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

static CONSECUTIVE_DIGITS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d{4,}").unwrap());

/// File-property heuristics for video. No frame extraction: everything
/// is judged from the name, the size, the container and the timestamps.
pub async fn analyze(
    path: &Path,
    original_name: &str,
    mime_type: &str,
    dimensions: Option<Dimensions>,
) -> Result<Verdict> {
    let meta = tokio::fs::metadata(path)
        .await
        .with_context(|| format!("reading video metadata {}", path.display()))?;
    let size = meta.len();

    let normalized = filename::normalize(original_name);
    let stem = Path::new(&normalized)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("")
        .to_string();
    let ext = Path::new(&normalized)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_string();

    let mut score: f32 = 0.0;
    let mut features: Vec<String> = Vec::new();
    let keyword_hit = filename::has_ai_keyword(original_name);

    if keyword_hit {
        score += 60.0;
        features.push("filename contains AI generation keyword".to_string());
    }

    if CONSECUTIVE_DIGITS.is_match(&stem) && stem.len() < 12 {
        score += 15.0;
        features.push("sequential digits in short filename".to_string());
    }

    if size < 1_000_000 {
        score += 20.0;
        features.push("unusually small video file".to_string());
    } else if size > 100_000_000 {
        score += 10.0;
        features.push("unusually large video file".to_string());
    }

    if !matches!(ext.as_str(), "mp4" | "avi" | "mov" | "mkv") {
        score += 15.0;
        features.push(format!("uncommon video container '.{}'", ext));
    }

    if stem.len() < 5 && size > 10_000_000 {
        score += 15.0;
        features.push("large file with minimal filename".to_string());
    }

    if created_equals_modified(&meta) {
        score += 10.0;
        features.push("creation and modification time identical".to_string());
    }

    if mime_type.contains("quicktime") && size < 5_000_000 {
        score += 15.0;
        features.push("small quicktime container".to_string());
    }

    if let Ok(head) = read_head(path, 1024).await {
        let hexdump = hex::encode(&head);
        if hexdump.contains("ffff") && hexdump.contains(&"0".repeat(16)) {
            score += 20.0;
            features.push("repetitive byte pattern in header".to_string());
        }
    }

    if let Some(duration) = probe_duration(path).await {
        if duration < 5.0 {
            score += 35.0;
            features.push("very short clip duration".to_string());
        } else if duration > 600.0 {
            score += 10.0;
            features.push("unusually long duration".to_string());
        }
    }

    if let Some(dims) = dimensions {
        if (dims.width > 720 || dims.height > 720) && size < 10_000_000 {
            score += 20.0;
            features.push("high resolution with implausibly small size".to_string());
        }
    }

    if DEFAULT_TOOL_NAMES.iter().any(|re| re.is_match(&stem)) {
        score += 40.0;
        features.push("default generator output filename".to_string());
    }

    let mut confidence = score.clamp(0.0, CONFIDENCE_CAP) as u8;
    let mut is_ai_generated = confidence > 40 || features.len() >= 3;

    // A name that says "AI" outranks weak counter-signals
    if keyword_hit {
        is_ai_generated = true;
        confidence = confidence.max(85);
    }

    Ok(Verdict {
        is_ai_generated,
        confidence,
        explanation: explain(is_ai_generated, confidence, &features),
        detected_features: features,
        method: "video-file-heuristics",
    })
}

fn explain(is_ai: bool, confidence: u8, features: &[String]) -> String {
    if is_ai {
        format!(
            "Video flagged as likely AI-generated ({}% confidence): {}",
            confidence,
            features.join("; ")
        )
    } else if features.is_empty() {
        "No indications of AI generation found".to_string()
    } else {
        format!(
            "Weak signals only ({}% confidence): {}",
            confidence,
            features.join("; ")
        )
    }
}

fn created_equals_modified(meta: &std::fs::Metadata) -> bool {
    match (meta.created(), meta.modified()) {
        (Ok(created), Ok(modified)) => {
            let diff = modified
                .duration_since(created)
                .or_else(|_| created.duration_since(modified))
                .unwrap_or_default();
            diff.as_secs_f64() < 1.0
        }
        _ => false,
    }
}

async fn read_head(path: &Path, len: usize) -> Result<Vec<u8>> {
    use tokio::io::AsyncReadExt;
    let mut file = tokio::fs::File::open(path).await?;
    let mut buf = vec![0u8; len];
    let n = file.read(&mut buf).await?;
    buf.truncate(n);
    Ok(buf)
}

async fn probe_duration(path: &Path) -> Option<f64> {
    let bytes = tokio::fs::read(path).await.ok()?;
    tokio::task::spawn_blocking(move || {
        let mut cursor = Cursor::new(bytes);
        let tagged = Probe::new(&mut cursor).guess_file_type().ok()?.read().ok()?;
        Some(tagged.properties().duration().as_secs_f64())
    })
    .await
    .ok()
    .flatten()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_ai_keyword_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("deepfake_clip.mp4");
        tokio::fs::write(&path, vec![0u8; 2 * 1024 * 1024])
            .await
            .unwrap();

        let verdict = analyze(&path, "deepfake_clip.mp4", "video/mp4", None)
            .await
            .unwrap();
        assert!(verdict.is_ai_generated);
        assert!(verdict.confidence >= 85);
    }

    #[tokio::test]
    async fn test_small_odd_container_accumulates_signals() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("v1.webm");
        tokio::fs::write(&path, vec![0u8; 64 * 1024]).await.unwrap();

        let verdict = analyze(&path, "v1.webm", "video/webm", None).await.unwrap();
        // small file + uncommon extension at minimum
        assert!(verdict.detected_features.len() >= 2);
    }

    #[tokio::test]
    async fn test_default_tool_name_pattern() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("output_0001.mp4");
        tokio::fs::write(&path, vec![1u8; 2 * 1024 * 1024])
            .await
            .unwrap();

        let verdict = analyze(&path, "output_0001.mp4", "video/mp4", None)
            .await
            .unwrap();
        assert!(
            verdict
                .detected_features
                .iter()
                .any(|f| f.contains("default generator"))
        );
    }

    #[tokio::test]
    async fn test_high_resolution_small_file_is_suspicious() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("holiday_clip.mp4");
        tokio::fs::write(&path, vec![3u8; 3_000_000]).await.unwrap();

        let dims = Dimensions {
            width: 1000,
            height: 600,
        };
        let verdict = analyze(&path, "holiday_clip.mp4", "video/mp4", Some(dims))
            .await
            .unwrap();
        // width alone over 720 is enough to pair with the small size
        assert!(
            verdict
                .detected_features
                .iter()
                .any(|f| f.contains("high resolution"))
        );
    }

    #[tokio::test]
    async fn test_plain_video_is_not_flagged() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("birthday_party_2023.mp4");
        tokio::fs::write(&path, vec![7u8; 3 * 1024 * 1024])
            .await
            .unwrap();

        let verdict = analyze(&path, "birthday_party_2023.mp4", "video/mp4", None)
            .await
            .unwrap();
        assert!(!verdict.is_ai_generated);
    }
}
