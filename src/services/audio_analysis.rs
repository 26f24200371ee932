use crate::services::Verdict;
use crate::utils::filename;
use anyhow::{Context, Result};
use lofty::file::AudioFile;
use lofty::probe::Probe;
use std::io::Cursor;
use std::path::Path;

const CONFIDENCE_CAP: f32 = 95.0;

const TTS_KEYWORDS: &[&str] = &[
    "tts",
    "synthesized",
    "synthetic",
    "generated",
    "ai",
    "robot",
    "clone",
    "voiceover",
];

const EDITING_KEYWORDS: &[&str] = &["edited", "cut", "splice", "modified", "processed"];

/// Probed container facts, with filesize-based fallbacks when the
/// container cannot be parsed.
struct AudioProfile {
    size: u64,
    duration_secs: f64,
    bitrate_kbps: u32,
    ext: String,
}

/// Heuristic audio scoring around four proxies: spectrum, voice
/// naturalness, editing traces, and robotic delivery.
pub async fn analyze(path: &Path, original_name: &str) -> Result<Verdict> {
    let profile = build_profile(path, original_name).await?;
    let normalized = filename::normalize(original_name);

    let mut score: f32 = 0.0;
    let mut features: Vec<String> = Vec::new();

    score += score_spectrum(&profile, &mut features);
    score += score_voice(&profile, &normalized, &mut features);
    score += score_editing(&profile, &normalized, &mut features);
    score += score_naturalness(&profile, &normalized, &mut features);

    let confidence = score.clamp(0.0, CONFIDENCE_CAP) as u8;
    let is_ai_generated = confidence > 50;

    Ok(Verdict {
        is_ai_generated,
        confidence,
        explanation: explain(is_ai_generated, confidence, &features),
        detected_features: features,
        method: "audio-heuristics",
    })
}

fn explain(is_ai: bool, confidence: u8, features: &[String]) -> String {
    if is_ai {
        format!(
            "Audio flagged as likely AI-generated ({}% confidence): {}",
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

async fn build_profile(path: &Path, original_name: &str) -> Result<AudioProfile> {
    let meta = tokio::fs::metadata(path)
        .await
        .with_context(|| format!("reading audio metadata {}", path.display()))?;
    let size = meta.len();

    let ext = Path::new(&filename::normalize(original_name))
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_string();

    let probed = probe(path).await;
    // ~16 kB/s is a serviceable stand-in for speech-grade audio
    let duration_secs = probed
        .map(|(d, _)| d)
        .filter(|d| *d > 0.0)
        .unwrap_or(size as f64 / 16000.0);
    let bitrate_kbps = probed.and_then(|(_, b)| b).unwrap_or_else(|| {
        if duration_secs > 0.0 {
            (size as f64 * 8.0 / duration_secs / 1000.0) as u32
        } else {
            0
        }
    });

    Ok(AudioProfile {
        size,
        duration_secs,
        bitrate_kbps,
        ext,
    })
}

async fn probe(path: &Path) -> Option<(f64, Option<u32>)> {
    let bytes = tokio::fs::read(path).await.ok()?;
    tokio::task::spawn_blocking(move || {
        let mut cursor = Cursor::new(bytes);
        let tagged = Probe::new(&mut cursor).guess_file_type().ok()?.read().ok()?;
        let properties = tagged.properties();
        Some((
            properties.duration().as_secs_f64(),
            properties.audio_bitrate(),
        ))
    })
    .await
    .ok()
    .flatten()
}

fn score_spectrum(profile: &AudioProfile, features: &mut Vec<String>) -> f32 {
    let mut spectral_score = 100.0f32;
    let mut gaps = false;
    let mut unnatural = false;

    if profile.size < 100_000 {
        spectral_score -= 20.0;
        gaps = true;
    }
    if profile.size > 50_000_000 {
        spectral_score -= 15.0;
        unnatural = true;
    }
    if profile.ext == "wav" && profile.size < 500_000 {
        spectral_score -= 25.0;
        unnatural = true;
    }

    let mut score = 0.0;
    if unnatural {
        score += 25.0;
        features.push("unnatural frequency profile".to_string());
    }
    if gaps {
        score += 15.0;
        features.push("gaps in frequency spectrum".to_string());
    }
    if spectral_score < 70.0 {
        score += 20.0;
        features.push("degraded spectral score".to_string());
    }
    score
}

fn score_voice(profile: &AudioProfile, normalized: &str, features: &mut Vec<String>) -> f32 {
    let mut breathing = 100.0f32;
    let mut tone = 100.0f32;
    let mut natural_pauses = true;

    if TTS_KEYWORDS.iter().any(|kw| normalized.contains(kw)) {
        breathing -= 40.0;
        tone -= 35.0;
        natural_pauses = false;
    }
    if profile.duration_secs < 5.0 {
        breathing -= 20.0;
    }
    if profile.duration_secs > 300.0 {
        tone -= 15.0;
    }

    let mut score = 0.0;
    if breathing < 60.0 {
        score += 30.0;
        features.push("no audible breathing pattern".to_string());
    }
    if tone < 60.0 {
        score += 25.0;
        features.push("flat monotone delivery".to_string());
    }
    if !natural_pauses {
        score += 20.0;
        features.push("missing natural pauses".to_string());
    }
    score
}

fn score_editing(profile: &AudioProfile, normalized: &str, features: &mut Vec<String>) -> f32 {
    let mut edit = 0.0f32;
    let mut cut = 0.0f32;
    let mut compression = 0.0f32;

    if profile.ext == "mp3" && profile.size < 200_000 {
        edit += 25.0;
        compression += 30.0;
    }
    // Between a kilobyte and one second of CD audio: too short to be a recording
    if profile.ext == "wav" && profile.size > 1024 && profile.size < 176_400 {
        edit += 20.0;
        cut += 25.0;
    }
    if EDITING_KEYWORDS.iter().any(|kw| normalized.contains(kw)) {
        edit += 35.0;
        cut += 30.0;
    }
    if profile.size < 50_000 {
        cut += 20.0;
    }

    let mut score = 0.0;
    if edit > 30.0 {
        score += 35.0;
        features.push("editing traces".to_string());
    }
    if cut > 25.0 {
        score += 20.0;
        features.push("abrupt cut boundaries".to_string());
    }
    if compression > 30.0 {
        score += 15.0;
        features.push("aggressive recompression".to_string());
    }
    score
}

fn score_naturalness(profile: &AudioProfile, normalized: &str, features: &mut Vec<String>) -> f32 {
    let mut naturalness = 100.0f32;
    let mut robotic = 0.0f32;
    let mut emotional = 100.0f32;

    if TTS_KEYWORDS.iter().any(|kw| normalized.contains(kw)) {
        naturalness -= 50.0;
        robotic += 60.0;
        emotional -= 40.0;
    }
    if profile.ext == "mp3" && profile.bitrate_kbps > 0 && profile.bitrate_kbps < 64 {
        naturalness -= 20.0;
        robotic += 25.0;
    }
    if profile.size < 100_000 {
        naturalness -= 15.0;
        emotional -= 20.0;
    }

    let mut score = 0.0;
    if robotic > 40.0 {
        score += 40.0;
        features.push("robotic voice characteristics".to_string());
    }
    if naturalness < 50.0 {
        score += 30.0;
        features.push("low voice naturalness".to_string());
    }
    if emotional < 50.0 {
        score += 20.0;
        features.push("flat emotional range".to_string());
    }
    score
}
