use crate::services::Verdict;
use crate::utils::filename::{self, ToolFingerprint};
use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use exif::{In, Tag, Value};
use image::GenericImageView;
use std::io::Cursor;
use std::path::Path;

const CONFIDENCE_CAP: f32 = 95.0;

/// Heuristic image scoring: EXIF anomalies, noise uniformity, edge
/// consistency, color histogram peaks, compression fingerprints and
/// filename signals. No single check decides; the sum does.
pub async fn analyze(path: &Path, original_name: &str) -> Result<Verdict> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("reading image {}", path.display()))?;

    let mut score: f32 = 0.0;
    let mut features: Vec<String> = Vec::new();
    let mut filename_flag = false;

    // Filename signals first: they are the cheapest and the strongest.
    if filename::has_ai_keyword(original_name) {
        score += 70.0;
        filename_flag = true;
        features.push("filename contains AI generation keyword".to_string());
    }
    if filename::matches_generated_pattern(original_name) {
        score += 60.0;
        features.push("auto-generated filename pattern".to_string());
    }
    match filename::tool_fingerprint(original_name) {
        Some(ToolFingerprint::Generative(tool, conf)) if conf > 70 => {
            score += 60.0;
            features.push(format!("filename references AI tool '{}'", tool));
        }
        Some(ToolFingerprint::Editor(tool, conf)) if conf > 70 => {
            score -= 20.0;
            features.push(format!("filename references editing tool '{}'", tool));
        }
        _ => {}
    }

    score += score_exif(&bytes, &mut features);

    if let Some(img) = image::io::Reader::new(Cursor::new(&bytes))
        .with_guessed_format()
        .ok()
        .and_then(|reader| reader.decode().ok())
    {
        let gray = img.to_luma8();

        if has_uniform_noise_cell(&gray) {
            score += 25.0;
            features.push("artificial noise pattern".to_string());
        }

        let flat_ratio = flat_block_percentage(&gray, 5.0);
        if flat_ratio > 50.0 {
            score += 20.0;
            features.push("multiple compression passes".to_string());
        }

        if edge_consistency(&gray) < 70.0 {
            score += 30.0;
            features.push("inconsistent edge rendering".to_string());
        }

        if color_histogram_peaks(&img) > 3 {
            score += 25.0;
            features.push("unnatural color distribution".to_string());
        }

        let fp = compression_fingerprint_score(&gray, &mut features);
        if fp > 40.0 {
            score += 0.4 * fp.min(CONFIDENCE_CAP);
        }
    }

    // Modern containers favored by generator UIs, when nothing else fired
    if features.is_empty() {
        let ext = Path::new(&filename::normalize(original_name))
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .unwrap_or_default();
        if matches!(ext.as_str(), "webp" | "avif" | "heic") {
            score += 10.0;
            features.push("modern container format common for generated images".to_string());
        }
    }

    let confidence = score.clamp(0.0, CONFIDENCE_CAP) as u8;
    let is_ai_generated = confidence > 40 || filename_flag;

    Ok(Verdict {
        is_ai_generated,
        confidence,
        explanation: explain(is_ai_generated, confidence, &features),
        detected_features: features,
        method: "image-heuristics",
    })
}

fn explain(is_ai: bool, confidence: u8, features: &[String]) -> String {
    if is_ai {
        format!(
            "Image flagged as likely AI-generated ({}% confidence): {}",
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

/// EXIF pass. Missing EXIF is itself a signal: cameras write it,
/// generators usually do not.
fn score_exif(bytes: &[u8], features: &mut Vec<String>) -> f32 {
    let exif = match exif::Reader::new().read_from_container(&mut Cursor::new(bytes)) {
        Ok(exif) => exif,
        Err(_) => {
            features.push("EXIF data missing".to_string());
            return 20.0;
        }
    };

    let mut score = 0.0;

    let datetime = exif_display(&exif, Tag::DateTime);
    let original = exif_display(&exif, Tag::DateTimeOriginal);
    if let (Some(modified), Some(created)) = (
        datetime.as_deref().and_then(parse_exif_datetime),
        original.as_deref().and_then(parse_exif_datetime),
    ) {
        if modified < created {
            score += 15.0;
            features.push("modification date precedes creation date".to_string());
        }
    }

    let make = exif_display(&exif, Tag::Make).unwrap_or_default().to_lowercase();
    let model = exif_display(&exif, Tag::Model)
        .unwrap_or_default()
        .to_lowercase();
    let camera = format!("{} {}", make, model);
    if ["ai camera", "generated", "synthetic", "virtual"]
        .iter()
        .any(|kw| camera.contains(kw))
    {
        score += 15.0;
        features.push("suspicious camera make/model".to_string());
    }

    if let Some(software) = exif_display(&exif, Tag::Software) {
        let software = software.to_lowercase();
        if ["photoshop", "gimp", "ai", "generated", "deepfake", "faceswap"]
            .iter()
            .any(|kw| software.contains(kw))
        {
            score += 15.0;
            features.push(format!("editing software tag: {}", software.trim()));
        }
    }

    if gps_is_null_island(&exif) {
        score += 15.0;
        features.push("GPS coordinates are exactly (0, 0)".to_string());
    }

    score
}

fn exif_display(exif: &exif::Exif, tag: Tag) -> Option<String> {
    let field = exif.get_field(tag, In::PRIMARY)?;
    Some(field.display_value().with_unit(exif).to_string())
}

fn parse_exif_datetime(s: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s.trim(), "%Y-%m-%d %H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(s.trim(), "%Y:%m:%d %H:%M:%S"))
        .ok()
}

fn gps_is_null_island(exif: &exif::Exif) -> bool {
    let zero = |tag: Tag| -> bool {
        exif.get_field(tag, In::PRIMARY)
            .map(|field| match &field.value {
                Value::Rational(parts) => {
                    !parts.is_empty() && parts.iter().all(|r| r.num == 0)
                }
                _ => false,
            })
            .unwrap_or(false)
    };
    zero(Tag::GPSLatitude) && zero(Tag::GPSLongitude)
}

/// Variance of luma values in one rectangular window.
fn window_variance(gray: &image::GrayImage, x0: u32, y0: u32, w: u32, h: u32) -> f32 {
    let mut sum = 0.0f32;
    let mut count = 0u32;
    for y in y0..(y0 + h).min(gray.height()) {
        for x in x0..(x0 + w).min(gray.width()) {
            sum += gray.get_pixel(x, y)[0] as f32;
            count += 1;
        }
    }
    if count == 0 {
        return 0.0;
    }
    let mean = sum / count as f32;
    let mut var = 0.0f32;
    for y in y0..(y0 + h).min(gray.height()) {
        for x in x0..(x0 + w).min(gray.width()) {
            let d = gray.get_pixel(x, y)[0] as f32 - mean;
            var += d * d;
        }
    }
    var / count as f32
}

/// Real sensor noise never leaves an 8x8 region of the frame with
/// near-zero variance; diffusion output regularly does.
fn has_uniform_noise_cell(gray: &image::GrayImage) -> bool {
    let (w, h) = gray.dimensions();
    if w < 8 || h < 8 {
        return false;
    }
    let cell_w = w / 8;
    let cell_h = h / 8;
    for gy in 0..8 {
        for gx in 0..8 {
            if window_variance(gray, gx * cell_w, gy * cell_h, cell_w, cell_h) < 10.0 {
                return true;
            }
        }
    }
    false
}

/// Percentage of 8x8 JPEG-style blocks whose variance is below the
/// threshold.
fn flat_block_percentage(gray: &image::GrayImage, threshold: f32) -> f32 {
    let (w, h) = gray.dimensions();
    if w < 8 || h < 8 {
        return 0.0;
    }
    let mut flat = 0u32;
    let mut total = 0u32;
    for y in (0..h - 7).step_by(8) {
        for x in (0..w - 7).step_by(8) {
            total += 1;
            if window_variance(gray, x, y, 8, 8) < threshold {
                flat += 1;
            }
        }
    }
    if total == 0 {
        0.0
    } else {
        flat as f32 / total as f32 * 100.0
    }
}

/// Gradient-based edge consistency over a sample window (percent).
fn edge_consistency(gray: &image::GrayImage) -> f32 {
    let (w, h) = gray.dimensions();
    if w < 3 || h < 3 {
        return 100.0;
    }
    let sample_w = w.min(100);
    let sample_h = h.min(100);

    let mut edges = 0u32;
    let mut inconsistent = 0u32;
    for y in 1..sample_h - 1 {
        for x in 1..sample_w - 1 {
            let dx = gray.get_pixel(x + 1, y)[0] as i32 - gray.get_pixel(x - 1, y)[0] as i32;
            let dy = gray.get_pixel(x, y + 1)[0] as i32 - gray.get_pixel(x, y - 1)[0] as i32;
            let magnitude = ((dx * dx + dy * dy) as f32).sqrt();
            if magnitude > 50.0 {
                edges += 1;
                if magnitude > 150.0 {
                    inconsistent += 1;
                }
            }
        }
    }
    if edges == 0 {
        return 100.0;
    }
    (edges - inconsistent) as f32 / edges as f32 * 100.0
}

/// Count histogram bins that tower over both neighbors; natural photos
/// have smooth channel histograms.
fn color_histogram_peaks(img: &image::DynamicImage) -> usize {
    let rgb = img.to_rgb8();
    let total = (rgb.width() * rgb.height()) as f32;
    if total == 0.0 {
        return 0;
    }

    let mut peaks = 0;
    for channel in 0..3 {
        let mut hist = [0u32; 256];
        for pixel in rgb.pixels() {
            hist[pixel[channel] as usize] += 1;
        }
        for i in 1..255 {
            let bin = hist[i] as f32;
            if bin > 3.0 * hist[i - 1] as f32
                && bin > 3.0 * hist[i + 1] as f32
                && bin > total * 0.05
            {
                peaks += 1;
            }
        }
    }
    peaks
}

/// Secondary fingerprint: extreme block variances, periodic repetition
/// and mirror symmetry. Contributes fractionally when its own score is
/// high enough to trust.
fn compression_fingerprint_score(gray: &image::GrayImage, features: &mut Vec<String>) -> f32 {
    let mut fp = 0.0f32;

    let (w, h) = gray.dimensions();
    if w >= 8 && h >= 8 {
        let mut extreme = 0u32;
        let mut total = 0u32;
        for y in (0..h - 7).step_by(8) {
            for x in (0..w - 7).step_by(8) {
                total += 1;
                let var = window_variance(gray, x, y, 8, 8);
                if var < 5.0 || var > 200.0 {
                    extreme += 1;
                }
            }
        }
        if total > 0 && extreme as f32 / total as f32 > 0.3 {
            fp += 30.0;
            features.push("extreme block variance distribution".to_string());
        }
    }

    if has_periodic_pattern(gray) {
        fp += 25.0;
        features.push("periodic pixel repetition".to_string());
    }

    if mirror_symmetry(gray) > 0.95 {
        fp += 20.0;
        features.push("near-perfect mirror symmetry".to_string());
    }

    fp
}

/// Segment a few rows and columns into 8-pixel runs and look for more
/// than 3 consecutive runs that are >=90% similar.
fn has_periodic_pattern(gray: &image::GrayImage) -> bool {
    let (w, h) = gray.dimensions();
    if w < 32 || h < 32 {
        return false;
    }

    let row_similar = |y: u32| -> bool {
        let segments: Vec<f32> = (0..w / 8)
            .map(|i| {
                let mut sum = 0.0;
                for x in i * 8..(i + 1) * 8 {
                    sum += gray.get_pixel(x, y)[0] as f32;
                }
                sum / 8.0
            })
            .collect();
        let mut repeats = 0;
        for pair in segments.windows(2) {
            let max = pair[0].max(pair[1]).max(1.0);
            if (pair[0] - pair[1]).abs() / max < 0.1 {
                repeats += 1;
                if repeats > 3 {
                    return true;
                }
            } else {
                repeats = 0;
            }
        }
        false
    };

    let rows_to_check = [h / 4, h / 2, 3 * h / 4];
    let mut hits = 0;
    for &y in &rows_to_check {
        if row_similar(y) {
            hits += 1;
        }
    }
    hits >= 2
}

/// Fraction of sampled pixel pairs that match across the vertical or
/// horizontal axis, whichever is higher.
fn mirror_symmetry(gray: &image::GrayImage) -> f32 {
    let (w, h) = gray.dimensions();
    if w < 2 || h < 2 {
        return 0.0;
    }

    let step_x = (w / 64).max(1);
    let step_y = (h / 64).max(1);

    let mut h_match = 0u32;
    let mut h_total = 0u32;
    for y in (0..h).step_by(step_y as usize) {
        for x in (0..w / 2).step_by(step_x as usize) {
            h_total += 1;
            let a = gray.get_pixel(x, y)[0] as i32;
            let b = gray.get_pixel(w - 1 - x, y)[0] as i32;
            if (a - b).abs() < 10 {
                h_match += 1;
            }
        }
    }

    let mut v_match = 0u32;
    let mut v_total = 0u32;
    for y in (0..h / 2).step_by(step_y as usize) {
        for x in (0..w).step_by(step_x as usize) {
            v_total += 1;
            let a = gray.get_pixel(x, y)[0] as i32;
            let b = gray.get_pixel(x, h - 1 - y)[0] as i32;
            if (a - b).abs() < 10 {
                v_match += 1;
            }
        }
    }

    let horizontal = if h_total > 0 {
        h_match as f32 / h_total as f32
    } else {
        0.0
    };
    let vertical = if v_total > 0 {
        v_match as f32 / v_total as f32
    } else {
        0.0
    };
    horizontal.max(vertical)
}

/// Downscale a working copy for the pixel passes so huge uploads do not
/// dominate analysis time. Returns the path of the copy.
pub async fn optimize_for_analysis(path: &Path, temp_dir: &Path) -> Result<std::path::PathBuf> {
    let bytes = tokio::fs::read(path).await?;
    let out = temp_dir.join(format!(
        "opt-{}.png",
        uuid::Uuid::new_v4().simple()
    ));

    let img = image::io::Reader::new(Cursor::new(&bytes))
        .with_guessed_format()?
        .decode()?;

    let (w, h) = img.dimensions();
    let resized = if w > 800 || h > 600 {
        img.thumbnail(800, 600)
    } else {
        img
    };

    let out_clone = out.clone();
    tokio::task::spawn_blocking(move || resized.save(&out_clone)).await??;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, GrayImage, Luma, Rgb, RgbImage};

    fn noisy_image(w: u32, h: u32) -> GrayImage {
        // Deterministic pseudo-noise, enough variance everywhere
        GrayImage::from_fn(w, h, |x, y| {
            Luma([((x * 31 + y * 17 + x * y) % 256) as u8])
        })
    }

    #[test]
    fn test_uniform_noise_cell_detected_on_flat_image() {
        let flat = GrayImage::from_pixel(64, 64, Luma([128]));
        assert!(has_uniform_noise_cell(&flat));
        assert!(!has_uniform_noise_cell(&noisy_image(64, 64)));
    }

    #[test]
    fn test_flat_block_percentage() {
        let flat = GrayImage::from_pixel(64, 64, Luma([50]));
        assert!(flat_block_percentage(&flat, 5.0) > 99.0);
        assert!(flat_block_percentage(&noisy_image(64, 64), 5.0) < 50.0);
    }

    #[test]
    fn test_mirror_symmetry() {
        let symmetric = GrayImage::from_fn(64, 64, |x, _| {
            let folded = if x < 32 { x } else { 63 - x };
            Luma([(folded * 4) as u8])
        });
        assert!(mirror_symmetry(&symmetric) > 0.95);
        assert!(mirror_symmetry(&noisy_image(64, 64)) < 0.95);
    }

    #[test]
    fn test_color_histogram_peaks_on_posterized_image() {
        // Four hard colors, each a spike next to empty bins
        let img = RgbImage::from_fn(64, 64, |x, y| {
            let c = match (x / 32, y / 32) {
                (0, 0) => [10, 10, 10],
                (0, 1) => [80, 80, 80],
                (1, 0) => [160, 160, 160],
                _ => [240, 240, 240],
            };
            Rgb(c)
        });
        assert!(color_histogram_peaks(&DynamicImage::ImageRgb8(img)) > 3);
    }

    #[test]
    fn test_parse_exif_datetime() {
        assert!(parse_exif_datetime("2023:05:01 10:20:30").is_some());
        assert!(parse_exif_datetime("2023-05-01 10:20:30").is_some());
        assert!(parse_exif_datetime("garbage").is_none());
    }

    #[tokio::test]
    async fn test_analyze_flags_ai_filename() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("midjourney_art.png");
        let img = DynamicImage::ImageLuma8(noisy_image(32, 32));
        img.save(&path).unwrap();

        let verdict = analyze(&path, "midjourney_art.png").await.unwrap();
        assert!(verdict.is_ai_generated);
        assert!(verdict.confidence > 40);
        assert!(
            verdict
                .detected_features
                .iter()
                .any(|f| f.contains("keyword") || f.contains("AI tool"))
        );
    }

    #[tokio::test]
    async fn test_optimize_for_analysis_downscales() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("big.png");
        DynamicImage::ImageLuma8(noisy_image(1600, 1200))
            .save(&src)
            .unwrap();

        let out = optimize_for_analysis(&src, dir.path()).await.unwrap();
        let optimized = image::open(&out).unwrap();
        assert!(optimized.width() <= 800);
        assert!(optimized.height() <= 600);
    }
}
