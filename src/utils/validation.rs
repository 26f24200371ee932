use crate::models::MediaKind;
use anyhow::{Result, anyhow};
use std::path::Path;

/// Allowed MIME types: images, video, audio only
pub const ALLOWED_MIME_TYPES: &[&str] = &[
    // Images
    "image/jpeg",
    "image/jpg",
    "image/png",
    "image/gif",
    "image/webp",
    "image/bmp",
    "image/avif",
    "image/heic",
    // Video
    "video/mp4",
    "video/mpeg",
    "video/webm",
    "video/ogg",
    "video/quicktime",
    "video/x-msvideo",
    "video/x-matroska",
    // Audio
    "audio/mpeg",
    "audio/mp3",
    "audio/wav",
    "audio/x-wav",
    "audio/ogg",
    "audio/flac",
    "audio/aac",
    "audio/webm",
    "audio/mp4",
];

/// Dangerous file extensions that should never be allowed
const BLOCKED_EXTENSIONS: &[&str] = &[
    "exe", "dll", "so", "dylib", "bin", "com", "bat", "cmd", "ps1", "sh", "bash", "js", "ts", "py",
    "rb", "php", "pl", "asp", "aspx", "jsp", "jar", "class", "html", "htm", "svg", "xml",
];

#[derive(Debug, Clone)]
pub struct ValidationError {
    pub code: &'static str,
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for ValidationError {}

/// Validates file size against maximum limit
pub fn validate_file_size(size: usize, max_size: usize) -> Result<()> {
    if size > max_size {
        return Err(anyhow!(ValidationError {
            code: "FILE_TOO_LARGE",
            message: format!(
                "File size {} bytes exceeds maximum allowed {} bytes ({} MB)",
                size,
                max_size,
                max_size / 1024 / 1024
            ),
        }));
    }
    Ok(())
}

/// Validates MIME type against the media allowlist and maps it to a kind
pub fn validate_mime_type(content_type: &str) -> Result<MediaKind> {
    let normalized = content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_lowercase();

    if !ALLOWED_MIME_TYPES
        .iter()
        .any(|&allowed| allowed == normalized)
    {
        return Err(anyhow!(ValidationError {
            code: "INVALID_MIME_TYPE",
            message: format!(
                "MIME type '{}' is not allowed. Only images, video, and audio are accepted.",
                content_type
            ),
        }));
    }

    MediaKind::from_mime(&normalized).ok_or_else(|| {
        anyhow!(ValidationError {
            code: "INVALID_MIME_TYPE",
            message: format!("MIME type '{}' is not a media type", content_type),
        })
    })
}

/// Sanitizes filename to prevent path traversal and injection attacks
pub fn sanitize_filename(filename: &str) -> Result<String> {
    let name = Path::new(filename)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("");

    if name.is_empty() {
        return Err(anyhow!(ValidationError {
            code: "INVALID_FILENAME",
            message: "Filename cannot be empty".to_string(),
        }));
    }

    if filename.contains("..") || filename.contains('/') || filename.contains('\\') {
        tracing::warn!("Path traversal attempt detected: {}", filename);
    }

    // Keep Unicode (Arabic filenames are common here), drop path separators
    // and shell-reserved characters
    let sanitized: String = name
        .chars()
        .map(|c| {
            if c.is_control()
                || c == '/'
                || c == '\\'
                || c == ':'
                || c == '*'
                || c == '?'
                || c == '"'
                || c == '<'
                || c == '>'
                || c == '|'
                || c == ';'
            {
                '_'
            } else {
                c
            }
        })
        .collect();

    // Limit length safely for UTF-8
    let sanitized = if sanitized.len() > 255 {
        let mut end = 255;
        while !sanitized.is_char_boundary(end) {
            end -= 1;
        }
        sanitized[..end].to_string()
    } else {
        sanitized
    };

    if let Some(ext) = Path::new(&sanitized).extension().and_then(|e| e.to_str()) {
        let ext_lower = ext.to_lowercase();
        if BLOCKED_EXTENSIONS.contains(&ext_lower.as_str()) {
            return Err(anyhow!(ValidationError {
                code: "BLOCKED_EXTENSION",
                message: format!("File extension '.{}' is not allowed", ext_lower),
            }));
        }
    }

    if sanitized.starts_with('.') {
        return Err(anyhow!(ValidationError {
            code: "HIDDEN_FILE",
            message: "Hidden files (starting with '.') are not allowed".to_string(),
        }));
    }

    Ok(sanitized)
}

/// Cross-checks the claimed MIME category against the magic bytes.
/// Formats without a reliable signature are allowed through.
pub fn verify_magic_bytes(header: &[u8], claimed_mime: &str) -> Result<()> {
    if header.is_empty() {
        return Err(anyhow!(ValidationError {
            code: "EMPTY_FILE",
            message: "File appears to be empty".to_string(),
        }));
    }

    if is_executable_content(header) {
        return Err(anyhow!(ValidationError {
            code: "EXECUTABLE_CONTENT",
            message: "File contains executable content which is not allowed".to_string(),
        }));
    }

    let claimed_category = claimed_mime.split('/').next().unwrap_or("");

    if let Some(detected) = infer::get(header) {
        let detected_category = detected.mime_type().split('/').next().unwrap_or("");
        // webm is video/* per infer but legitimately uploaded as audio/webm
        if detected_category != claimed_category && detected.mime_type() != "video/webm" {
            return Err(anyhow!(ValidationError {
                code: "MIME_MISMATCH",
                message: format!(
                    "File content looks like '{}' but was declared '{}'",
                    detected.mime_type(),
                    claimed_mime
                ),
            }));
        }
    } else {
        tracing::debug!(
            "No magic bytes match for claimed MIME type '{}', allowing anyway",
            claimed_mime
        );
    }

    Ok(())
}

/// Checks if file content appears to be executable
pub fn is_executable_content(header: &[u8]) -> bool {
    if header.len() < 4 {
        return false;
    }

    // ELF
    if header.starts_with(&[0x7F, 0x45, 0x4C, 0x46]) {
        return true;
    }

    // PE/COFF
    if header.starts_with(&[0x4D, 0x5A]) {
        return true;
    }

    // Mach-O
    if header.starts_with(&[0xFE, 0xED, 0xFA, 0xCE])
        || header.starts_with(&[0xFE, 0xED, 0xFA, 0xCF])
        || header.starts_with(&[0xCE, 0xFA, 0xED, 0xFE])
        || header.starts_with(&[0xCF, 0xFA, 0xED, 0xFE])
    {
        return true;
    }

    // Shebang
    if header.starts_with(b"#!") {
        return true;
    }

    false
}

/// Full validation pipeline for uploaded files
pub fn validate_upload(
    filename: &str,
    content_type: Option<&str>,
    size: usize,
    header: &[u8],
    max_size: usize,
) -> Result<(String, MediaKind)> {
    validate_file_size(size, max_size)?;

    let sanitized_filename = sanitize_filename(filename)?;

    let mime = content_type.unwrap_or("application/octet-stream");
    let kind = validate_mime_type(mime)?;

    verify_magic_bytes(header, mime)?;

    Ok((sanitized_filename, kind))
}
