use once_cell::sync::Lazy;
use percent_encoding::percent_decode_str;
use regex::Regex;

/// Keywords that mark a filename as self-declared AI output. The Arabic
/// terms cover the generator UIs that name downloads in Arabic.
pub const AI_KEYWORDS: &[&str] = &[
    "generated",
    "ai",
    "artificial",
    "midjourney",
    "dalle",
    "dall-e",
    "stable",
    "diffusion",
    "gemini",
    "chatgpt",
    "gpt",
    "synthetic",
    "deepfake",
    "fake",
    "created",
    "made",
    "bot",
    "automatic",
    "render",
    "ذكاء",
    "اصطناعي",
    "مولد",
    "تركيب",
    "معدل",
    "مصطنع",
];

/// Tool name fragments and the confidence that the fragment really names
/// that tool, split by whether the tool generates or merely edits.
const AI_TOOLS: &[(&str, u8)] = &[
    ("midjourney", 95),
    ("dall-e", 95),
    ("dalle", 95),
    ("stable diffusion", 95),
    ("stable-diffusion", 95),
    ("leonardo", 90),
    ("firefly", 85),
    ("generated", 80),
    ("synthetic", 85),
];

const TRADITIONAL_TOOLS: &[(&str, u8)] = &[
    ("photoshop", 90),
    ("lightroom", 85),
    ("gimp", 80),
    ("canva", 75),
];

static GENERATED_NAME_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"generated.*image",
        r"image.*ai",
        r"_generated_",
        r"output_\d+",
        r"render_\d+",
        r"\w+_generated_\w+",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

/// Percent-decode a filename, lowercased. Upload paths routinely arrive
/// double-encoded, so decode again when the first pass changed something.
pub fn normalize(name: &str) -> String {
    let once = percent_decode_str(name).decode_utf8_lossy().into_owned();
    let decoded = if once != name {
        percent_decode_str(&once).decode_utf8_lossy().into_owned()
    } else {
        once
    };
    decoded.to_lowercase()
}

/// True when the decoded filename contains an explicit AI keyword.
pub fn has_ai_keyword(name: &str) -> bool {
    let normalized = normalize(name);
    AI_KEYWORDS.iter().any(|kw| normalized.contains(kw))
}

/// True when the name matches an auto-generated output pattern.
pub fn matches_generated_pattern(name: &str) -> bool {
    let normalized = normalize(name);
    GENERATED_NAME_PATTERNS
        .iter()
        .any(|re| re.is_match(&normalized))
}

pub enum ToolFingerprint {
    /// Name mentions a generative tool (tool, confidence)
    Generative(&'static str, u8),
    /// Name mentions a conventional editor (tool, confidence)
    Editor(&'static str, u8),
}

/// Look for a tool name embedded in the filename.
pub fn tool_fingerprint(name: &str) -> Option<ToolFingerprint> {
    let normalized = normalize(name);

    for &(tool, confidence) in AI_TOOLS {
        if normalized.contains(tool) {
            return Some(ToolFingerprint::Generative(tool, confidence));
        }
    }
    for &(tool, confidence) in TRADITIONAL_TOOLS {
        if normalized.contains(tool) {
            return Some(ToolFingerprint::Editor(tool, confidence));
        }
    }
    None
}
