pub mod audio_analysis;
pub mod cache;
pub mod cleanup;
pub mod detection;
pub mod image_analysis;
pub mod uploads;
pub mod video_analysis;

/// Outcome of one analyzer pass, before timing and file info are attached.
#[derive(Debug)]
pub struct Verdict {
    pub is_ai_generated: bool,
    pub confidence: u8,
    pub detected_features: Vec<String>,
    pub explanation: String,
    pub method: &'static str,
}
