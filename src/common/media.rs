use serde::Serialize;
use std::path::Path;
use utoipa::ToSchema;

pub const VIDEO_EXTENSIONS: [&str; 6] = ["mp4", "mov", "avi", "mkv", "webm", "flv"];
pub const AUDIO_EXTENSIONS: [&str; 6] = ["mp3", "aac", "wav", "flac", "ogg", "m4a"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Video,
    Audio,
}

impl MediaKind {
    /// Classifies a file by its extension. `None` means unsupported.
    pub fn from_filename(filename: &str) -> Option<Self> {
        let ext = extension(filename)?.to_ascii_lowercase();

        if VIDEO_EXTENSIONS.contains(&ext.as_str()) {
            Some(MediaKind::Video)
        } else if AUDIO_EXTENSIONS.contains(&ext.as_str()) {
            Some(MediaKind::Audio)
        } else {
            None
        }
    }

    /// Container extension of the compressed output.
    pub fn output_extension(&self) -> &'static str {
        match self {
            MediaKind::Video => "mp4",
            MediaKind::Audio => "mp3",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Video => "video",
            MediaKind::Audio => "audio",
        }
    }
}

/// The extension of `filename` as written by the client (case preserved).
pub fn extension(filename: &str) -> Option<&str> {
    Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty())
}

/// Rejects empty names and anything that could escape a flat directory.
pub fn is_safe_filename(filename: &str) -> bool {
    !filename.trim().is_empty()
        && !filename.contains("..")
        && !filename.contains('/')
        && !filename.contains('\\')
}
