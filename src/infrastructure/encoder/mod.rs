pub mod ffmpeg;
pub mod progress;
