pub mod ffmpeg;

pub use ffmpeg::{ExternalTranscode, FfmpegTranscoder};
