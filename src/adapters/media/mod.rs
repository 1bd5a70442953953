//! External media tools: frame extraction and archiving.

pub mod ffmpeg;
pub mod process;
pub mod zip;

pub use ffmpeg::FfmpegTranscoder;
pub use process::TokioCommandRunner;
pub use zip::ZipArchiver;
