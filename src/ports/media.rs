use async_trait::async_trait;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Output;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MediaError {
    /// The probe could not be run at all (network, missing binary).
    #[error("Duration probe failed for {source_url}: {reason}")]
    ProbeFailed { source_url: String, reason: String },

    /// The probe ran but the source reported no usable duration.
    #[error("Duration unavailable for {source_url}: {reason}")]
    DurationUnavailable { source_url: String, reason: String },

    #[error("Frame extraction failed: {0}")]
    TranscodeFailure(String),

    #[error("Archive failed: {0}")]
    ArchiveFailure(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl MediaError {
    pub fn is_retryable(&self) -> bool {
        !matches!(self, MediaError::DurationUnavailable { .. })
    }
}

/// How much of the source to extract, starting from the segment's offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameSpan {
    Seconds(u64),
    ToEnd,
}

/// Runs an external program to completion.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, program: &str, args: &[String], current_dir: Option<PathBuf>)
        -> io::Result<Output>;
}

/// Frame extraction capability.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transcoder: Send + Sync {
    /// Total duration of the source in seconds
    async fn probe_duration(&self, source_url: &str) -> Result<f64, MediaError>;

    /// Extract still frames into a fresh directory and return it
    async fn extract_frames(
        &self,
        source_url: &str,
        start_time: u64,
        span: FrameSpan,
    ) -> Result<PathBuf, MediaError>;
}

/// Compresses a directory into a single artifact.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Archiver: Send + Sync {
    /// Archive `dir` into `<work dir>/<name>.zip` and return that path
    async fn archive(&self, dir: &Path, name: &str) -> Result<PathBuf, MediaError>;
}
