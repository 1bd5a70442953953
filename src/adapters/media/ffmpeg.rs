//! Transcoder backed by the `ffprobe` / `ffmpeg` command line tools.

use crate::ports::media::{CommandRunner, FrameSpan, MediaError, Transcoder};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use uuid::Uuid;

const FRAME_PATTERN: &str = "frame_%05d.jpg";

/// ffprobe's complaint when the source was read but is not a media file.
const NOT_MEDIA_MARKER: &str = "Invalid data found when processing input";

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    format: Option<ProbeFormat>,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    duration: Option<Value>,
}

#[derive(Debug, Clone)]
pub struct FfmpegTranscoder<R> {
    runner: R,
    work_dir: PathBuf,
    frames_per_second: u32,
}

impl<R: CommandRunner> FfmpegTranscoder<R> {
    pub fn new(runner: R, work_dir: PathBuf, frames_per_second: u32) -> Self {
        Self {
            runner,
            work_dir,
            frames_per_second,
        }
    }

    fn extract_args(
        &self,
        source_url: &str,
        start_time: u64,
        span: FrameSpan,
        dir: &Path,
    ) -> Vec<String> {
        let mut args = vec![
            "-v".to_string(),
            "error".to_string(),
            "-ss".to_string(),
            start_time.to_string(),
            "-i".to_string(),
            source_url.to_string(),
        ];
        if let FrameSpan::Seconds(duration) = span {
            args.push("-t".to_string());
            args.push(duration.to_string());
        }
        args.push("-vf".to_string());
        args.push(format!("fps={}", self.frames_per_second));
        args.push(dir.join(FRAME_PATTERN).to_string_lossy().to_string());
        args
    }
}

/// Reads `format.duration` from ffprobe's JSON output. ffprobe prints the
/// duration as a string; a bare number is accepted too.
fn parse_duration(stdout: &[u8]) -> Option<f64> {
    let probe: ProbeOutput = serde_json::from_slice(stdout).ok()?;
    let duration = match probe.format?.duration? {
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        Value::Number(n) => n.as_f64()?,
        _ => return None,
    };
    (duration.is_finite() && duration >= 0.0).then_some(duration)
}

#[async_trait]
impl<R: CommandRunner> Transcoder for FfmpegTranscoder<R> {
    async fn probe_duration(&self, source_url: &str) -> Result<f64, MediaError> {
        let args: Vec<String> = [
            "-v",
            "error",
            "-show_entries",
            "format=duration",
            "-of",
            "json",
            source_url,
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();

        let output = self
            .runner
            .run("ffprobe", &args, None)
            .await
            .map_err(|e| MediaError::ProbeFailed {
                source_url: source_url.to_string(),
                reason: e.to_string(),
            })?;

        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        if !output.status.success() {
            if stderr.contains(NOT_MEDIA_MARKER) {
                return Err(MediaError::DurationUnavailable {
                    source_url: source_url.to_string(),
                    reason: stderr,
                });
            }
            return Err(MediaError::ProbeFailed {
                source_url: source_url.to_string(),
                reason: stderr,
            });
        }
        if !stderr.is_empty() {
            warn!(stderr = %stderr, "ffprobe reported errors");
        }

        parse_duration(&output.stdout).ok_or_else(|| MediaError::DurationUnavailable {
            source_url: source_url.to_string(),
            reason: "no format.duration in ffprobe output".to_string(),
        })
    }

    async fn extract_frames(
        &self,
        source_url: &str,
        start_time: u64,
        span: FrameSpan,
    ) -> Result<PathBuf, MediaError> {
        let dir = self.work_dir.join(format!("frames-{}", Uuid::new_v4()));
        tokio::fs::create_dir_all(&dir).await?;

        let args = self.extract_args(source_url, start_time, span, &dir);
        debug!(dir = %dir.display(), start_time, ?span, "Running ffmpeg");

        let output = self
            .runner
            .run("ffmpeg", &args, None)
            .await
            .map_err(|e| MediaError::TranscodeFailure(format!("failed to run ffmpeg: {}", e)))?;

        if !output.status.success() {
            return Err(MediaError::TranscodeFailure(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }

        let mut entries = tokio::fs::read_dir(&dir).await?;
        if entries.next_entry().await?.is_none() {
            return Err(MediaError::TranscodeFailure(format!(
                "ffmpeg produced no frames from {}s",
                start_time
            )));
        }

        Ok(dir)
    }
}
