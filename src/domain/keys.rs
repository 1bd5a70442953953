//! Object key handling: decoding notification keys, deriving job identity and
//! naming the artifacts produced per segment.

use std::path::Path;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Missing field in notification: {0}")]
    MissingField(&'static str),

    #[error("Key is not valid percent-encoding: {0}")]
    InvalidEncoding(String),

    #[error("Key {0:?} does not match <prefix>/<clientId>/<videoFile>")]
    UnexpectedLayout(String),

    #[error("Segment index {index} outside 1..={total}")]
    SegmentOutOfRange { index: u32, total: u32 },
}

/// The identity of a job, derived from its source key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JobId {
    pub client_id: String,
    pub video_id: String,
}

impl JobId {
    pub fn new(client_id: impl Into<String>, video_id: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            video_id: video_id.into(),
        }
    }

    /// Prefix under which every artifact of this job is uploaded.
    pub fn output_prefix(&self) -> String {
        format!("{}/{}", self.client_id, self.video_id)
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.client_id, self.video_id)
    }
}

/// Decodes a key as delivered in storage notifications: `+` stands for a
/// space, everything else is percent-encoded.
pub fn decode_key(raw: &str) -> Result<String, DecodeError> {
    if raw.is_empty() {
        return Err(DecodeError::MissingField("key"));
    }
    let spaced = raw.replace('+', " ");
    urlencoding::decode(&spaced)
        .map(|decoded| decoded.into_owned())
        .map_err(|_| DecodeError::InvalidEncoding(raw.to_string()))
}

/// Extracts `(clientId, videoId)` from a decoded key laid out as
/// `<prefix>/<clientId>/<videoFile>`. The video id is the file name without
/// its extension.
pub fn job_id_from_key(decoded: &str) -> Result<JobId, DecodeError> {
    let mut parts = decoded.split('/');
    let (_prefix, client_id, video_file) = match (parts.next(), parts.next(), parts.next()) {
        (Some(prefix), Some(client), Some(file)) => (prefix, client, file),
        _ => return Err(DecodeError::UnexpectedLayout(decoded.to_string())),
    };

    let video_id = Path::new(video_file)
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or_default();

    if client_id.is_empty() || video_id.is_empty() {
        return Err(DecodeError::UnexpectedLayout(decoded.to_string()));
    }

    Ok(JobId::new(client_id, video_id))
}

/// Base name of a segment artifact. `attempt` is unique per processing
/// attempt, so concurrent or repeated attempts of one segment never share a
/// local path or an uploaded key even within the same millisecond.
pub fn artifact_name(index: u32, start_time: u64, now_millis: i64, attempt: &Uuid) -> String {
    format!(
        "idx-{}-start-{}-now-{}-{}",
        index,
        start_time,
        now_millis,
        attempt.simple()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_plus_and_percent() {
        assert_eq!(decode_key("my+video%2Ffile.mp4").unwrap(), "my video/file.mp4");
    }

    #[test]
    fn test_decode_plain_key_unchanged() {
        assert_eq!(
            decode_key("uploads/client-1/video.mp4").unwrap(),
            "uploads/client-1/video.mp4"
        );
    }

    #[test]
    fn test_decode_encoded_plus_stays_plus() {
        assert_eq!(decode_key("a%2Bb").unwrap(), "a+b");
    }

    #[test]
    fn test_decode_empty_key() {
        assert_eq!(decode_key(""), Err(DecodeError::MissingField("key")));
    }

    #[test]
    fn test_decode_invalid_utf8() {
        assert!(matches!(
            decode_key("bad%FF%FEkey"),
            Err(DecodeError::InvalidEncoding(_))
        ));
    }

    #[test]
    fn test_job_id_from_key() {
        let id = job_id_from_key("uploads/client-42/my video.mp4").unwrap();
        assert_eq!(id, JobId::new("client-42", "my video"));
        assert_eq!(id.output_prefix(), "client-42/my video");
    }

    #[test]
    fn test_job_id_other_extension() {
        let id = job_id_from_key("raw/acme/clip.mov").unwrap();
        assert_eq!(id.video_id, "clip");
    }

    #[test]
    fn test_job_id_short_key() {
        assert!(matches!(
            job_id_from_key("client/video.mp4"),
            Err(DecodeError::UnexpectedLayout(_))
        ));
    }

    #[test]
    fn test_job_id_empty_client() {
        assert!(job_id_from_key("uploads//video.mp4").is_err());
    }

    #[test]
    fn test_artifact_name() {
        let attempt = Uuid::nil();
        assert_eq!(
            artifact_name(3, 120, 1700000000000, &attempt),
            "idx-3-start-120-now-1700000000000-00000000000000000000000000000000"
        );
    }

    #[test]
    fn test_artifact_name_differs_per_attempt_in_same_millisecond() {
        let first = artifact_name(1, 0, 1700000000000, &Uuid::new_v4());
        let second = artifact_name(1, 0, 1700000000000, &Uuid::new_v4());
        assert_ne!(first, second);
    }
}
