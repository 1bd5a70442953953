//! Per-segment processing: presign, extract, archive, upload, count.

use crate::application::router::{HandlerError, SegmentHandler};
use crate::domain::keys::{artifact_name, decode_key, DecodeError, JobId};
use crate::domain::messages::{HandlerResponse, SegmentWorkItem};
use crate::ports::media::{Archiver, FrameSpan, MediaError, Transcoder};
use crate::ports::storage::{ObjectStore, StorageError};
use crate::ports::tracker::CompletionTracker;
use async_trait::async_trait;
use serde_json::json;
use std::fmt;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

const ARCHIVE_CONTENT_TYPE: &str = "application/zip";

/// Furthest point a segment reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SegmentStage {
    Started,
    PresignedUrlObtained,
    FramesExtracted,
    Archived,
    Uploaded,
    TrackerUpdated,
}

impl fmt::Display for SegmentStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SegmentStage::Started => "started",
            SegmentStage::PresignedUrlObtained => "presigned_url_obtained",
            SegmentStage::FramesExtracted => "frames_extracted",
            SegmentStage::Archived => "archived",
            SegmentStage::Uploaded => "uploaded",
            SegmentStage::TrackerUpdated => "tracker_updated",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum SegmentCause {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Media(#[from] MediaError),
}

/// A segment that failed, with the last stage it completed.
#[derive(Debug, Error)]
#[error("Segment {index}/{total} of {job} failed after stage {stage}: {cause}")]
pub struct SegmentFailure {
    pub job: JobId,
    pub index: u32,
    pub total: u32,
    pub stage: SegmentStage,
    #[source]
    pub cause: SegmentCause,
}

impl SegmentFailure {
    pub fn is_retryable(&self) -> bool {
        match &self.cause {
            SegmentCause::Decode(_) => false,
            SegmentCause::Storage(_) => true,
            SegmentCause::Media(e) => e.is_retryable(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentReport {
    pub job: JobId,
    pub index: u32,
    pub artifact_key: String,
    pub stage: SegmentStage,
    pub tracker_updated: bool,
}

#[derive(Debug, Clone)]
pub struct WorkerSettings {
    pub frames_bucket: String,
    pub presign_expiry: Duration,
}

pub struct SegmentWorker<S, T, A, K> {
    store: S,
    transcoder: T,
    archiver: A,
    tracker: K,
    settings: WorkerSettings,
}

impl<S, T, A, K> SegmentWorker<S, T, A, K>
where
    S: ObjectStore,
    T: Transcoder,
    A: Archiver,
    K: CompletionTracker,
{
    pub fn new(store: S, transcoder: T, archiver: A, tracker: K, settings: WorkerSettings) -> Self {
        Self {
            store,
            transcoder,
            archiver,
            tracker,
            settings,
        }
    }

    pub async fn process(&self, item: &SegmentWorkItem) -> Result<SegmentReport, SegmentFailure> {
        let job = item.job_id();
        let mut stage = SegmentStage::Started;
        let fail = |stage: SegmentStage, cause: SegmentCause| SegmentFailure {
            job: job.clone(),
            index: item.event_index,
            total: item.total_events,
            stage,
            cause,
        };

        if item.event_index == 0 || item.event_index > item.total_events {
            return Err(fail(
                stage,
                DecodeError::SegmentOutOfRange {
                    index: item.event_index,
                    total: item.total_events,
                }
                .into(),
            ));
        }
        info!(
            job = %job,
            segment_index = item.event_index,
            total_segments = item.total_events,
            start_time = item.start_time,
            "Processing segment"
        );

        let decoded_key = decode_key(&item.key).map_err(|e| fail(stage, e.into()))?;
        let source_url = self
            .store
            .presign_get(&item.bucket, &decoded_key, self.settings.presign_expiry)
            .await
            .map_err(|e| fail(stage, e.into()))?;
        stage = SegmentStage::PresignedUrlObtained;

        let span = if item.is_last() {
            FrameSpan::ToEnd
        } else {
            FrameSpan::Seconds(item.duration)
        };
        let frames_dir = self
            .transcoder
            .extract_frames(&source_url, item.start_time, span)
            .await
            .map_err(|e| fail(stage, e.into()))?;
        stage = SegmentStage::FramesExtracted;
        info!(job = %job, segment_index = item.event_index, dir = %frames_dir.display(), "Frames extracted");

        let name = artifact_name(
            item.event_index,
            item.start_time,
            chrono::Utc::now().timestamp_millis(),
            &Uuid::new_v4(),
        );
        let archive_path = self
            .archiver
            .archive(&frames_dir, &name)
            .await
            .map_err(|e| fail(stage, e.into()))?;
        stage = SegmentStage::Archived;

        let artifact_key = format!("{}/{}.zip", job.output_prefix(), name);
        self.store
            .upload(&archive_path, &self.settings.frames_bucket, &artifact_key, ARCHIVE_CONTENT_TYPE)
            .await
            .map_err(|e| fail(stage, e.into()))?;
        stage = SegmentStage::Uploaded;
        info!(job = %job, segment_index = item.event_index, artifact_key = %artifact_key, "Artifact uploaded");

        // The artifact is durable at this point; a lost increment only skews
        // the progress count.
        let tracker_updated = match self.tracker.increment(&job).await {
            Ok(()) => {
                stage = SegmentStage::TrackerUpdated;
                true
            }
            Err(e) => {
                error!(job = %job, segment_index = item.event_index, error = %e, "Failed to update completion counter");
                false
            }
        };

        cleanup(&frames_dir, &archive_path).await;

        Ok(SegmentReport {
            job,
            index: item.event_index,
            artifact_key,
            stage,
            tracker_updated,
        })
    }
}

async fn cleanup(frames_dir: &Path, archive_path: &Path) {
    if let Err(e) = tokio::fs::remove_dir_all(frames_dir).await {
        warn!(dir = %frames_dir.display(), error = %e, "Failed to remove frames directory");
    }
    if let Err(e) = tokio::fs::remove_file(archive_path).await {
        warn!(path = %archive_path.display(), error = %e, "Failed to remove archive");
    }
}

#[async_trait]
impl<S, T, A, K> SegmentHandler for SegmentWorker<S, T, A, K>
where
    S: ObjectStore,
    T: Transcoder,
    A: Archiver,
    K: CompletionTracker,
{
    async fn handle_segment(&self, item: SegmentWorkItem) -> Result<HandlerResponse, HandlerError> {
        let report = self.process(&item).await?;
        Ok(HandlerResponse::ok(json!({
            "message": "Segment processed successfully",
            "clientId": report.job.client_id,
            "videoId": report.job.video_id,
            "eventIndex": report.index,
            "artifactKey": report.artifact_key,
            "trackerUpdated": report.tracker_updated,
        })))
    }
}
