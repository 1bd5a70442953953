//! Fan-out of a new job into one channel message per segment.

use crate::application::router::{HandlerError, NotificationHandler};
use crate::domain::keys::{decode_key, job_id_from_key, DecodeError, JobId};
use crate::domain::messages::{HandlerResponse, JobNotification, SegmentWorkItem, SegmentWorkMessage};
use crate::domain::segments::{segment, TooManySegments};
use crate::ports::media::{MediaError, Transcoder};
use crate::ports::queue::{Channel, ChannelError};
use crate::ports::storage::{ObjectStore, StorageError};
use crate::ports::tracker::{CompletionTracker, TrackerError};
use async_trait::async_trait;
use serde_json::json;
use std::num::NonZeroU64;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Media(#[from] MediaError),

    #[error(transparent)]
    Tracker(#[from] TrackerError),

    #[error(transparent)]
    Segmentation(#[from] TooManySegments),

    #[error("Failed to build segment messages: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Failed to emit segment {index}/{total}: {source}")]
    Emit {
        index: u32,
        total: u32,
        #[source]
        source: ChannelError,
    },
}

impl DispatchError {
    pub fn is_retryable(&self) -> bool {
        match self {
            DispatchError::Decode(_)
            | DispatchError::Segmentation(_)
            | DispatchError::Serialization(_) => false,
            DispatchError::Media(e) => e.is_retryable(),
            DispatchError::Storage(_) | DispatchError::Tracker(_) | DispatchError::Emit { .. } => true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DispatchSettings {
    pub window: NonZeroU64,
    pub presign_expiry: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchSummary {
    pub job: JobId,
    pub total_segments: u32,
}

pub struct DispatcherService<S, C, T, M> {
    store: S,
    channel: C,
    tracker: T,
    transcoder: M,
    settings: DispatchSettings,
}

impl<S, C, T, M> DispatcherService<S, C, T, M>
where
    S: ObjectStore,
    C: Channel,
    T: CompletionTracker,
    M: Transcoder,
{
    pub fn new(store: S, channel: C, tracker: T, transcoder: M, settings: DispatchSettings) -> Self {
        Self {
            store,
            channel,
            tracker,
            transcoder,
            settings,
        }
    }

    /// Splits the notified source into segments and emits one work message
    /// per segment, in index order.
    ///
    /// Everything that can fail before the first emission (decoding,
    /// presigning, probing, counter creation, serialization) is done up front,
    /// so such failures never leave a partial fan-out behind.
    pub async fn dispatch(&self, notification: &JobNotification) -> Result<DispatchSummary, DispatchError> {
        let JobNotification { bucket, key } = notification;
        if bucket.is_empty() {
            return Err(DecodeError::MissingField("bucket").into());
        }

        let decoded_key = decode_key(key)?;
        let job = job_id_from_key(&decoded_key)?;
        info!(bucket = %bucket, key = %decoded_key, job = %job, "Dispatching job");

        let source_url = self
            .store
            .presign_get(bucket, &decoded_key, self.settings.presign_expiry)
            .await?;
        let total_duration = self.transcoder.probe_duration(&source_url).await?;
        let windows = segment(total_duration, self.settings.window)?;
        info!(job = %job, total_duration, segments = windows.len(), "Video duration retrieved");

        if windows.is_empty() {
            info!(job = %job, "Zero-length source, nothing to dispatch");
            return Ok(DispatchSummary {
                job,
                total_segments: 0,
            });
        }

        match self.tracker.create(&job).await {
            Ok(_) => info!(job = %job, "Completion counter created"),
            Err(TrackerError::AlreadyExists(_)) => {
                warn!(job = %job, "Completion counter already exists, notification was redelivered")
            }
            Err(e) => return Err(e.into()),
        }

        let bodies = windows
            .iter()
            .map(|window| SegmentWorkMessage::new(SegmentWorkItem::new(bucket, key, &job, window)).to_body())
            .collect::<Result<Vec<_>, _>>()?;

        let total = windows.len() as u32;
        for (window, body) in windows.iter().zip(bodies) {
            self.channel
                .publish(body)
                .await
                .map_err(|source| DispatchError::Emit {
                    index: window.index,
                    total,
                    source,
                })?;
            info!(
                job = %job,
                segment_index = window.index,
                start_time = window.start_time,
                duration = window.duration,
                "Segment emitted"
            );
        }

        Ok(DispatchSummary {
            job,
            total_segments: total,
        })
    }
}

#[async_trait]
impl<S, C, T, M> NotificationHandler for DispatcherService<S, C, T, M>
where
    S: ObjectStore,
    C: Channel,
    T: CompletionTracker,
    M: Transcoder,
{
    async fn handle_notification(&self, notification: JobNotification) -> Result<HandlerResponse, HandlerError> {
        let summary = self.dispatch(&notification).await?;
        Ok(HandlerResponse::ok(json!({
            "message": "S3 notification processed successfully",
            "clientId": summary.job.client_id,
            "videoId": summary.job.video_id,
            "totalSegments": summary.total_segments,
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::messages::{InboundMessage, SEGMENT_WORK_TAG};
    use crate::ports::media::MockTranscoder;
    use crate::ports::queue::MockChannel;
    use crate::ports::storage::MockObjectStore;
    use crate::ports::tracker::{Counter, MockCompletionTracker};
    use mockall::Sequence;
    use std::sync::{Arc, Mutex};

    type Dispatcher = DispatcherService<MockObjectStore, MockChannel, MockCompletionTracker, MockTranscoder>;

    fn settings() -> DispatchSettings {
        DispatchSettings {
            window: NonZeroU64::new(60).unwrap(),
            presign_expiry: Duration::from_secs(300),
        }
    }

    fn notification(key: &str) -> JobNotification {
        JobNotification {
            bucket: "videos".into(),
            key: key.into(),
        }
    }

    fn presigning_store() -> MockObjectStore {
        let mut store = MockObjectStore::new();
        store
            .expect_presign_get()
            .returning(|bucket, key, _| Ok(format!("https://{}/{}?sig", bucket, key)));
        store
    }

    fn probing(duration: f64) -> MockTranscoder {
        let mut transcoder = MockTranscoder::new();
        transcoder
            .expect_probe_duration()
            .returning(move |_| Ok(duration));
        transcoder
    }

    fn creating_tracker() -> MockCompletionTracker {
        let mut tracker = MockCompletionTracker::new();
        tracker.expect_create().times(1).returning(|job| {
            Ok(Counter {
                job: job.clone(),
                count: 0,
            })
        });
        tracker
    }

    fn recording_channel() -> (MockChannel, Arc<Mutex<Vec<String>>>) {
        let sent = Arc::new(Mutex::new(Vec::new()));
        let sink = sent.clone();
        let mut channel = MockChannel::new();
        channel.expect_publish().returning(move |body| {
            sink.lock().unwrap().push(body);
            Ok(())
        });
        (channel, sent)
    }

    fn sent_items(sent: &Arc<Mutex<Vec<String>>>) -> Vec<SegmentWorkItem> {
        sent.lock()
            .unwrap()
            .iter()
            .map(|body| match InboundMessage::parse(body).unwrap() {
                InboundMessage::SegmentWork(item) => item,
                other => panic!("unexpected message {:?}", other),
            })
            .collect()
    }

    #[tokio::test]
    async fn test_dispatch_emits_one_message_per_segment_in_order() {
        let (channel, sent) = recording_channel();
        let mut store = MockObjectStore::new();
        store
            .expect_presign_get()
            .withf(|bucket, key, expiry| {
                bucket == "videos" && key == "uploads/acme/my clip.mp4" && *expiry == Duration::from_secs(300)
            })
            .times(1)
            .returning(|_, _, _| Ok("https://signed".to_string()));
        let mut transcoder = MockTranscoder::new();
        transcoder
            .expect_probe_duration()
            .withf(|url| url == "https://signed")
            .times(1)
            .returning(|_| Ok(125.0));

        let dispatcher: Dispatcher =
            DispatcherService::new(store, channel, creating_tracker(), transcoder, settings());
        let summary = dispatcher
            .dispatch(&notification("uploads/acme/my+clip.mp4"))
            .await
            .unwrap();

        assert_eq!(summary.job, JobId::new("acme", "my clip"));
        assert_eq!(summary.total_segments, 3);

        let items = sent_items(&sent);
        let windows: Vec<(u64, u64, u32, u32)> = items
            .iter()
            .map(|i| (i.start_time, i.duration, i.event_index, i.total_events))
            .collect();
        assert_eq!(windows, vec![(0, 60, 1, 3), (60, 60, 2, 3), (120, 5, 3, 3)]);
        for item in &items {
            // The raw key travels undecoded.
            assert_eq!(item.key, "uploads/acme/my+clip.mp4");
            assert_eq!(item.bucket, "videos");
            assert_eq!(item.client_id, "acme");
            assert_eq!(item.video_id, "my clip");
        }
        let first: serde_json::Value = serde_json::from_str(&sent.lock().unwrap()[0]).unwrap();
        assert_eq!(first["type"], SEGMENT_WORK_TAG);
    }

    #[tokio::test]
    async fn test_counter_is_created_before_emission() {
        let mut seq = Sequence::new();
        let mut tracker = MockCompletionTracker::new();
        tracker
            .expect_create()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|job| Ok(Counter { job: job.clone(), count: 0 }));
        let mut channel = MockChannel::new();
        channel
            .expect_publish()
            .times(2)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));

        let dispatcher: Dispatcher =
            DispatcherService::new(presigning_store(), channel, tracker, probing(65.8), settings());
        let summary = dispatcher.dispatch(&notification("u/acme/clip.mp4")).await.unwrap();
        assert_eq!(summary.total_segments, 2);
    }

    #[tokio::test]
    async fn test_existing_counter_is_tolerated() {
        let (channel, sent) = recording_channel();
        let mut tracker = MockCompletionTracker::new();
        tracker
            .expect_create()
            .returning(|job| Err(TrackerError::AlreadyExists(job.clone())));

        let dispatcher: Dispatcher =
            DispatcherService::new(presigning_store(), channel, tracker, probing(30.0), settings());
        let summary = dispatcher.dispatch(&notification("u/acme/clip.mp4")).await.unwrap();
        assert_eq!(summary.total_segments, 1);
        assert_eq!(sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_tracker_backend_failure_aborts_before_emission() {
        let mut channel = MockChannel::new();
        channel.expect_publish().times(0);
        let mut tracker = MockCompletionTracker::new();
        tracker
            .expect_create()
            .returning(|_| Err(TrackerError::Backend("throttled".into())));

        let dispatcher: Dispatcher =
            DispatcherService::new(presigning_store(), channel, tracker, probing(300.0), settings());
        let err = dispatcher.dispatch(&notification("u/acme/clip.mp4")).await.unwrap_err();
        assert!(matches!(err, DispatchError::Tracker(TrackerError::Backend(_))));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_zero_duration_is_a_no_op() {
        let mut channel = MockChannel::new();
        channel.expect_publish().times(0);
        let mut tracker = MockCompletionTracker::new();
        tracker.expect_create().times(0);

        let dispatcher: Dispatcher =
            DispatcherService::new(presigning_store(), channel, tracker, probing(0.0), settings());
        let summary = dispatcher.dispatch(&notification("u/acme/clip.mp4")).await.unwrap();
        assert_eq!(summary.total_segments, 0);
    }

    #[tokio::test]
    async fn test_absurd_duration_emits_nothing() {
        let mut channel = MockChannel::new();
        channel.expect_publish().times(0);
        let mut tracker = MockCompletionTracker::new();
        tracker.expect_create().times(0);

        let dispatcher: Dispatcher =
            DispatcherService::new(presigning_store(), channel, tracker, probing(1e15), settings());
        let err = dispatcher.dispatch(&notification("u/acme/clip.mp4")).await.unwrap_err();
        assert!(matches!(err, DispatchError::Segmentation(_)));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_duration_failure_emits_nothing() {
        let mut channel = MockChannel::new();
        channel.expect_publish().times(0);
        let mut tracker = MockCompletionTracker::new();
        tracker.expect_create().times(0);
        let mut transcoder = MockTranscoder::new();
        transcoder.expect_probe_duration().returning(|url| {
            Err(MediaError::DurationUnavailable {
                source_url: url.to_string(),
                reason: "not a media file".into(),
            })
        });

        let dispatcher: Dispatcher =
            DispatcherService::new(presigning_store(), channel, tracker, transcoder, settings());
        let err = dispatcher.dispatch(&notification("u/acme/clip.mp4")).await.unwrap_err();
        assert!(matches!(err, DispatchError::Media(_)));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_presign_failure_emits_nothing() {
        let mut store = MockObjectStore::new();
        store.expect_presign_get().returning(|bucket, key, _| {
            Err(StorageError::PresignFailed {
                bucket: bucket.to_string(),
                key: key.to_string(),
                reason: "no credentials".into(),
            })
        });
        let mut transcoder = MockTranscoder::new();
        transcoder.expect_probe_duration().times(0);
        let mut channel = MockChannel::new();
        channel.expect_publish().times(0);

        let dispatcher: Dispatcher =
            DispatcherService::new(store, channel, MockCompletionTracker::new(), transcoder, settings());
        let err = dispatcher.dispatch(&notification("u/acme/clip.mp4")).await.unwrap_err();
        assert!(matches!(err, DispatchError::Storage(_)));
    }

    #[tokio::test]
    async fn test_malformed_key_is_not_retryable() {
        let mut store = MockObjectStore::new();
        store.expect_presign_get().times(0);

        let dispatcher: Dispatcher = DispatcherService::new(
            store,
            MockChannel::new(),
            MockCompletionTracker::new(),
            MockTranscoder::new(),
            settings(),
        );
        let err = dispatcher.dispatch(&notification("just-a-file.mp4")).await.unwrap_err();
        assert!(matches!(err, DispatchError::Decode(DecodeError::UnexpectedLayout(_))));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_publish_failure_reports_segment() {
        let mut channel = MockChannel::new();
        let mut calls = 0;
        channel.expect_publish().times(2).returning(move |_| {
            calls += 1;
            if calls == 2 {
                Err(ChannelError::PublishFailed("throttled".into()))
            } else {
                Ok(())
            }
        });

        let dispatcher: Dispatcher =
            DispatcherService::new(presigning_store(), channel, creating_tracker(), probing(180.0), settings());
        let err = dispatcher.dispatch(&notification("u/acme/clip.mp4")).await.unwrap_err();
        assert!(matches!(err, DispatchError::Emit { index: 2, total: 3, .. }));
    }

    #[tokio::test]
    async fn test_handler_response() {
        let (channel, _sent) = recording_channel();
        let dispatcher: Dispatcher =
            DispatcherService::new(presigning_store(), channel, creating_tracker(), probing(61.0), settings());
        let response = dispatcher
            .handle_notification(notification("u/acme/clip.mp4"))
            .await
            .unwrap();
        assert_eq!(response.status_code, 200);
        assert_eq!(response.body["totalSegments"], 2);
        assert_eq!(response.body["message"], "S3 notification processed successfully");
    }
}
