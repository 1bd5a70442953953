//! Messages travelling over the channel.
//!
//! Two kinds of inbound body exist: a storage notification wrapped in a
//! pub/sub envelope (`Type: "Notification"`) and a segment work item
//! (`type: "video.processor.generate.fps"`). Both are parsed into the closed
//! [`InboundMessage`] union so routing is an exhaustive `match`.

use super::keys::{DecodeError, JobId};
use super::segments::SegmentWindow;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub const NOTIFICATION_TAG: &str = "Notification";
pub const SEGMENT_WORK_TAG: &str = "video.processor.generate.fps";

#[derive(Debug, Error)]
pub enum RouteError {
    #[error("No route registered for message type {0:?}")]
    UnknownRoute(String),

    #[error("Message has no type tag")]
    MissingTag,

    #[error("Malformed message body: {0}")]
    MalformedMessage(#[from] serde_json::Error),

    #[error(transparent)]
    Decode(#[from] DecodeError),
}

/// Discriminant of an inbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    JobNotification,
    SegmentWork,
}

impl MessageKind {
    pub fn from_tag(tag: &str) -> Result<Self, RouteError> {
        match tag {
            NOTIFICATION_TAG => Ok(MessageKind::JobNotification),
            SEGMENT_WORK_TAG => Ok(MessageKind::SegmentWork),
            other => Err(RouteError::UnknownRoute(other.to_string())),
        }
    }

    pub fn tag(&self) -> &'static str {
        match self {
            MessageKind::JobNotification => NOTIFICATION_TAG,
            MessageKind::SegmentWork => SEGMENT_WORK_TAG,
        }
    }
}

/// A segment work item as carried on the channel.
///
/// `key` is the original, still-encoded source key; workers decode it
/// themselves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SegmentWorkItem {
    pub bucket: String,
    pub key: String,
    pub start_time: u64,
    pub duration: u64,
    pub event_index: u32,
    pub total_events: u32,
    pub client_id: String,
    pub video_id: String,
}

impl SegmentWorkItem {
    pub fn new(bucket: &str, raw_key: &str, job: &JobId, window: &SegmentWindow) -> Self {
        Self {
            bucket: bucket.to_string(),
            key: raw_key.to_string(),
            start_time: window.start_time,
            duration: window.duration,
            event_index: window.index,
            total_events: window.total,
            client_id: job.client_id.clone(),
            video_id: job.video_id.clone(),
        }
    }

    pub fn job_id(&self) -> JobId {
        JobId::new(&self.client_id, &self.video_id)
    }

    /// The final segment of a job is extracted to the end of the source.
    pub fn is_last(&self) -> bool {
        self.event_index == self.total_events
    }
}

/// Outbound envelope for a segment work item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentWorkMessage {
    #[serde(rename = "type")]
    pub kind: String,
    pub data: SegmentWorkItem,
}

impl SegmentWorkMessage {
    pub fn new(data: SegmentWorkItem) -> Self {
        Self {
            kind: SEGMENT_WORK_TAG.to_string(),
            data,
        }
    }

    pub fn to_body(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Source object named by a storage notification. `key` is still encoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobNotification {
    pub bucket: String,
    pub key: String,
}

#[derive(Debug, Deserialize)]
struct PubSubEnvelope {
    #[serde(rename = "Message")]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StorageEvent {
    #[serde(rename = "Records", default)]
    records: Vec<StorageEventRecord>,
}

#[derive(Debug, Deserialize)]
struct StorageEventRecord {
    s3: StorageEntity,
}

#[derive(Debug, Deserialize)]
struct StorageEntity {
    bucket: NamedEntity,
    object: ObjectEntity,
}

#[derive(Debug, Deserialize)]
struct NamedEntity {
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ObjectEntity {
    key: Option<String>,
}

impl JobNotification {
    /// Extracts the source object from a pub/sub envelope whose `Message`
    /// field holds a storage event as a JSON string.
    pub fn from_envelope(envelope: &Value) -> Result<Self, RouteError> {
        let envelope: PubSubEnvelope = serde_json::from_value(envelope.clone())?;
        let message = envelope
            .message
            .ok_or(DecodeError::MissingField("Message"))?;
        let event: StorageEvent = serde_json::from_str(&message)?;
        let record = event
            .records
            .into_iter()
            .next()
            .ok_or(DecodeError::MissingField("Records"))?;

        let bucket = record
            .s3
            .bucket
            .name
            .filter(|name| !name.is_empty())
            .ok_or(DecodeError::MissingField("bucket"))?;
        let key = record
            .s3
            .object
            .key
            .filter(|key| !key.is_empty())
            .ok_or(DecodeError::MissingField("key"))?;

        Ok(Self { bucket, key })
    }

    /// Wraps this notification the way the storage service publishes it.
    pub fn to_envelope(&self) -> Value {
        let event = serde_json::json!({
            "Records": [{ "s3": { "bucket": { "name": self.bucket }, "object": { "key": self.key } } }]
        });
        serde_json::json!({ "Type": NOTIFICATION_TAG, "Message": event.to_string() })
    }
}

/// One inbound channel message, already classified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundMessage {
    JobNotification(JobNotification),
    SegmentWork(SegmentWorkItem),
}

impl InboundMessage {
    /// Parses a raw channel body. The tag is read from `type`, falling back
    /// to `Type` as set by the pub/sub envelope.
    pub fn parse(body: &str) -> Result<Self, RouteError> {
        let value: Value = serde_json::from_str(body)?;
        let tag = value
            .get("type")
            .and_then(Value::as_str)
            .or_else(|| value.get("Type").and_then(Value::as_str))
            .ok_or(RouteError::MissingTag)?;

        match MessageKind::from_tag(tag)? {
            MessageKind::JobNotification => {
                Ok(InboundMessage::JobNotification(JobNotification::from_envelope(&value)?))
            }
            MessageKind::SegmentWork => {
                let data = value.get("data").cloned().unwrap_or(Value::Null);
                Ok(InboundMessage::SegmentWork(serde_json::from_value(data)?))
            }
        }
    }

    pub fn kind(&self) -> MessageKind {
        match self {
            InboundMessage::JobNotification(_) => MessageKind::JobNotification,
            InboundMessage::SegmentWork(_) => MessageKind::SegmentWork,
        }
    }
}

/// What a handler returns on success. Failures are signalled by `Err`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HandlerResponse {
    pub status_code: u16,
    pub body: Value,
}

impl HandlerResponse {
    pub fn ok(body: Value) -> Self {
        Self {
            status_code: 200,
            body,
        }
    }
}
