//! Dispatch of parsed channel messages to their handler.

use crate::application::dispatcher::DispatchError;
use crate::application::worker::SegmentFailure;
use crate::domain::messages::{HandlerResponse, InboundMessage, JobNotification, RouteError, SegmentWorkItem};
use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum HandlerError {
    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error(transparent)]
    Segment(#[from] SegmentFailure),

    #[error(transparent)]
    Route(#[from] RouteError),
}

impl HandlerError {
    /// Whether redelivering the same message could succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            HandlerError::Dispatch(e) => e.is_retryable(),
            HandlerError::Segment(e) => e.is_retryable(),
            HandlerError::Route(_) => false,
        }
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NotificationHandler: Send + Sync {
    async fn handle_notification(&self, notification: JobNotification) -> Result<HandlerResponse, HandlerError>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SegmentHandler: Send + Sync {
    async fn handle_segment(&self, item: SegmentWorkItem) -> Result<HandlerResponse, HandlerError>;
}

/// Maps each message kind to exactly one handler.
pub struct MessageRouter<N, S> {
    notifications: N,
    segments: S,
}

impl<N, S> MessageRouter<N, S>
where
    N: NotificationHandler,
    S: SegmentHandler,
{
    pub fn new(notifications: N, segments: S) -> Self {
        Self {
            notifications,
            segments,
        }
    }

    pub async fn dispatch(&self, message: InboundMessage) -> Result<HandlerResponse, HandlerError> {
        debug!(kind = message.kind().tag(), "Routing message");
        match message {
            InboundMessage::JobNotification(notification) => {
                self.notifications.handle_notification(notification).await
            }
            InboundMessage::SegmentWork(item) => self.segments.handle_segment(item).await,
        }
    }

    /// Parses a raw body and routes it. Unknown tags fail without invoking
    /// any handler.
    pub async fn route(&self, body: &str) -> Result<HandlerResponse, HandlerError> {
        let message = InboundMessage::parse(body)?;
        self.dispatch(message).await
    }
}
