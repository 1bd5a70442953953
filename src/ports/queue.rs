use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("Publish failed: {0}")]
    PublishFailed(String),

    #[error("Receive failed: {0}")]
    ReceiveFailed(String),

    #[error("Ack failed: {0}")]
    AckFailed(String),
}

/// A message handed out by the channel, to be acked once processed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub body: String,
    /// Opaque handle identifying this particular receive
    pub receipt: String,
}

/// At-least-once, unordered message channel.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Channel: Send + Sync {
    /// Publish one message body
    async fn publish(&self, body: String) -> Result<(), ChannelError>;

    /// Receive up to a batch of messages, waiting at most `wait_secs`.
    /// Received messages stay invisible until acked or their visibility
    /// window lapses, after which they are delivered again.
    async fn receive(&self, wait_secs: u64) -> Result<Vec<Delivery>, ChannelError>;

    /// Remove a processed message from the channel
    async fn ack(&self, receipt: &str) -> Result<(), ChannelError>;
}
