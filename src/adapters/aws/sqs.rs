use crate::ports::queue::{Channel, ChannelError, Delivery};
use async_trait::async_trait;
use aws_sdk_sqs::Client;

const MAX_MESSAGES_PER_RECEIVE: i32 = 10;

/// SqsAdapter implements Channel for AWS SQS.
///
/// Messages are deleted only on `ack`; anything left unacked reappears once
/// the queue's visibility timeout lapses, and the queue's redrive policy
/// decides when it goes to the dead-letter queue.
#[derive(Clone)]
pub struct SqsAdapter {
    client: Client,
    queue_url: String,
}

impl SqsAdapter {
    pub fn new(client: Client, queue_url: String) -> Self {
        Self { client, queue_url }
    }
}

#[async_trait]
impl Channel for SqsAdapter {
    async fn publish(&self, body: String) -> Result<(), ChannelError> {
        self.client
            .send_message()
            .queue_url(&self.queue_url)
            .message_body(body)
            .send()
            .await
            .map_err(|e| ChannelError::PublishFailed(e.to_string()))?;
        Ok(())
    }

    async fn receive(&self, wait_secs: u64) -> Result<Vec<Delivery>, ChannelError> {
        // SQS long polling is capped at 20 seconds.
        let wait_time = wait_secs.min(20) as i32;
        let resp = self
            .client
            .receive_message()
            .queue_url(&self.queue_url)
            .max_number_of_messages(MAX_MESSAGES_PER_RECEIVE)
            .wait_time_seconds(wait_time)
            .send()
            .await
            .map_err(|e| ChannelError::ReceiveFailed(e.to_string()))?;

        let deliveries = resp
            .messages
            .unwrap_or_default()
            .into_iter()
            .filter_map(|msg| match (msg.body, msg.receipt_handle) {
                (Some(body), Some(receipt)) => Some(Delivery { body, receipt }),
                _ => None,
            })
            .collect();
        Ok(deliveries)
    }

    async fn ack(&self, receipt: &str) -> Result<(), ChannelError> {
        self.client
            .delete_message()
            .queue_url(&self.queue_url)
            .receipt_handle(receipt)
            .send()
            .await
            .map_err(|e| ChannelError::AckFailed(e.to_string()))?;
        Ok(())
    }
}
