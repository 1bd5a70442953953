use crate::application::router::{HandlerError, MessageRouter, NotificationHandler, SegmentHandler};
use crate::domain::messages::HandlerResponse;
use crate::ports::queue::{Channel, ChannelError, Delivery};
use futures::future::join_all;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{error, info, warn};

#[derive(Debug, Error)]
#[error("Message processing failed: {source}")]
pub struct ProcessorError {
    pub retryable: bool,
    #[source]
    pub source: HandlerError,
}

impl From<HandlerError> for ProcessorError {
    fn from(source: HandlerError) -> Self {
        Self {
            retryable: source.is_retryable(),
            source,
        }
    }
}

/// Outcome of one receive round.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BatchOutcome {
    pub received: usize,
    pub succeeded: usize,
    pub failed: usize,
}

/// Consumes channel messages and routes each to its handler.
///
/// A message is acked only after its handler succeeded. Failed messages stay
/// on the channel and come back once their visibility window lapses.
pub struct MessageProcessor<C, N, S> {
    channel: C,
    router: MessageRouter<N, S>,
    receive_wait_secs: u64,
}

impl<C, N, S> MessageProcessor<C, N, S>
where
    C: Channel,
    N: NotificationHandler,
    S: SegmentHandler,
{
    pub fn new(channel: C, router: MessageRouter<N, S>, receive_wait_secs: u64) -> Self {
        Self {
            channel,
            router,
            receive_wait_secs,
        }
    }

    /// Handles a single raw message body.
    pub async fn handle_body(&self, body: &str) -> Result<HandlerResponse, ProcessorError> {
        let started = Instant::now();
        info!("Message processing started");

        match self.router.route(body).await {
            Ok(response) => {
                info!(
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    status_code = response.status_code,
                    "Message processing finished"
                );
                Ok(response)
            }
            Err(e) => {
                let err = ProcessorError::from(e);
                error!(
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    retryable = err.retryable,
                    error = %err.source,
                    "Message processing failed"
                );
                Err(err)
            }
        }
    }

    /// Receives one batch, handles its messages concurrently and acks the
    /// ones that succeeded.
    pub async fn poll_once(&self, worker_id: usize) -> Result<BatchOutcome, ChannelError> {
        let deliveries = self.channel.receive(self.receive_wait_secs).await?;
        if deliveries.is_empty() {
            return Ok(BatchOutcome::default());
        }
        info!(worker_id, count = deliveries.len(), "Received messages");

        let results = join_all(deliveries.iter().map(|d| self.handle_body(&d.body))).await;

        let mut outcome = BatchOutcome {
            received: deliveries.len(),
            ..BatchOutcome::default()
        };
        for (delivery, result) in deliveries.iter().zip(results) {
            match result {
                Ok(_) => {
                    self.ack(worker_id, delivery).await;
                    outcome.succeeded += 1;
                }
                Err(_) => outcome.failed += 1,
            }
        }
        Ok(outcome)
    }

    async fn ack(&self, worker_id: usize, delivery: &Delivery) {
        // An ack that fails only means the message will be redelivered.
        if let Err(e) = self.channel.ack(&delivery.receipt).await {
            warn!(worker_id, error = %e, "Failed to ack message");
        }
    }

    pub async fn run_consumer_loop(&self, worker_id: usize) {
        info!(worker_id, "Consumer started");
        loop {
            if let Err(e) = self.poll_once(worker_id).await {
                error!(worker_id, error = %e, "Channel error");
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
        }
    }
}
