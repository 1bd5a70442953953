//! In-process channel with at-least-once semantics.
//!
//! Received messages become invisible until acked. If the visibility window
//! lapses first they are handed out again, and after `max_receive_count`
//! receives they are moved to the dead-letter list instead.

use crate::ports::queue::{Channel, ChannelError, Delivery};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;
use tracing::warn;
use uuid::Uuid;

const MAX_BATCH: usize = 10;
const POLL_INTERVAL: Duration = Duration::from_millis(25);

#[derive(Debug, Clone)]
struct Message {
    body: String,
    receive_count: u32,
}

#[derive(Debug)]
struct InFlight {
    message: Message,
    visible_at: Instant,
}

#[derive(Debug, Default)]
struct State {
    ready: VecDeque<Message>,
    in_flight: HashMap<String, InFlight>,
    dead_letters: Vec<String>,
}

impl State {
    fn release_expired(&mut self, now: Instant, max_receive_count: u32) {
        let expired: Vec<String> = self
            .in_flight
            .iter()
            .filter(|(_, entry)| entry.visible_at <= now)
            .map(|(receipt, _)| receipt.clone())
            .collect();

        for receipt in expired {
            if let Some(entry) = self.in_flight.remove(&receipt) {
                if entry.message.receive_count >= max_receive_count {
                    warn!(
                        receive_count = entry.message.receive_count,
                        "Message exceeded receive limit, moving to dead letters"
                    );
                    self.dead_letters.push(entry.message.body);
                } else {
                    self.ready.push_back(entry.message);
                }
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct MemoryChannel {
    state: Arc<Mutex<State>>,
    notify: Arc<Notify>,
    visibility_timeout: Duration,
    max_receive_count: u32,
}

impl MemoryChannel {
    pub fn new(visibility_timeout: Duration, max_receive_count: u32) -> Self {
        Self {
            state: Arc::new(Mutex::new(State::default())),
            notify: Arc::new(Notify::new()),
            visibility_timeout,
            max_receive_count: max_receive_count.max(1),
        }
    }

    /// Messages waiting to be received or currently in flight.
    pub async fn pending(&self) -> usize {
        let state = self.state.lock().await;
        state.ready.len() + state.in_flight.len()
    }

    pub async fn dead_letters(&self) -> Vec<String> {
        self.state.lock().await.dead_letters.clone()
    }
}

#[async_trait]
impl Channel for MemoryChannel {
    async fn publish(&self, body: String) -> Result<(), ChannelError> {
        self.state.lock().await.ready.push_back(Message {
            body,
            receive_count: 0,
        });
        self.notify.notify_one();
        Ok(())
    }

    async fn receive(&self, wait_secs: u64) -> Result<Vec<Delivery>, ChannelError> {
        let deadline = Instant::now() + Duration::from_secs(wait_secs);

        loop {
            {
                let now = Instant::now();
                let mut state = self.state.lock().await;
                state.release_expired(now, self.max_receive_count);

                let mut deliveries = Vec::new();
                while deliveries.len() < MAX_BATCH {
                    let Some(mut message) = state.ready.pop_front() else {
                        break;
                    };
                    message.receive_count += 1;
                    let receipt = Uuid::new_v4().to_string();
                    deliveries.push(Delivery {
                        body: message.body.clone(),
                        receipt: receipt.clone(),
                    });
                    state.in_flight.insert(
                        receipt,
                        InFlight {
                            message,
                            visible_at: now + self.visibility_timeout,
                        },
                    );
                }
                if !deliveries.is_empty() {
                    return Ok(deliveries);
                }
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(Vec::new());
            }
            let wait = (deadline - now).min(POLL_INTERVAL);
            let _ = tokio::time::timeout(wait, self.notify.notified()).await;
        }
    }

    async fn ack(&self, receipt: &str) -> Result<(), ChannelError> {
        match self.state.lock().await.in_flight.remove(receipt) {
            Some(_) => Ok(()),
            None => Err(ChannelError::AckFailed(format!(
                "receipt {} is not in flight",
                receipt
            ))),
        }
    }
}
