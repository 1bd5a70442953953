use crate::domain::keys::JobId;
use crate::ports::tracker::{CompletionTracker, Counter, TrackerError};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// In-process completion tracker. Create and increment each run under one
/// lock acquisition, which makes them as atomic as a conditional put and a
/// server-side add.
#[derive(Debug, Clone, Default)]
pub struct MemoryTracker {
    counters: Arc<Mutex<HashMap<JobId, u64>>>,
}

impl MemoryTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current count for a job, if its counter exists.
    pub async fn count(&self, job: &JobId) -> Option<u64> {
        self.counters.lock().await.get(job).copied()
    }
}

#[async_trait]
impl CompletionTracker for MemoryTracker {
    async fn create(&self, job: &JobId) -> Result<Counter, TrackerError> {
        let mut counters = self.counters.lock().await;
        if counters.contains_key(job) {
            return Err(TrackerError::AlreadyExists(job.clone()));
        }
        counters.insert(job.clone(), 0);
        Ok(Counter {
            job: job.clone(),
            count: 0,
        })
    }

    async fn increment(&self, job: &JobId) -> Result<(), TrackerError> {
        match self.counters.lock().await.get_mut(job) {
            Some(count) => {
                *count += 1;
                Ok(())
            }
            None => Err(TrackerError::NotFound(job.clone())),
        }
    }
}
