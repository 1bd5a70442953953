use crate::domain::keys::JobId;
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("Counter for {0} already exists")]
    AlreadyExists(JobId),

    #[error("No counter for {0}")]
    NotFound(JobId),

    #[error("Tracker backend error: {0}")]
    Backend(String),
}

/// State of a freshly created counter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Counter {
    pub job: JobId,
    pub count: u64,
}

/// Durable per-job completion counter.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CompletionTracker: Send + Sync {
    /// Create the counter at zero. Fails with `AlreadyExists` if one is
    /// already stored for the job; the stored count is left untouched.
    async fn create(&self, job: &JobId) -> Result<Counter, TrackerError>;

    /// Atomically add one. Fails with `NotFound` if the counter was never
    /// created.
    async fn increment(&self, job: &JobId) -> Result<(), TrackerError>;
}
