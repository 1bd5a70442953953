use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Presign failed for {bucket}/{key}: {reason}")]
    PresignFailed {
        bucket: String,
        key: String,
        reason: String,
    },

    #[error("Upload failed for {bucket}/{key}: {reason}")]
    UploadFailed {
        bucket: String,
        key: String,
        reason: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Issue a time-limited read URL for an object
    async fn presign_get(
        &self,
        bucket: &str,
        key: &str,
        expires_in: Duration,
    ) -> Result<String, StorageError>;

    /// Upload a local file under `key`
    async fn upload(
        &self,
        local_path: &Path,
        bucket: &str,
        key: &str,
        content_type: &str,
    ) -> Result<(), StorageError>;
}
