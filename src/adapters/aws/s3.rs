use crate::ports::storage::{ObjectStore, StorageError};
use async_trait::async_trait;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

/// S3Adapter implements ObjectStore for AWS S3.
#[derive(Clone)]
pub struct S3Adapter {
    client: Client,
}

impl S3Adapter {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ObjectStore for S3Adapter {
    async fn presign_get(
        &self,
        bucket: &str,
        key: &str,
        expires_in: Duration,
    ) -> Result<String, StorageError> {
        let presign_failed = |reason: String| StorageError::PresignFailed {
            bucket: bucket.to_string(),
            key: key.to_string(),
            reason,
        };

        let presign_config =
            PresigningConfig::expires_in(expires_in).map_err(|e| presign_failed(e.to_string()))?;

        debug!(bucket, key, "Generating presigned URL");
        let presigned = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .presigned(presign_config)
            .await
            .map_err(|e| presign_failed(e.to_string()))?;

        Ok(presigned.uri().to_string())
    }

    async fn upload(
        &self,
        local_path: &Path,
        bucket: &str,
        key: &str,
        content_type: &str,
    ) -> Result<(), StorageError> {
        let body = tokio::fs::read(local_path).await?;
        let byte_stream = ByteStream::from(body);

        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .content_type(content_type)
            .body(byte_stream)
            .send()
            .await
            .map_err(|e| StorageError::UploadFailed {
                bucket: bucket.to_string(),
                key: key.to_string(),
                reason: e.to_string(),
            })?;

        info!(bucket, key, "Uploaded object");
        Ok(())
    }
}
