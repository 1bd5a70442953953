use crate::ports::storage::{ObjectStore, StorageError};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Object store on the local filesystem: `<root>/<bucket>/<key>`.
///
/// A "presigned" URL is simply the absolute path of the object, which the
/// media tools can read directly.
#[derive(Debug, Clone)]
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn object_path(&self, bucket: &str, key: &str) -> PathBuf {
        self.root.join(bucket).join(key)
    }
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    async fn presign_get(
        &self,
        bucket: &str,
        key: &str,
        _expires_in: Duration,
    ) -> Result<String, StorageError> {
        let path = std::env::current_dir()?.join(self.object_path(bucket, key));
        Ok(path.to_string_lossy().to_string())
    }

    async fn upload(
        &self,
        local_path: &Path,
        bucket: &str,
        key: &str,
        _content_type: &str,
    ) -> Result<(), StorageError> {
        let dest = self.object_path(bucket, key);
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::copy(local_path, &dest)
            .await
            .map_err(|e| StorageError::UploadFailed {
                bucket: bucket.to_string(),
                key: key.to_string(),
                reason: e.to_string(),
            })?;
        Ok(())
    }
}
