//! Configuration for different deployment environments.

use std::env;
use std::num::NonZeroU64;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

use crate::application::dispatcher::DispatchSettings;
use crate::application::worker::WorkerSettings;

const DEFAULT_WINDOW: NonZeroU64 = NonZeroU64::MIN.saturating_add(59);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} env var required")]
    Missing(&'static str),

    #[error("{name} has invalid value {value:?}")]
    Invalid { name: &'static str, value: String },
}

/// Configuration for the channel-driven deployment.
#[derive(Clone, Debug)]
pub struct ProcessorConfig {
    /// SQS queue URL carrying both notifications and segment work
    pub sqs_queue_url: String,
    /// DynamoDB table holding completion counters
    pub tracker_table: String,
    /// Bucket receiving the frame archives
    pub frames_bucket: String,
    pub segment_window: NonZeroU64,
    pub presign_expiry: Duration,
    pub frames_per_second: u32,
    /// Scratch directory for extracted frames and archives
    pub work_dir: PathBuf,
    pub worker_count: usize,
    pub receive_wait_seconds: u64,
}

impl ProcessorConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        Self::from_lookup(|name| env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let vars = Vars(&lookup);
        Ok(Self {
            sqs_queue_url: vars.required("SQS_QUEUE_URL")?,
            tracker_table: vars.required("TRACKER_TABLE")?,
            frames_bucket: vars.required("FRAMES_BUCKET")?,
            segment_window: vars.parsed("SEGMENT_WINDOW_SECONDS", DEFAULT_WINDOW)?,
            presign_expiry: Duration::from_secs(vars.parsed("PRESIGN_EXPIRY_SECONDS", 300)?),
            frames_per_second: vars.parsed("FRAMES_PER_SECOND", 1)?,
            work_dir: vars.path("WORK_DIR", "/tmp/framesplit"),
            worker_count: vars.parsed("WORKER_COUNT", 4)?,
            receive_wait_seconds: vars.parsed("RECEIVE_WAIT_SECONDS", 20)?,
        })
    }

    pub fn dispatch_settings(&self) -> DispatchSettings {
        DispatchSettings {
            window: self.segment_window,
            presign_expiry: self.presign_expiry,
        }
    }

    pub fn worker_settings(&self) -> WorkerSettings {
        WorkerSettings {
            frames_bucket: self.frames_bucket.clone(),
            presign_expiry: self.presign_expiry,
        }
    }
}

/// Configuration for the single-process local run.
#[derive(Clone, Debug)]
pub struct LocalConfig {
    /// Directory standing in for object storage, one subdirectory per bucket
    pub storage_root: PathBuf,
    pub source_bucket: String,
    pub frames_bucket: String,
    pub segment_window: NonZeroU64,
    pub frames_per_second: u32,
    pub work_dir: PathBuf,
    pub worker_count: usize,
}

impl LocalConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        Self::from_lookup(|name| env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let vars = Vars(&lookup);
        Ok(Self {
            storage_root: vars.path("STORAGE_ROOT", "./storage"),
            source_bucket: vars.or("SOURCE_BUCKET", "videos"),
            frames_bucket: vars.or("FRAMES_BUCKET", "frames"),
            segment_window: vars.parsed("SEGMENT_WINDOW_SECONDS", DEFAULT_WINDOW)?,
            frames_per_second: vars.parsed("FRAMES_PER_SECOND", 1)?,
            work_dir: vars.path("WORK_DIR", "./work"),
            worker_count: vars.parsed("WORKER_COUNT", 4)?,
        })
    }
}

struct Vars<'a, F>(&'a F);

impl<F> Vars<'_, F>
where
    F: Fn(&str) -> Option<String>,
{
    fn get(&self, name: &str) -> Option<String> {
        (self.0)(name).filter(|value| !value.trim().is_empty())
    }

    fn required(&self, name: &'static str) -> Result<String, ConfigError> {
        self.get(name).ok_or(ConfigError::Missing(name))
    }

    fn or(&self, name: &str, default: &str) -> String {
        self.get(name).unwrap_or_else(|| default.to_string())
    }

    fn path(&self, name: &str, default: &str) -> PathBuf {
        PathBuf::from(self.or(name, default))
    }

    fn parsed<T: FromStr>(&self, name: &'static str, default: T) -> Result<T, ConfigError> {
        match self.get(name) {
            None => Ok(default),
            Some(value) => value
                .trim()
                .parse()
                .map_err(|_| ConfigError::Invalid { name, value }),
        }
    }
}
