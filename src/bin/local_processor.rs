//! Local Processor Binary - single-process run against local adapters
//!
//! Usage: `local_processor <key>` where `<key>` names a video already stored at
//! `$STORAGE_ROOT/$SOURCE_BUCKET/<key>`, laid out as `<prefix>/<clientId>/<file>`.
//!
//! It wires up:
//! - Filesystem object store and in-memory channel / completion tracker
//! - ffprobe/ffmpeg and zip through the local command runner
//! - Consumer loops that drain the channel, then reports the completion count

use framesplit::adapters::local::{FsObjectStore, MemoryChannel, MemoryTracker};
use framesplit::adapters::media::{FfmpegTranscoder, TokioCommandRunner, ZipArchiver};
use framesplit::application::dispatcher::{DispatchSettings, DispatcherService};
use framesplit::application::processor::MessageProcessor;
use framesplit::application::router::MessageRouter;
use framesplit::application::worker::{SegmentWorker, WorkerSettings};
use framesplit::config::LocalConfig;
use framesplit::domain::keys::{decode_key, job_id_from_key};
use framesplit::domain::messages::JobNotification;
use framesplit::logging;
use framesplit::ports::queue::Channel;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

const VISIBILITY_TIMEOUT: Duration = Duration::from_secs(300);
const MAX_RECEIVE_COUNT: u32 = 3;
const PRESIGN_EXPIRY: Duration = Duration::from_secs(300);

#[tokio::main]
async fn main() {
    logging::init();

    let Some(key) = std::env::args().nth(1) else {
        error!("Usage: local_processor <key>");
        std::process::exit(2);
    };

    let config = match LocalConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Invalid configuration");
            std::process::exit(1);
        }
    };

    // 1. Adapters (Local implementations)
    let storage = FsObjectStore::new(config.storage_root.clone());
    let channel = MemoryChannel::new(VISIBILITY_TIMEOUT, MAX_RECEIVE_COUNT);
    let tracker = MemoryTracker::new();
    let transcoder = FfmpegTranscoder::new(
        TokioCommandRunner,
        config.work_dir.clone(),
        config.frames_per_second,
    );
    let archiver = ZipArchiver::new(TokioCommandRunner, config.work_dir.clone());

    // 2. Application Services
    let dispatcher = DispatcherService::new(
        storage.clone(),
        channel.clone(),
        tracker.clone(),
        transcoder.clone(),
        DispatchSettings {
            window: config.segment_window,
            presign_expiry: PRESIGN_EXPIRY,
        },
    );
    let worker = SegmentWorker::new(
        storage,
        transcoder,
        archiver,
        tracker.clone(),
        WorkerSettings {
            frames_bucket: config.frames_bucket.clone(),
            presign_expiry: PRESIGN_EXPIRY,
        },
    );
    let processor = Arc::new(MessageProcessor::new(
        channel.clone(),
        MessageRouter::new(dispatcher, worker),
        1,
    ));

    // 3. Publish the notification the storage service would have sent
    let encoded_key = key
        .split('/')
        .map(|part| urlencoding::encode(part).into_owned())
        .collect::<Vec<_>>()
        .join("/");
    let notification = JobNotification {
        bucket: config.source_bucket.clone(),
        key: encoded_key,
    };
    if let Err(e) = channel.publish(notification.to_envelope().to_string()).await {
        error!(error = %e, "Failed to publish notification");
        std::process::exit(1);
    }

    // 4. Start Workers
    for i in 0..config.worker_count.max(1) {
        let p = processor.clone();
        tokio::spawn(async move { p.run_consumer_loop(i).await });
    }
    info!(workers = config.worker_count.max(1), key = %key, "Started local processor");

    // 5. Wait for the channel to drain
    while channel.pending().await > 0 {
        tokio::time::sleep(Duration::from_millis(200)).await;
    }

    let dead_letters = channel.dead_letters().await;
    if !dead_letters.is_empty() {
        warn!(count = dead_letters.len(), "Messages moved to dead letters");
    }

    match decode_key(&notification.key).and_then(|decoded| job_id_from_key(&decoded)) {
        Ok(job) => {
            let completed = tracker.count(&job).await.unwrap_or(0);
            info!(
                client_id = %job.client_id,
                video_id = %job.video_id,
                completed,
                output = %config.storage_root.join(&config.frames_bucket).join(job.output_prefix()).display(),
                "Local run finished"
            );
        }
        Err(e) => error!(error = %e, "Source key does not identify a job"),
    }
}
