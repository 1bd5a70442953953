//! AWS Processor Binary
//!
//! Long-running SQS consumer that:
//! 1. Connects to AWS services (S3, SQS, DynamoDB).
//! 2. Routes storage notifications to the dispatcher, which fans the job out
//!    into segment messages on the same queue.
//! 3. Routes segment messages to the worker, which extracts, archives and
//!    uploads frames and bumps the job's completion counter.
//!
//! Environment Variables:
//! - AWS_REGION: AWS region (e.g., us-east-1)
//! - SQS_QUEUE_URL: SQS queue URL for notifications and segment work
//! - TRACKER_TABLE: DynamoDB table for completion counters
//! - FRAMES_BUCKET: S3 bucket receiving frame archives
//! - SEGMENT_WINDOW_SECONDS, PRESIGN_EXPIRY_SECONDS, FRAMES_PER_SECOND,
//!   WORK_DIR, WORKER_COUNT, RECEIVE_WAIT_SECONDS: optional tuning

use framesplit::adapters::aws::{DynamoAdapter, S3Adapter, SqsAdapter};
use framesplit::adapters::media::{FfmpegTranscoder, TokioCommandRunner, ZipArchiver};
use framesplit::application::dispatcher::DispatcherService;
use framesplit::application::processor::MessageProcessor;
use framesplit::application::router::MessageRouter;
use framesplit::application::worker::SegmentWorker;
use framesplit::config::ProcessorConfig;
use framesplit::logging;
use std::sync::Arc;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    logging::init();

    let config = match ProcessorConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Invalid configuration");
            std::process::exit(1);
        }
    };
    info!(?config, "Processor config loaded");

    // Load AWS config
    let aws = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;

    // Adapters
    let storage = S3Adapter::new(aws_sdk_s3::Client::new(&aws));
    let channel = SqsAdapter::new(aws_sdk_sqs::Client::new(&aws), config.sqs_queue_url.clone());
    let tracker = DynamoAdapter::new(aws_sdk_dynamodb::Client::new(&aws), config.tracker_table.clone());
    let transcoder = FfmpegTranscoder::new(
        TokioCommandRunner,
        config.work_dir.clone(),
        config.frames_per_second,
    );
    let archiver = ZipArchiver::new(TokioCommandRunner, config.work_dir.clone());

    // Application services
    let dispatcher = DispatcherService::new(
        storage.clone(),
        channel.clone(),
        tracker.clone(),
        transcoder.clone(),
        config.dispatch_settings(),
    );
    let worker = SegmentWorker::new(storage, transcoder, archiver, tracker, config.worker_settings());
    let processor = Arc::new(MessageProcessor::new(
        channel,
        MessageRouter::new(dispatcher, worker),
        config.receive_wait_seconds,
    ));

    // Consumer loops
    let handles: Vec<_> = (0..config.worker_count.max(1))
        .map(|i| {
            let p = processor.clone();
            tokio::spawn(async move { p.run_consumer_loop(i).await })
        })
        .collect();
    info!(workers = handles.len(), "AWS processor started, polling for messages...");

    tokio::select! {
        _ = futures::future::join_all(handles) => {}
        _ = tokio::signal::ctrl_c() => info!("Received shutdown signal"),
    }
}
