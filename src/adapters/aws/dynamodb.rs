use crate::domain::keys::JobId;
use crate::ports::tracker::{CompletionTracker, Counter, TrackerError};
use async_trait::async_trait;
use aws_sdk_dynamodb::types::AttributeValue;
use aws_sdk_dynamodb::Client;

const CLIENT_ID: &str = "clientId";
const VIDEO_ID: &str = "videoId";
const COUNT: &str = "count";

/// DynamoAdapter implements CompletionTracker for AWS DynamoDB.
///
/// The table is keyed by `clientId` (partition) and `videoId` (sort) and
/// holds a single numeric `count` attribute.
#[derive(Clone)]
pub struct DynamoAdapter {
    client: Client,
    table_name: String,
}

impl DynamoAdapter {
    pub fn new(client: Client, table_name: String) -> Self {
        Self { client, table_name }
    }
}

#[async_trait]
impl CompletionTracker for DynamoAdapter {
    async fn create(&self, job: &JobId) -> Result<Counter, TrackerError> {
        let result = self
            .client
            .put_item()
            .table_name(&self.table_name)
            .item(CLIENT_ID, AttributeValue::S(job.client_id.clone()))
            .item(VIDEO_ID, AttributeValue::S(job.video_id.clone()))
            .item(COUNT, AttributeValue::N("0".to_string()))
            .condition_expression("attribute_not_exists(#client)")
            .expression_attribute_names("#client", CLIENT_ID)
            .send()
            .await;

        match result {
            Ok(_) => Ok(Counter {
                job: job.clone(),
                count: 0,
            }),
            Err(err) => {
                let service_err = err.into_service_error();
                if service_err.is_conditional_check_failed_exception() {
                    Err(TrackerError::AlreadyExists(job.clone()))
                } else {
                    Err(TrackerError::Backend(service_err.to_string()))
                }
            }
        }
    }

    async fn increment(&self, job: &JobId) -> Result<(), TrackerError> {
        // ADD is applied server-side, so concurrent increments never race.
        let result = self
            .client
            .update_item()
            .table_name(&self.table_name)
            .key(CLIENT_ID, AttributeValue::S(job.client_id.clone()))
            .key(VIDEO_ID, AttributeValue::S(job.video_id.clone()))
            .update_expression("ADD #count :inc")
            .condition_expression("attribute_exists(#client)")
            .expression_attribute_names("#count", COUNT)
            .expression_attribute_names("#client", CLIENT_ID)
            .expression_attribute_values(":inc", AttributeValue::N("1".to_string()))
            .send()
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(err) => {
                let service_err = err.into_service_error();
                if service_err.is_conditional_check_failed_exception() {
                    Err(TrackerError::NotFound(job.clone()))
                } else {
                    Err(TrackerError::Backend(service_err.to_string()))
                }
            }
        }
    }
}
