use crate::config::{AwsConfig, QueueConfig};
use crate::error::QueueError;
use async_trait::async_trait;
use aws_sdk_sqs::config::Builder as SqsConfigBuilder;
use aws_sdk_sqs::error::DisplayErrorContext;
use aws_sdk_sqs::types::{Message, MessageSystemAttributeName};
use aws_sdk_sqs::Client as SqsClient;
use aws_types::SdkConfig;
use tracing::{debug, info, instrument};

/// A message delivered by the queue
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueMessage {
    /// Queue-assigned message ID
    pub message_id: Option<String>,
    /// Text payload
    pub body: Option<String>,
    /// Token identifying this delivery, required to delete it
    pub receipt_handle: Option<String>,
    /// How many times the queue has delivered this message
    pub receive_count: Option<u32>,
}

impl QueueMessage {
    /// Message ID for log fields
    pub fn id(&self) -> &str {
        self.message_id.as_deref().unwrap_or("<none>")
    }
}

impl From<Message> for QueueMessage {
    fn from(message: Message) -> Self {
        let receive_count = message
            .attributes
            .as_ref()
            .and_then(|attrs| attrs.get(&MessageSystemAttributeName::ApproximateReceiveCount))
            .and_then(|count| count.parse().ok());

        Self {
            message_id: message.message_id,
            body: message.body,
            receipt_handle: message.receipt_handle,
            receive_count,
        }
    }
}

/// Receive and acknowledge operations on a single queue
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait QueueClient: Send + Sync {
    /// Receive up to `max_messages` messages
    async fn receive_messages(&self, max_messages: i32) -> Result<Vec<QueueMessage>, QueueError>;

    /// Delete the delivery identified by `receipt_handle`
    async fn delete_message(&self, receipt_handle: &str) -> Result<(), QueueError>;
}

/// SQS-backed queue client
pub struct SqsQueue {
    client: SqsClient,
    queue_url: String,
    wait_time_secs: i32,
    visibility_timeout_secs: Option<i32>,
}

impl SqsQueue {
    /// Create a new SQS queue client
    pub fn new(sdk_config: &SdkConfig, aws: &AwsConfig, config: &QueueConfig) -> Self {
        let mut sqs_config_builder = SqsConfigBuilder::from(sdk_config);

        // Configure custom endpoint for LocalStack
        if let Some(ref endpoint_url) = aws.endpoint_url {
            sqs_config_builder = sqs_config_builder.endpoint_url(endpoint_url);
        }

        let client = SqsClient::from_conf(sqs_config_builder.build());

        info!(
            queue_url = %config.url,
            wait_time_secs = config.wait_time_secs,
            "SQS queue client initialized"
        );

        Self {
            client,
            queue_url: config.url.clone(),
            wait_time_secs: config.wait_time_secs,
            visibility_timeout_secs: config.visibility_timeout_secs,
        }
    }
}

#[async_trait]
impl QueueClient for SqsQueue {
    #[instrument(skip(self), fields(queue_url = %self.queue_url))]
    async fn receive_messages(&self, max_messages: i32) -> Result<Vec<QueueMessage>, QueueError> {
        let output = self
            .client
            .receive_message()
            .queue_url(&self.queue_url)
            .max_number_of_messages(max_messages)
            .wait_time_seconds(self.wait_time_secs)
            .set_visibility_timeout(self.visibility_timeout_secs)
            .message_system_attribute_names(MessageSystemAttributeName::ApproximateReceiveCount)
            .send()
            .await
            .map_err(|e| QueueError::Receive(DisplayErrorContext(e).to_string()))?;

        let messages: Vec<QueueMessage> = output
            .messages
            .unwrap_or_default()
            .into_iter()
            .map(QueueMessage::from)
            .collect();

        debug!(count = messages.len(), "Received messages from SQS");

        Ok(messages)
    }

    #[instrument(skip(self, receipt_handle), fields(queue_url = %self.queue_url))]
    async fn delete_message(&self, receipt_handle: &str) -> Result<(), QueueError> {
        self.client
            .delete_message()
            .queue_url(&self.queue_url)
            .receipt_handle(receipt_handle)
            .send()
            .await
            .map_err(|e| QueueError::Delete(DisplayErrorContext(e).to_string()))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_convert_sqs_message() {
        let message = Message::builder()
            .message_id("msg-1")
            .receipt_handle("rh-1")
            .body(r#"{"Records":[]}"#)
            .set_attributes(Some(HashMap::from([(
                MessageSystemAttributeName::ApproximateReceiveCount,
                "3".to_string(),
            )])))
            .build();

        let converted = QueueMessage::from(message);

        assert_eq!(converted.id(), "msg-1");
        assert_eq!(converted.receipt_handle.as_deref(), Some("rh-1"));
        assert_eq!(converted.body.as_deref(), Some(r#"{"Records":[]}"#));
        assert_eq!(converted.receive_count, Some(3));
    }

    #[test]
    fn test_convert_sqs_message_without_attributes() {
        let converted = QueueMessage::from(Message::builder().build());

        assert_eq!(converted.id(), "<none>");
        assert_eq!(converted.receipt_handle, None);
        assert_eq!(converted.receive_count, None);
    }
}
