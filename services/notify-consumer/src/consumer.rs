//! The consumption loop.
//!
//! Each iteration polls one batch from the queue and handles its messages
//! one at a time: decode the notification, fetch the object's metadata, log
//! it, delete the message. Failures are logged and never leave the loop.

use crate::config::{BackoffConfig, Config, DecodeFailurePolicy};
use crate::error::DecodeError;
use crate::notification::{decode_notification, ChangeNotification, Notification};
use crate::object_store::{ObjectMetadata, ObjectStore};
use crate::queue::{QueueClient, QueueMessage};
use backoff::backoff::Backoff;
use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};

/// Settings the loop is constructed with
#[derive(Debug, Clone)]
pub struct ConsumerSettings {
    /// Messages requested per poll
    pub max_messages: i32,
    pub on_decode_failure: DecodeFailurePolicy,
    pub poll_backoff: BackoffConfig,
}

impl From<&Config> for ConsumerSettings {
    fn from(config: &Config) -> Self {
        Self {
            max_messages: config.queue.max_messages,
            on_decode_failure: config.consumer.on_decode_failure,
            poll_backoff: config.consumer.poll_backoff.clone(),
        }
    }
}

/// What happened during one poll-and-process iteration
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IterationReport {
    /// Messages returned by the poll
    pub received: usize,
    /// Change notifications whose metadata was fetched
    pub metadata_fetched: usize,
    pub metadata_failures: usize,
    pub decode_failures: usize,
    pub test_events: usize,
    pub acknowledged: usize,
    pub ack_failures: usize,
    /// Undecodable messages left on the queue
    pub retained: usize,
    /// Set when the poll failed; the loop waits this long before polling again
    pub poll_backoff: Option<Duration>,
}

impl IterationReport {
    /// Number of delete attempts made, successful or not
    pub fn ack_attempts(&self) -> usize {
        self.acknowledged + self.ack_failures
    }
}

/// Polls a queue for S3 change notifications and resolves them to object metadata
pub struct NotificationConsumer {
    queue: Arc<dyn QueueClient>,
    store: Arc<dyn ObjectStore>,
    settings: ConsumerSettings,
    backoff: ExponentialBackoff,
    consecutive_poll_failures: u32,
}

impl NotificationConsumer {
    pub fn new(
        queue: Arc<dyn QueueClient>,
        store: Arc<dyn ObjectStore>,
        settings: ConsumerSettings,
    ) -> Self {
        let backoff = build_backoff(&settings.poll_backoff);

        Self {
            queue,
            store,
            settings,
            backoff,
            consecutive_poll_failures: 0,
        }
    }

    /// Poll and process forever
    pub async fn run(&mut self) {
        info!(
            max_messages = self.settings.max_messages,
            on_decode_failure = ?self.settings.on_decode_failure,
            "Starting notification consumer"
        );

        loop {
            let report = self.run_iteration().await;

            if let Some(delay) = report.poll_backoff {
                tokio::time::sleep(delay).await;
            }
        }
    }

    /// Poll one batch and process each message in order
    pub async fn run_iteration(&mut self) -> IterationReport {
        let mut report = IterationReport::default();

        let messages = match self.poll_batch().await {
            Ok(messages) => messages,
            Err(delay) => {
                report.poll_backoff = Some(delay);
                return report;
            }
        };

        report.received = messages.len();

        for message in &messages {
            self.process_message(message, &mut report).await;
        }

        if report.received > 0 {
            debug!(report = ?report, "Batch processed");
        }

        report
    }

    /// Receive a batch; on failure returns the delay before the next poll
    async fn poll_batch(&mut self) -> Result<Vec<QueueMessage>, Duration> {
        match self.queue.receive_messages(self.settings.max_messages).await {
            Ok(messages) => {
                if self.consecutive_poll_failures > 0 {
                    info!(
                        failures = self.consecutive_poll_failures,
                        "Queue polling recovered"
                    );
                    self.consecutive_poll_failures = 0;
                    self.backoff.reset();
                }

                metrics::counter!("notify.messages.received").increment(messages.len() as u64);
                Ok(messages)
            }
            Err(e) => {
                self.consecutive_poll_failures += 1;
                let max_interval = self.settings.poll_backoff.max_interval();
                let delay = self
                    .backoff
                    .next_backoff()
                    .unwrap_or(max_interval)
                    .min(max_interval);

                error!(
                    error = %e,
                    consecutive_failures = self.consecutive_poll_failures,
                    delay_ms = delay.as_millis() as u64,
                    "Failed to poll queue, backing off"
                );
                metrics::counter!("notify.poll.errors").increment(1);

                Err(delay)
            }
        }
    }

    #[instrument(skip(self, message, report), fields(message_id = %message.id()))]
    async fn process_message(&self, message: &QueueMessage, report: &mut IterationReport) {
        debug!(
            receive_count = message.receive_count,
            body = message.body.as_deref().unwrap_or(""),
            "Message received from queue"
        );

        let notification = match message
            .body
            .as_deref()
            .ok_or(DecodeError::MissingBody)
            .and_then(decode_notification)
        {
            Ok(notification) => notification,
            Err(e) => {
                report.decode_failures += 1;
                metrics::counter!("notify.messages.undecodable").increment(1);

                match self.settings.on_decode_failure {
                    DecodeFailurePolicy::Retain => {
                        warn!(
                            error = %e,
                            receive_count = message.receive_count,
                            "Skipping undecodable message, leaving it on the queue"
                        );
                        report.retained += 1;
                    }
                    DecodeFailurePolicy::Delete => {
                        warn!(error = %e, "Skipping undecodable message, deleting it");
                        self.acknowledge(message, report).await;
                    }
                }
                return;
            }
        };

        match notification {
            Notification::TestEvent => {
                info!("Received S3 test event");
                report.test_events += 1;
            }
            Notification::Change(change) => {
                if let Some(metadata) = self.fetch_metadata(&change, report).await {
                    log_metadata(&change, &metadata);
                }
            }
        }

        self.acknowledge(message, report).await;
    }

    async fn fetch_metadata(
        &self,
        change: &ChangeNotification,
        report: &mut IterationReport,
    ) -> Option<ObjectMetadata> {
        if change.record_count > 1 {
            debug!(
                records = change.record_count,
                "Notification carries multiple records, using the first"
            );
        }

        match self.store.object_metadata(&change.bucket, &change.key).await {
            Ok(metadata) => {
                report.metadata_fetched += 1;
                Some(metadata)
            }
            Err(e) => {
                warn!(
                    bucket = %change.bucket,
                    key = %change.key,
                    error = %e,
                    "Failed to fetch object metadata"
                );
                report.metadata_failures += 1;
                metrics::counter!("notify.metadata.errors").increment(1);
                None
            }
        }
    }

    async fn acknowledge(&self, message: &QueueMessage, report: &mut IterationReport) {
        let Some(receipt_handle) = message.receipt_handle.as_deref() else {
            error!("Message has no receipt handle, cannot delete it");
            report.ack_failures += 1;
            metrics::counter!("notify.ack.errors").increment(1);
            return;
        };

        match self.queue.delete_message(receipt_handle).await {
            Ok(()) => {
                debug!("Message deleted");
                report.acknowledged += 1;
                metrics::counter!("notify.messages.acknowledged").increment(1);
            }
            Err(e) => {
                // Visibility timeout expiry brings it back for redelivery
                error!(error = %e, "Failed to delete message");
                report.ack_failures += 1;
                metrics::counter!("notify.ack.errors").increment(1);
            }
        }
    }
}

fn build_backoff(config: &BackoffConfig) -> ExponentialBackoff {
    ExponentialBackoffBuilder::new()
        .with_initial_interval(config.initial_interval())
        .with_max_interval(config.max_interval())
        .with_multiplier(config.multiplier)
        .with_randomization_factor(config.randomization_factor)
        // Poll forever
        .with_max_elapsed_time(None)
        .build()
}

fn log_metadata(change: &ChangeNotification, metadata: &ObjectMetadata) {
    info!(
        bucket = %change.bucket,
        key = %change.key,
        event_name = change.event_name.as_deref().unwrap_or("unknown"),
        content_type = metadata.content_type.as_deref().unwrap_or(""),
        content_length = metadata.content_length,
        e_tag = metadata.e_tag.as_deref().unwrap_or(""),
        last_modified = metadata.last_modified.as_deref().unwrap_or(""),
        entries = metadata.user_metadata.len(),
        "Object metadata fetched"
    );

    for (key, value) in &metadata.user_metadata {
        info!(object = %change, key = %key, value = %value, "Object metadata entry");
    }
}
