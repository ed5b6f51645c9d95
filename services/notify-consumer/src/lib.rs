//! Nier Notify Consumer
//!
//! Consumes S3 change notifications from an SQS queue. For every message the
//! consumer decodes the notification, reads the referenced object's metadata
//! (never its body), logs it, and deletes the message.
//!
//! ## Architecture
//!
//! ```text
//!  SQS Queue                  Consumer                     S3
//! ┌──────────────┐  receive  ┌──────────────┐  head     ┌──────────────┐
//! │ S3 event     │──────────▶│ decode       │─────────▶│ object       │
//! │ notifications│           │ notification │           │ metadata     │
//! │              │◀──────────│              │◀─────────│              │
//! └──────────────┘  delete   └──────────────┘           └──────────────┘
//! ```
//!
//! Messages are handled one at a time. Metadata failures do not block the
//! delete; delete failures are left to the queue's visibility timeout.

pub mod aws;
pub mod config;
pub mod consumer;
pub mod error;
pub mod notification;
pub mod object_store;
pub mod queue;

pub use config::{Config, DecodeFailurePolicy};
pub use consumer::{ConsumerSettings, IterationReport, NotificationConsumer};
pub use error::{ConfigError, DecodeError, QueueError, StoreError};
pub use notification::{decode_notification, ChangeNotification, Notification};
pub use object_store::{ObjectMetadata, ObjectStore, S3ObjectStore};
pub use queue::{QueueClient, QueueMessage, SqsQueue};
