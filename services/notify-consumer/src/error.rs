//! Error types for the notification consumer.
//!
//! Each external seam has its own error enum. None of these escape the
//! consumption loop; they are logged and the loop moves on.

use thiserror::Error;

/// Errors that can occur while loading or validating configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required configuration: {0}")]
    MissingRequired(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to load configuration: {0}")]
    LoadError(#[from] config::ConfigError),
}

/// Errors produced when a message body cannot be turned into a notification
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("Message has no body")]
    MissingBody,

    #[error("Malformed notification body: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Notification contains no records")]
    NoRecords,

    #[error("Object key is not valid percent-encoded UTF-8: {0}")]
    InvalidKey(String),
}

/// Errors returned by a queue client
#[derive(Error, Debug)]
pub enum QueueError {
    #[error("Failed to receive messages: {0}")]
    Receive(String),

    #[error("Failed to delete message: {0}")]
    Delete(String),
}

/// Errors returned by an object store client
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Object not found: {bucket}/{key}")]
    NotFound { bucket: String, key: String },

    #[error("Failed to read object metadata: {0}")]
    Request(String),
}
