//! S3 event notification decoding.
//!
//! Message bodies follow the S3 event notification format:
//!
//! ```json
//! {"Records":[{"eventName":"ObjectCreated:Put","s3":{"bucket":{"name":"my-bucket"},"object":{"key":"file.txt"}}}]}
//! ```
//!
//! Only the first record is used. Bodies with an empty `Records` array are
//! rejected rather than indexed.

use crate::error::DecodeError;
use serde::Deserialize;
use std::fmt;

/// Event name S3 sends when a notification configuration is attached
pub const TEST_EVENT: &str = "s3:TestEvent";

/// A decoded message body
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    /// An object change, taken from the first record
    Change(ChangeNotification),
    /// Configuration test message; carries no object reference
    TestEvent,
}

/// The object a change notification refers to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeNotification {
    /// Bucket name
    pub bucket: String,
    /// Object key, percent-decoded
    pub key: String,
    /// Event name (e.g. `ObjectCreated:Put`), if present
    pub event_name: Option<String>,
    /// Number of records in the body; records after the first are ignored
    pub record_count: usize,
}

impl fmt::Display for ChangeNotification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s3://{}/{}", self.bucket, self.key)
    }
}

#[derive(Debug, Deserialize)]
struct EventBody {
    #[serde(rename = "Records", default)]
    records: Vec<EventRecord>,
    #[serde(rename = "Event")]
    event: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventRecord {
    event_name: Option<String>,
    s3: S3Entity,
}

#[derive(Debug, Deserialize)]
struct S3Entity {
    bucket: BucketEntity,
    object: ObjectEntity,
}

#[derive(Debug, Deserialize)]
struct BucketEntity {
    name: String,
}

#[derive(Debug, Deserialize)]
struct ObjectEntity {
    key: String,
}

/// Decode a queue message body into a notification
pub fn decode_notification(body: &str) -> Result<Notification, DecodeError> {
    let event: EventBody = serde_json::from_str(body)?;

    if event.records.is_empty() && event.event.as_deref() == Some(TEST_EVENT) {
        return Ok(Notification::TestEvent);
    }

    let record_count = event.records.len();
    let first = event.records.into_iter().next().ok_or(DecodeError::NoRecords)?;

    Ok(Notification::Change(ChangeNotification {
        bucket: first.s3.bucket.name,
        key: decode_object_key(&first.s3.object.key)?,
        event_name: first.event_name,
        record_count,
    }))
}

/// Object keys arrive form-encoded: spaces as `+`, everything else percent-escaped
fn decode_object_key(raw: &str) -> Result<String, DecodeError> {
    let spaced = raw.replace('+', " ");
    urlencoding::decode(&spaced)
        .map(|key| key.into_owned())
        .map_err(|_| DecodeError::InvalidKey(raw.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn change(body: &str) -> ChangeNotification {
        match decode_notification(body).unwrap() {
            Notification::Change(change) => change,
            other => panic!("expected change notification, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_minimal_record() {
        let change = change(
            r#"{"Records":[{"s3":{"bucket":{"name":"my-bucket"},"object":{"key":"file.txt"}}}]}"#,
        );

        assert_eq!(change.bucket, "my-bucket");
        assert_eq!(change.key, "file.txt");
        assert_eq!(change.event_name, None);
        assert_eq!(change.record_count, 1);
    }

    #[test]
    fn test_decode_uses_first_record_only() {
        let change = change(
            r#"{"Records":[
                {"eventName":"ObjectCreated:Put","s3":{"bucket":{"name":"first"},"object":{"key":"a.txt"}}},
                {"eventName":"ObjectRemoved:Delete","s3":{"bucket":{"name":"second"},"object":{"key":"b.txt"}}}
            ]}"#,
        );

        assert_eq!(change.bucket, "first");
        assert_eq!(change.key, "a.txt");
        assert_eq!(change.event_name.as_deref(), Some("ObjectCreated:Put"));
        assert_eq!(change.record_count, 2);
    }

    #[test]
    fn test_decode_full_s3_event() {
        let change = change(
            r#"{
                "Records": [{
                    "eventVersion": "2.1",
                    "eventSource": "aws:s3",
                    "awsRegion": "eu-central-1",
                    "eventTime": "2024-01-15T10:30:00.000Z",
                    "eventName": "ObjectCreated:CompleteMultipartUpload",
                    "s3": {
                        "s3SchemaVersion": "1.0",
                        "configurationId": "uploads",
                        "bucket": {"name": "media", "arn": "arn:aws:s3:::media"},
                        "object": {"key": "videos/clip.mp4", "size": 1048576, "eTag": "abc"}
                    }
                }]
            }"#,
        );

        assert_eq!(change.bucket, "media");
        assert_eq!(change.key, "videos/clip.mp4");
    }

    #[test]
    fn test_decode_percent_encoded_key() {
        let change = change(
            r#"{"Records":[{"s3":{"bucket":{"name":"b"},"object":{"key":"reports/q1+summary%282024%29.pdf"}}}]}"#,
        );

        assert_eq!(change.key, "reports/q1 summary(2024).pdf");
    }

    #[test]
    fn test_decode_empty_records() {
        let err = decode_notification(r#"{"Records":[]}"#).unwrap_err();
        assert!(matches!(err, DecodeError::NoRecords));

        let err = decode_notification("{}").unwrap_err();
        assert!(matches!(err, DecodeError::NoRecords));
    }

    #[test]
    fn test_decode_malformed_body() {
        assert!(matches!(
            decode_notification("not json").unwrap_err(),
            DecodeError::Malformed(_)
        ));
        assert!(matches!(
            decode_notification(r#"{"Records":[{"s3":{"bucket":{}}}]}"#).unwrap_err(),
            DecodeError::Malformed(_)
        ));
    }

    #[test]
    fn test_decode_invalid_key_encoding() {
        let err = decode_notification(
            r#"{"Records":[{"s3":{"bucket":{"name":"b"},"object":{"key":"bad%FF"}}}]}"#,
        )
        .unwrap_err();
        assert!(matches!(err, DecodeError::InvalidKey(ref key) if key == "bad%FF"));
    }

    #[test]
    fn test_decode_test_event() {
        let notification = decode_notification(
            r#"{"Service":"Amazon S3","Event":"s3:TestEvent","Time":"2024-01-15T10:30:00.000Z","Bucket":"media"}"#,
        )
        .unwrap();

        assert_eq!(notification, Notification::TestEvent);
    }
}
