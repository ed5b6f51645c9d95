use crate::config::AwsConfig;
use crate::error::StoreError;
use async_trait::async_trait;
use aws_sdk_s3::config::Builder as S3ConfigBuilder;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::operation::head_object::HeadObjectOutput;
use aws_sdk_s3::primitives::DateTimeFormat;
use aws_sdk_s3::Client as S3Client;
use aws_types::SdkConfig;
use std::collections::BTreeMap;
use tracing::{debug, info, instrument};

/// Metadata of a stored object, read without its content
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectMetadata {
    /// User-defined metadata (`x-amz-meta-*`), keyed without the prefix
    pub user_metadata: BTreeMap<String, String>,
    pub content_type: Option<String>,
    pub content_length: Option<i64>,
    pub e_tag: Option<String>,
    /// RFC 3339 timestamp
    pub last_modified: Option<String>,
}

impl From<HeadObjectOutput> for ObjectMetadata {
    fn from(output: HeadObjectOutput) -> Self {
        Self {
            user_metadata: output.metadata.unwrap_or_default().into_iter().collect(),
            content_type: output.content_type,
            content_length: output.content_length,
            e_tag: output.e_tag,
            last_modified: output
                .last_modified
                .and_then(|ts| ts.fmt(DateTimeFormat::DateTime).ok()),
        }
    }
}

/// Metadata-only reads against an object store
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fetch metadata for `bucket`/`key`; never transfers the object body
    async fn object_metadata(&self, bucket: &str, key: &str) -> Result<ObjectMetadata, StoreError>;
}

/// S3-backed object store
pub struct S3ObjectStore {
    client: S3Client,
}

impl S3ObjectStore {
    /// Create a new S3 object store client
    pub fn new(sdk_config: &SdkConfig, aws: &AwsConfig) -> Self {
        let mut s3_config_builder = S3ConfigBuilder::from(sdk_config);

        // Configure custom endpoint for MinIO/LocalStack
        if let Some(ref endpoint_url) = aws.endpoint_url {
            s3_config_builder = s3_config_builder.endpoint_url(endpoint_url);
        }

        // Force path-style access for MinIO compatibility
        if aws.force_path_style {
            s3_config_builder = s3_config_builder.force_path_style(true);
        }

        let client = S3Client::from_conf(s3_config_builder.build());

        info!(
            region = %aws.region,
            force_path_style = aws.force_path_style,
            "S3 object store initialized"
        );

        Self { client }
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    #[instrument(skip(self))]
    async fn object_metadata(&self, bucket: &str, key: &str) -> Result<ObjectMetadata, StoreError> {
        let output = self
            .client
            .head_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                if e.as_service_error()
                    .map(|e| e.is_not_found())
                    .unwrap_or(false)
                {
                    StoreError::NotFound {
                        bucket: bucket.to_string(),
                        key: key.to_string(),
                    }
                } else {
                    StoreError::Request(DisplayErrorContext(e).to_string())
                }
            })?;

        debug!(bucket = %bucket, key = %key, "Fetched object metadata");

        Ok(ObjectMetadata::from(output))
    }
}
