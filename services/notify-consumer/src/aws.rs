use crate::config::AwsConfig;
use aws_config::BehaviorVersion;
use aws_types::SdkConfig;
use tracing::info;

/// Resolve credentials and build the shared SDK configuration for the configured region
pub async fn load_sdk_config(config: &AwsConfig) -> SdkConfig {
    let sdk_config = aws_config::defaults(BehaviorVersion::latest())
        .region(aws_config::Region::new(config.region.clone()))
        .load()
        .await;

    info!(
        region = %config.region,
        endpoint_url = config.endpoint_url.as_deref().unwrap_or("default"),
        "AWS configuration loaded"
    );

    sdk_config
}
