use crate::error::ConfigError;
use config::builder::DefaultState;
use config::ConfigBuilder;
use serde::Deserialize;
use std::time::Duration;

/// Upper bound SQS accepts for `MaxNumberOfMessages`
pub const MAX_BATCH_SIZE: i32 = 10;

/// Upper bound SQS accepts for `WaitTimeSeconds`
pub const MAX_WAIT_TIME_SECS: i32 = 20;

/// Environment variable the queue URL has historically been read from
pub const QUEUE_URL_ENV: &str = "PROCESS_QUEUE_URL";

/// Main configuration for the notification consumer
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Service configuration
    #[serde(default)]
    pub service: ServiceConfig,
    /// AWS client configuration shared by the queue and object store clients
    #[serde(default)]
    pub aws: AwsConfig,
    /// Queue polling configuration
    #[serde(default)]
    pub queue: QueueConfig,
    /// Message handling configuration
    #[serde(default)]
    pub consumer: ConsumerConfig,
}

/// Service-level configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    /// Service name for logging
    #[serde(default = "default_service_name")]
    pub name: String,
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Log output format
    #[serde(default)]
    pub log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

/// AWS configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AwsConfig {
    /// AWS region
    #[serde(default = "default_region")]
    pub region: String,
    /// Custom endpoint URL (for LocalStack, MinIO, etc.)
    pub endpoint_url: Option<String>,
    /// Force path-style S3 access (required for MinIO)
    #[serde(default)]
    pub force_path_style: bool,
}

/// SQS polling configuration
#[derive(Debug, Clone, Deserialize)]
pub struct QueueConfig {
    /// URL of the queue to poll
    #[serde(default)]
    pub url: String,
    /// Maximum number of messages per receive call (1-10)
    #[serde(default = "default_max_messages")]
    pub max_messages: i32,
    /// Long poll wait time in seconds (0 = short poll)
    #[serde(default)]
    pub wait_time_secs: i32,
    /// Visibility timeout override for received messages
    pub visibility_timeout_secs: Option<i32>,
}

/// What to do with a message whose body is not a change notification
#[derive(Debug, Clone, Copy, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DecodeFailurePolicy {
    /// Leave the message on the queue; redrive policy moves it to a DLQ
    #[default]
    Retain,
    /// Delete the message after logging it
    Delete,
}

/// Message handling configuration
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ConsumerConfig {
    #[serde(default)]
    pub on_decode_failure: DecodeFailurePolicy,
    /// Backoff applied between consecutive failed polls
    #[serde(default)]
    pub poll_backoff: BackoffConfig,
}

/// Exponential backoff parameters for poll failures
#[derive(Debug, Clone, Deserialize)]
pub struct BackoffConfig {
    /// First delay in milliseconds
    #[serde(default = "default_initial_interval_ms")]
    pub initial_interval_ms: u64,
    /// Delay ceiling in milliseconds
    #[serde(default = "default_max_interval_ms")]
    pub max_interval_ms: u64,
    /// Growth factor between consecutive delays
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
    /// Jitter applied to each delay (0.0 - 1.0)
    #[serde(default = "default_randomization_factor")]
    pub randomization_factor: f64,
}

// Default value functions
fn default_service_name() -> String {
    "notify-consumer".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_region() -> String {
    "eu-central-1".to_string()
}

fn default_max_messages() -> i32 {
    MAX_BATCH_SIZE
}

fn default_initial_interval_ms() -> u64 {
    200
}

fn default_max_interval_ms() -> u64 {
    20_000
}

fn default_multiplier() -> f64 {
    2.0
}

fn default_randomization_factor() -> f64 {
    0.5
}

impl Config {
    /// Load configuration from config files and environment
    pub fn load() -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder()
            .add_source(config::File::with_name("config/notify").required(false))
            .add_source(config::File::with_name("/etc/notify/consumer").required(false))
            // NOTIFY__QUEUE__URL -> queue.url
            .add_source(
                config::Environment::with_prefix("NOTIFY")
                    .separator("__")
                    .try_parsing(true),
            );

        // Lowest precedence so files and NOTIFY__ variables win
        if let Ok(url) = std::env::var(QUEUE_URL_ENV) {
            builder = builder.set_default("queue.url", url)?;
        }

        Self::from_builder(builder)
    }

    /// Build and validate configuration from a prepared builder
    pub fn from_builder(builder: ConfigBuilder<DefaultState>) -> Result<Self, ConfigError> {
        let config: Self = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.queue.url.trim().is_empty() {
            return Err(ConfigError::MissingRequired(format!(
                "queue.url (set NOTIFY__QUEUE__URL or {QUEUE_URL_ENV})"
            )));
        }

        if !(1..=MAX_BATCH_SIZE).contains(&self.queue.max_messages) {
            return Err(ConfigError::InvalidValue {
                key: "queue.max_messages".to_string(),
                message: format!("must be between 1 and {MAX_BATCH_SIZE}"),
            });
        }

        if !(0..=MAX_WAIT_TIME_SECS).contains(&self.queue.wait_time_secs) {
            return Err(ConfigError::InvalidValue {
                key: "queue.wait_time_secs".to_string(),
                message: format!("must be between 0 and {MAX_WAIT_TIME_SECS}"),
            });
        }

        if matches!(self.queue.visibility_timeout_secs, Some(t) if t < 0) {
            return Err(ConfigError::InvalidValue {
                key: "queue.visibility_timeout_secs".to_string(),
                message: "must not be negative".to_string(),
            });
        }

        if self.aws.region.trim().is_empty() {
            return Err(ConfigError::MissingRequired("aws.region".to_string()));
        }

        self.consumer.poll_backoff.validate()
    }
}

impl BackoffConfig {
    pub fn initial_interval(&self) -> Duration {
        Duration::from_millis(self.initial_interval_ms)
    }

    pub fn max_interval(&self) -> Duration {
        Duration::from_millis(self.max_interval_ms)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.initial_interval_ms == 0 || self.initial_interval_ms > self.max_interval_ms {
            return Err(ConfigError::InvalidValue {
                key: "consumer.poll_backoff.initial_interval_ms".to_string(),
                message: "must be positive and not above max_interval_ms".to_string(),
            });
        }

        if self.multiplier.is_nan() || self.multiplier < 1.0 {
            return Err(ConfigError::InvalidValue {
                key: "consumer.poll_backoff.multiplier".to_string(),
                message: "must be at least 1.0".to_string(),
            });
        }

        if !(0.0..=1.0).contains(&self.randomization_factor) {
            return Err(ConfigError::InvalidValue {
                key: "consumer.poll_backoff.randomization_factor".to_string(),
                message: "must be between 0.0 and 1.0".to_string(),
            });
        }

        Ok(())
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            log_level: default_log_level(),
            log_format: LogFormat::default(),
        }
    }
}

impl Default for AwsConfig {
    fn default() -> Self {
        Self {
            region: default_region(),
            endpoint_url: None,
            force_path_style: false,
        }
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            max_messages: default_max_messages(),
            wait_time_secs: 0,
            visibility_timeout_secs: None,
        }
    }
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_interval_ms: default_initial_interval_ms(),
            max_interval_ms: default_max_interval_ms(),
            multiplier: default_multiplier(),
            randomization_factor: default_randomization_factor(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::{File, FileFormat};

    fn from_toml(toml: &str) -> Result<Config, ConfigError> {
        Config::from_builder(config::Config::builder().add_source(File::from_str(toml, FileFormat::Toml)))
    }

    #[test]
    fn test_default_values() {
        let config = from_toml(
            r#"
            [queue]
            url = "https://sqs.eu-central-1.amazonaws.com/123456789012/uploads"
            "#,
        )
        .unwrap();

        assert_eq!(config.service.name, "notify-consumer");
        assert_eq!(config.service.log_format, LogFormat::Json);
        assert_eq!(config.aws.region, "eu-central-1");
        assert_eq!(config.queue.max_messages, 10);
        assert_eq!(config.queue.wait_time_secs, 0);
        assert_eq!(config.consumer.on_decode_failure, DecodeFailurePolicy::Retain);
        assert_eq!(config.consumer.poll_backoff.initial_interval(), Duration::from_millis(200));
        assert_eq!(config.consumer.poll_backoff.max_interval(), Duration::from_secs(20));
    }

    #[test]
    fn test_overrides() {
        let config = from_toml(
            r#"
            [aws]
            region = "us-west-2"
            endpoint_url = "http://localhost:4566"
            force_path_style = true

            [queue]
            url = "http://localhost:4566/000000000000/uploads"
            max_messages = 5
            wait_time_secs = 20

            [consumer]
            on_decode_failure = "delete"
            "#,
        )
        .unwrap();

        assert_eq!(config.aws.region, "us-west-2");
        assert_eq!(config.aws.endpoint_url.as_deref(), Some("http://localhost:4566"));
        assert!(config.aws.force_path_style);
        assert_eq!(config.queue.max_messages, 5);
        assert_eq!(config.queue.wait_time_secs, 20);
        assert_eq!(config.consumer.on_decode_failure, DecodeFailurePolicy::Delete);
    }

    #[test]
    fn test_missing_queue_url() {
        let err = from_toml("").unwrap_err();
        assert!(matches!(err, ConfigError::MissingRequired(ref key) if key.starts_with("queue.url")));
    }

    #[test]
    fn test_batch_size_bounds() {
        for size in [0, 11] {
            let err = from_toml(&format!(
                "[queue]\nurl = \"http://q\"\nmax_messages = {size}\n"
            ))
            .unwrap_err();
            assert!(
                matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "queue.max_messages")
            );
        }
    }

    #[test]
    fn test_wait_time_bounds() {
        let err = from_toml("[queue]\nurl = \"http://q\"\nwait_time_secs = 21\n").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "queue.wait_time_secs"));
    }

    #[test]
    fn test_backoff_bounds() {
        let err = from_toml(
            r#"
            [queue]
            url = "http://q"

            [consumer.poll_backoff]
            initial_interval_ms = 5000
            max_interval_ms = 1000
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));

        for multiplier in ["nan", "0.5"] {
            let err = from_toml(&format!(
                "[queue]\nurl = \"http://q\"\n[consumer.poll_backoff]\nmultiplier = {multiplier}\n"
            ))
            .unwrap_err();
            assert!(
                matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "consumer.poll_backoff.multiplier")
            );
        }
    }

    #[test]
    fn test_negative_visibility_timeout() {
        let err = from_toml("[queue]\nurl = \"http://q\"\nvisibility_timeout_secs = -1\n").unwrap_err();
        assert!(
            matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "queue.visibility_timeout_secs")
        );

        let config = from_toml("[queue]\nurl = \"http://q\"\nvisibility_timeout_secs = 0\n").unwrap();
        assert_eq!(config.queue.visibility_timeout_secs, Some(0));
    }

    // Both cases share one test so the env mutations cannot interleave
    #[test]
    fn test_load_queue_url_from_environment() {
        std::env::remove_var("NOTIFY__QUEUE__URL");
        std::env::set_var(QUEUE_URL_ENV, "https://sqs.eu-central-1.amazonaws.com/123456789012/fallback");

        let config = Config::load().unwrap();
        assert_eq!(
            config.queue.url,
            "https://sqs.eu-central-1.amazonaws.com/123456789012/fallback"
        );

        std::env::set_var(
            "NOTIFY__QUEUE__URL",
            "https://sqs.eu-central-1.amazonaws.com/123456789012/preferred",
        );

        let config = Config::load().unwrap();
        assert_eq!(
            config.queue.url,
            "https://sqs.eu-central-1.amazonaws.com/123456789012/preferred"
        );

        std::env::remove_var("NOTIFY__QUEUE__URL");
        std::env::remove_var(QUEUE_URL_ENV);
    }
}
