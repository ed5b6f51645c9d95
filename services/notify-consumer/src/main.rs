use anyhow::{Context, Result};
use notify_consumer::aws::load_sdk_config;
use notify_consumer::config::LogFormat;
use notify_consumer::{Config, ConsumerSettings, NotificationConsumer, S3ObjectStore, SqsQueue};
use std::sync::Arc;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Config::load().context("Failed to load configuration")?;

    // Initialize logging
    init_tracing(&config.service.log_level, config.service.log_format);

    info!(
        service = %config.service.name,
        version = env!("CARGO_PKG_VERSION"),
        queue_url = %config.queue.url,
        "Starting Nier Notify Consumer"
    );

    // Clients are built once and reused for every iteration
    let sdk_config = load_sdk_config(&config.aws).await;
    let queue = Arc::new(SqsQueue::new(&sdk_config, &config.aws, &config.queue));
    let store = Arc::new(S3ObjectStore::new(&sdk_config, &config.aws));

    let mut consumer = NotificationConsumer::new(queue, store, ConsumerSettings::from(&config));

    tokio::select! {
        _ = consumer.run() => {}
        _ = shutdown_signal() => {}
    }

    info!("Notify consumer stopped");

    Ok(())
}

/// Initialize tracing/logging
fn init_tracing(log_level: &str, format: LogFormat) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level));

    let registry = tracing_subscriber::registry().with(env_filter);

    match format {
        LogFormat::Json => registry.with(fmt::layer().json()).init(),
        LogFormat::Pretty => registry.with(fmt::layer().pretty()).init(),
    }
}

/// Wait for shutdown signal (SIGINT or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            info!("Received SIGTERM signal");
        }
    }
}
