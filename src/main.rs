use meterd::application::metering::UsageReporter;
use meterd::config::{Config, Mode};
use meterd::domain::ports::{DimensionSource, MeteringSink};
use meterd::infrastructure::marketplace::MarketplaceMeteringClient;
use meterd::infrastructure::mock::{MockMeteringSink, StaticDimensionSource};
use meterd::infrastructure::observability::Metrics;
use meterd::infrastructure::usage::UniqueHostLedger;
use anyhow::Context;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{Level, error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env before anything reads the environment
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .with_target(false)
        .init();

    info!("Initializing meterd...");

    let config = Config::from_env().context("Failed to load config")?;
    let metrics = Metrics::new().context("Failed to create metrics")?;

    let (source, sink): (Arc<dyn DimensionSource>, Arc<dyn MeteringSink>) = match config.mode {
        Mode::Mock => {
            info!("Running in mock mode; nothing will be billed");
            (
                Arc::new(StaticDimensionSource::new(
                    config.usage_dimension.clone(),
                    10,
                )),
                Arc::new(MockMeteringSink::new()),
            )
        }
        Mode::Marketplace => (
            Arc::new(UniqueHostLedger::new(config.usage_dimension.clone())),
            Arc::new(MarketplaceMeteringClient::new(
                config.region.clone(),
                config.product_code.clone(),
                config.aws_access_key_id.clone(),
                config.aws_secret_access_key.clone(),
                config.aws_session_token.clone(),
                config.metering_endpoint.clone(),
            )),
        ),
    };

    let reporter = Arc::new(UsageReporter::new(
        source,
        sink,
        config.max_send_stop,
        config.max_send_warning,
        config.send_interval_seconds,
        metrics,
    ));

    // Terminal on failure; run() below refuses to loop and the process
    // stays alive to surface the init state to status readers.
    reporter.check_connectivity().await;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let loop_reporter = reporter.clone();
    let loop_handle = tokio::spawn(async move { loop_reporter.run(shutdown_rx).await });

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    info!("Shutdown signal received");
    let _ = shutdown_tx.send(true);
    let _ = loop_handle.await;

    match reporter.status().await {
        Ok(status) => match serde_json::to_string(&status) {
            Ok(json) => info!("Final status: {json}"),
            Err(e) => error!("Failed to serialize final status: {e}"),
        },
        Err(e) => error!("Failed to collect final status: {e:#}"),
    }

    info!("Graceful shutdown complete. Goodbye!");
    Ok(())
}
