//! Periodic usage reporting against a marketplace metering sink.
//!
//! One background task drives the loop; it is the sole mutator of the
//! failure state. External callers only read snapshots.

use crate::application::metering::failure_state::{
    FailureState, FailureStateSnapshot, HealthClass, dimension_marker,
};
use crate::domain::errors::SinkError;
use crate::domain::ports::{DimensionSource, MeteringSink, SinkResponse};
use crate::domain::types::{Consumption, Dimension};
use crate::infrastructure::observability::Metrics;
use anyhow::{Context, Result};
use chrono::{DateTime, TimeZone, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::{RwLock, watch};
use tracing::{error, info, warn};

/// Read-only snapshot combining pending consumption and failure state,
/// for health-check and introspection callers.
#[derive(Debug, Serialize)]
pub struct StatusReport {
    pub version: String,
    pub consumption: Consumption,
    pub state: FailureStateSnapshot,
}

/// Drives the reporting cycle: fetch dimensions, send each through the
/// sink, track delivery failures, classify health.
pub struct UsageReporter {
    source: Arc<dyn DimensionSource>,
    sink: Arc<dyn MeteringSink>,
    state: RwLock<FailureState>,
    initializing: AtomicBool,
    send_interval: Duration,
    max_send_stop: u64,
    metrics: Metrics,
}

impl UsageReporter {
    pub fn new(
        source: Arc<dyn DimensionSource>,
        sink: Arc<dyn MeteringSink>,
        max_send_stop: u64,
        max_send_warning: u64,
        send_interval_secs: u64,
        metrics: Metrics,
    ) -> Self {
        Self {
            source,
            sink,
            state: RwLock::new(FailureState::new(
                max_send_stop,
                max_send_warning,
                send_interval_secs,
            )),
            initializing: AtomicBool::new(true),
            send_interval: Duration::from_secs(send_interval_secs),
            max_send_stop,
            metrics,
        }
    }

    /// Startup check: dry-runs every current dimension through the sink.
    /// Any failure is terminal - the state becomes `init` and the
    /// reporting loop will refuse to start.
    pub async fn check_connectivity(&self) -> bool {
        match self.report_cycle(true).await {
            Ok(_) => {
                info!("UsageReporter: connectivity check passed");
                true
            }
            Err(e) => {
                error!("UsageReporter: connectivity check failed: {e:#}");
                let mut state = self.state.write().await;
                state.fail_init(format!("{e:#}"));
                self.metrics
                    .health_class
                    .set(HealthClass::Init.to_metric_value());
                false
            }
        }
    }

    /// One reporting pass over the current dimensions.
    ///
    /// Dry runs send every dimension regardless of quantity and
    /// propagate the first failure to the caller. Real runs suppress a
    /// zero quantity while still initializing (a zero-quantity first
    /// report locks the dimension's reportable window for a full
    /// interval downstream), record per-dimension failures without
    /// aborting the pass, and clear recorded errors for a dimension
    /// once it reports successfully.
    pub async fn report_cycle(&self, dry_run: bool) -> Result<Vec<SinkResponse>> {
        info!("UsageReporter: reporting cycle (dry_run={dry_run})");
        let dimensions = self
            .source
            .list_dimensions()
            .await
            .context("Failed to fetch dimensions")?;

        let mut responses = Vec::new();
        for dimension in &dimensions {
            if dry_run {
                responses.push(self.send_dry_run(dimension).await?);
                continue;
            }

            if self.initializing.load(Ordering::SeqCst) && dimension.quantity == 0 {
                info!(
                    "UsageReporter: skipping first report for {} (quantity is 0)",
                    dimension.name
                );
            } else if let Some(response) = self.send_recorded(dimension).await {
                responses.push(response);
            }

            if self.initializing.swap(false, Ordering::SeqCst) {
                info!("UsageReporter: first reporting cycle underway");
            }
        }
        Ok(responses)
    }

    /// Re-derives the health classification from the newest measurement
    /// currently visible. An empty source leaves health unchanged.
    pub async fn update_health(&self) {
        let dimensions = match self.source.list_dimensions().await {
            Ok(dimensions) => dimensions,
            Err(e) => {
                warn!("UsageReporter: health update could not fetch dimensions: {e:#}");
                return;
            }
        };
        let Some(latest) = dimensions.iter().map(|d| d.timestamp).max() else {
            return;
        };

        let mut state = self.state.write().await;
        state.update_classification(latest);
        self.metrics
            .health_class
            .set(state.class().to_metric_value());
        self.metrics
            .outstanding_errors
            .set(state.detail_count() as f64);
    }

    /// Steady-state reporting loop: one cycle per interval, forever.
    ///
    /// Never starts when the startup check left the state terminal. The
    /// interval sleep is the only suspension point; the shutdown signal
    /// is observed there.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        if self.state.read().await.class() == HealthClass::Init {
            error!("UsageReporter: startup check failed, reporting loop will not start");
            return;
        }
        info!(
            "UsageReporter: starting reporting loop (interval: {:?})",
            self.send_interval
        );

        loop {
            if let Err(e) = self.report_cycle(false).await {
                warn!("UsageReporter: reporting cycle failed: {e:#}");
                self.state.write().await.record_error(format!("{e:#}"));
            }
            self.update_health().await;

            if self.state.read().await.class() == HealthClass::Stop {
                let message = format!(
                    "The usage couldn't be sent after {} tries. Please check that your product has a way to reach the internet.",
                    self.max_send_stop
                );
                error!("UsageReporter: {message}");
                self.state.write().await.record_error(message);
            }

            info!("UsageReporter: going to sleep");
            tokio::select! {
                _ = tokio::time::sleep(self.send_interval) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("UsageReporter: shutdown requested, stopping reporting loop");
                        return;
                    }
                }
            }
        }
    }

    /// Read-only snapshot of version, pending consumption and failure
    /// state. Mutates nothing.
    pub async fn status(&self) -> Result<StatusReport> {
        let dimensions = self
            .source
            .list_dimensions()
            .await
            .context("Failed to fetch dimensions")?;
        let state = self.state.read().await.snapshot();

        Ok(StatusReport {
            version: env!("CARGO_PKG_VERSION").to_string(),
            consumption: Consumption { dimensions },
            state,
        })
    }

    pub async fn health_class(&self) -> HealthClass {
        self.state.read().await.class()
    }

    pub async fn failure_snapshot(&self) -> FailureStateSnapshot {
        self.state.read().await.snapshot()
    }

    pub fn is_initializing(&self) -> bool {
        self.initializing.load(Ordering::SeqCst)
    }

    async fn send_dry_run(&self, dimension: &Dimension) -> Result<SinkResponse> {
        let response = self
            .sink
            .send(
                &dimension.name,
                dimension.quantity,
                measured_at(dimension),
                true,
            )
            .await
            .with_context(|| {
                format!(
                    "Dry-run metering call failed ({})",
                    dimension_marker(&dimension.name)
                )
            })?;
        Ok(response)
    }

    async fn send_recorded(&self, dimension: &Dimension) -> Option<SinkResponse> {
        let started = Instant::now();
        let result = self
            .sink
            .send(
                &dimension.name,
                dimension.quantity,
                measured_at(dimension),
                false,
            )
            .await;
        self.metrics
            .observe_send_latency(&dimension.name, started.elapsed().as_secs_f64());

        match result {
            Ok(response) => {
                self.metrics.inc_reports(&dimension.name, "ok");
                let mut state = self.state.write().await;
                state.discard_dimension_errors(&dimension.name);
                Some(response)
            }
            Err(err) => {
                self.metrics.inc_reports(&dimension.name, "failed");
                warn!(
                    "UsageReporter: send failed for {}: {}",
                    dimension.name, err
                );
                let marker = dimension_marker(&dimension.name);
                let mut state = self.state.write().await;
                match err {
                    SinkError::Service { code, message } => {
                        state.record_sink_error(&code, &format!("{message} ({marker})"));
                    }
                    other => {
                        state.record_error(format!("{other} ({marker})"));
                    }
                }
                None
            }
        }
    }
}

fn measured_at(dimension: &Dimension) -> DateTime<Utc> {
    Utc.timestamp_opt(dimension.timestamp, 0)
        .single()
        .unwrap_or_else(Utc::now)
}
