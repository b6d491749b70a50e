//! Prometheus metrics definitions for meterd
//!
//! All metrics use the `meterd_` prefix and are read-only.

use prometheus::{
    CounterVec, Gauge, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder,
    core::{AtomicF64, GenericGauge},
};
use std::sync::Arc;

/// Prometheus metrics for the metering reporter
#[derive(Clone)]
pub struct Metrics {
    registry: Arc<Registry>,
    /// Metering calls by dimension and outcome
    pub reports_total: CounterVec,
    /// Current health classification (0=normal, 1=warning, 2=stop, 3=init)
    pub health_class: GenericGauge<AtomicF64>,
    /// Number of unresolved delivery error details
    pub outstanding_errors: GenericGauge<AtomicF64>,
    /// Metering call latency in seconds
    pub send_latency_seconds: HistogramVec,
}

impl Metrics {
    /// Create a new Metrics instance with all gauges and counters registered
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let reports_total = CounterVec::new(
            Opts::new(
                "meterd_reports_total",
                "Metering calls by dimension and outcome",
            ),
            &["dimension", "status"],
        )?;
        registry.register(Box::new(reports_total.clone()))?;

        let health_class = Gauge::with_opts(Opts::new(
            "meterd_health_class",
            "Current health classification (0=normal, 1=warning, 2=stop, 3=init)",
        ))?;
        registry.register(Box::new(health_class.clone()))?;

        let outstanding_errors = Gauge::with_opts(Opts::new(
            "meterd_outstanding_errors",
            "Number of unresolved delivery error details",
        ))?;
        registry.register(Box::new(outstanding_errors.clone()))?;

        let send_latency_seconds = HistogramVec::new(
            HistogramOpts::new(
                "meterd_send_latency_seconds",
                "Metering call latency in seconds",
            )
            .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
            &["dimension"],
        )?;
        registry.register(Box::new(send_latency_seconds.clone()))?;

        Ok(Self {
            registry: Arc::new(registry),
            reports_total,
            health_class,
            outstanding_errors,
            send_latency_seconds,
        })
    }

    /// Render all metrics in Prometheus text format
    pub fn render(&self) -> String {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        encoder
            .encode_to_string(&metric_families)
            .unwrap_or_default()
    }

    /// Increment the report counter for a dimension
    pub fn inc_reports(&self, dimension: &str, status: &str) {
        self.reports_total
            .with_label_values(&[dimension, status])
            .inc();
    }

    /// Observe the latency of one metering call
    pub fn observe_send_latency(&self, dimension: &str, latency: f64) {
        self.send_latency_seconds
            .with_label_values(&[dimension])
            .observe(latency);
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new().expect("Failed to create default Metrics")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_creation() {
        let metrics = Metrics::new().expect("Failed to create metrics");
        metrics.health_class.set(0.0);
        assert!(metrics.render().contains("meterd_"));
    }

    #[test]
    fn test_report_counter() {
        let metrics = Metrics::new().expect("Failed to create metrics");
        metrics.inc_reports("unique-hosts", "ok");
        metrics.inc_reports("unique-hosts", "failed");

        let output = metrics.render();
        assert!(output.contains("meterd_reports_total"));
        assert!(output.contains("unique-hosts"));
    }

    #[test]
    fn test_send_latency_histogram() {
        let metrics = Metrics::new().expect("Failed to create metrics");
        metrics.observe_send_latency("unique-hosts", 0.2);

        assert!(metrics.render().contains("meterd_send_latency_seconds"));
    }
}
