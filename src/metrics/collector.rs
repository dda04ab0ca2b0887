// src/metrics/collector.rs
use super::recorder::{FailureReason, MetricsRecorder};
use anyhow::Result;
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

const DIAL_DURATION_BUCKETS: &[f64] = &[0.001, 0.002, 0.005, 0.01, 0.02, 0.05, 0.1, 0.2, 0.5];

pub struct MetricsRegistry {
    registry: Registry,
    collector: Arc<MetricsCollector>,
}

impl MetricsRegistry {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();
        let collector = Arc::new(MetricsCollector::new(&registry)?);

        Ok(Self {
            registry,
            collector,
        })
    }

    pub fn collector(&self) -> Arc<MetricsCollector> {
        self.collector.clone()
    }

    /// Render every registered metric in the Prometheus text format.
    pub fn gather(&self) -> Result<Vec<u8>> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(buffer)
    }
}

pub struct MetricsCollector {
    pub current_active_connections: IntGauge,
    pub total_connections_handled: IntCounter,
    pub total_connection_failures: IntCounterVec,
    pub connection_duration_seconds: Histogram,
    pub upstream_dial_duration_seconds: Histogram,
    pub bytes_transferred: IntCounter,
}

impl MetricsCollector {
    pub fn new(registry: &Registry) -> Result<Self> {
        let current_active_connections =
            IntGauge::new("current_active_connections", "Current Active Connections")?;
        registry.register(Box::new(current_active_connections.clone()))?;

        let total_connections_handled = IntCounter::new(
            "total_connections_handled",
            "Total Number of Connections Handled",
        )?;
        registry.register(Box::new(total_connections_handled.clone()))?;

        let total_connection_failures = IntCounterVec::new(
            Opts::new(
                "total_connection_failures",
                "Total Number of Connections Failures.",
            ),
            &["reason"],
        )?;
        registry.register(Box::new(total_connection_failures.clone()))?;

        let connection_duration_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "connection_duration_seconds",
                "Duration of connections in seconds.",
            )
            .buckets(prometheus::linear_buckets(0.1, 0.1, 20)?),
        )?;
        registry.register(Box::new(connection_duration_seconds.clone()))?;

        let upstream_dial_duration_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "upstream_dial_duration_seconds",
                "Time taken to dial upstream server",
            )
            .buckets(DIAL_DURATION_BUCKETS.to_vec()),
        )?;
        registry.register(Box::new(upstream_dial_duration_seconds.clone()))?;

        let bytes_transferred =
            IntCounter::new("bytes_transferred_total", "Total bytes transferred")?;
        registry.register(Box::new(bytes_transferred.clone()))?;

        Ok(Self {
            current_active_connections,
            total_connections_handled,
            total_connection_failures,
            connection_duration_seconds,
            upstream_dial_duration_seconds,
            bytes_transferred,
        })
    }

    pub fn failures(&self, reason: FailureReason) -> u64 {
        self.total_connection_failures
            .with_label_values(&[reason.as_str()])
            .get()
    }
}

impl MetricsRecorder for MetricsCollector {
    fn active_connections_inc(&self) {
        self.current_active_connections.inc();
    }

    fn active_connections_dec(&self) {
        self.current_active_connections.dec();
    }

    fn set_active_connections(&self, count: i64) {
        self.current_active_connections.set(count);
    }

    fn connection_handled(&self) {
        self.total_connections_handled.inc();
    }

    fn connection_failed(&self, reason: FailureReason) {
        self.total_connection_failures
            .with_label_values(&[reason.as_str()])
            .inc();
    }

    fn observe_connection_duration(&self, duration: Duration) {
        self.connection_duration_seconds
            .observe(duration.as_secs_f64());
    }

    fn observe_dial_duration(&self, duration: Duration) {
        self.upstream_dial_duration_seconds
            .observe(duration.as_secs_f64());
    }

    fn bytes_transferred(&self, bytes: u64) {
        self.bytes_transferred.inc_by(bytes);
    }
}

// Helper for timing operations (tokio clock)
pub struct Timer {
    start: Instant,
}

impl Timer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}
