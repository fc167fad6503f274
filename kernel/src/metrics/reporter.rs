//! Metrics reporter trait and implementations.

use tracing::info;

use super::MetricEvent;

/// Receives metric events as file lists open snapshots and discover files.
pub trait MetricsReporter: Send + Sync + std::fmt::Debug {
    /// Report a metric event.
    fn report(&self, event: MetricEvent);
}

/// Forwards every event to `tracing` at info level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl MetricsReporter for TracingReporter {
    fn report(&self, event: MetricEvent) {
        info!(target: "delta_scan_kernel::metrics", "{event}");
    }
}
