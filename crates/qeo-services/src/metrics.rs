//! Observability port for the what-if evaluator
//!
//! The host decides where trial latency and filter counts go. Library code
//! only ever talks to [`AdvisorMetrics`].

use std::time::Duration;

pub trait AdvisorMetrics: Send + Sync {
    /// Latency of one hypothetical-index EXPLAIN
    fn observe_whatif_trial(&self, elapsed: Duration);

    /// Suggestions dropped by the minimum cost reduction filter
    fn count_whatif_filtered(&self, count: usize);
}

/// Emits metric events as structured `tracing` records
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingMetrics;

impl AdvisorMetrics for TracingMetrics {
    fn observe_whatif_trial(&self, elapsed: Duration) {
        tracing::debug!(
            target: "qeo::metrics",
            metric = "whatif_trial_seconds",
            seconds = elapsed.as_secs_f64(),
        );
    }

    fn count_whatif_filtered(&self, count: usize) {
        tracing::debug!(
            target: "qeo::metrics",
            metric = "whatif_filtered_total",
            count = count,
        );
    }
}

/// Discards every observation
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMetrics;

impl AdvisorMetrics for NoopMetrics {
    fn observe_whatif_trial(&self, _elapsed: Duration) {}

    fn count_whatif_filtered(&self, _count: usize) {}
}
