use commonware_runtime::Metrics as RuntimeMetrics;
use prometheus_client::metrics::{counter::Counter, gauge::Gauge};

/// Metrics for the [Sequencer](super::Sequencer).
#[derive(Default)]
pub struct Metrics {
    /// Number of committed transactions
    pub committed: Counter,
    /// Number of independent transactions rejected by the optimistic lock check
    pub conflicts: Counter,
    /// Number of transactions that failed for any other reason
    pub failed: Counter,
    /// Number of changes produced by committed transactions
    pub changes: Counter,
    /// Version of the current snapshot
    pub version: Gauge,
}

impl Metrics {
    /// Create and return a new set of metrics, registered with the given context.
    pub fn init<E: RuntimeMetrics>(context: E) -> Self {
        let metrics = Metrics::default();
        context.register(
            "committed",
            "Number of committed transactions",
            metrics.committed.clone(),
        );
        context.register(
            "conflicts",
            "Number of independent transactions rejected by the optimistic lock check",
            metrics.conflicts.clone(),
        );
        context.register(
            "failed",
            "Number of transactions that failed for any other reason",
            metrics.failed.clone(),
        );
        context.register(
            "changes",
            "Number of changes produced by committed transactions",
            metrics.changes.clone(),
        );
        context.register(
            "version",
            "Version of the current snapshot",
            metrics.version.clone(),
        );
        metrics
    }
}
