use commonware_runtime::Metrics as RuntimeMetrics;
use prometheus_client::metrics::{counter::Counter, gauge::Gauge};

/// Metrics for the [Notifier](super::Notifier).
#[derive(Default)]
pub struct Metrics {
    /// Number of active registrations
    pub registered: Gauge,
    /// Number of notifications enqueued
    pub published: Counter,
    /// Number of notifications delivered to listeners
    pub delivered: Counter,
    /// Number of notifications dropped because a listener queue was full
    pub dropped: Counter,
}

impl Metrics {
    /// Create and return a new set of metrics, registered with the given context.
    pub fn init<E: RuntimeMetrics>(context: E) -> Self {
        let metrics = Metrics::default();
        context.register(
            "registered",
            "Number of active registrations",
            metrics.registered.clone(),
        );
        context.register(
            "published",
            "Number of notifications enqueued",
            metrics.published.clone(),
        );
        context.register(
            "delivered",
            "Number of notifications delivered to listeners",
            metrics.delivered.clone(),
        );
        context.register(
            "dropped",
            "Number of notifications dropped because a listener queue was full",
            metrics.dropped.clone(),
        );
        metrics
    }
}
