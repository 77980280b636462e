use commonware_runtime::Metrics as RuntimeMetrics;
use prometheus_client::metrics::counter::Counter;

/// Metrics for the [Service](super::Service).
#[derive(Default)]
pub struct Metrics {
    /// Number of tests started
    pub runs: Counter,
    /// Number of requests rejected because a test was executing
    pub busy: Counter,
    /// Number of tests that finished with a failed status
    pub failed: Counter,
}

impl Metrics {
    /// Create and return a new set of metrics, registered with the given context.
    pub fn init<E: RuntimeMetrics>(context: E) -> Self {
        let metrics = Metrics::default();
        context.register("runs", "Number of tests started", metrics.runs.clone());
        context.register(
            "busy",
            "Number of requests rejected because a test was executing",
            metrics.busy.clone(),
        );
        context.register(
            "failed",
            "Number of tests that finished with a failed status",
            metrics.failed.clone(),
        );
        metrics
    }
}
