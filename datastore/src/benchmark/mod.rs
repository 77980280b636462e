//! Drive load against a [Datastore] and report commit and notification throughput.
//!
//! # Overview
//!
//! [Service] exposes the benchmark operations a load generator calls:
//!
//! - [Service::start_test] writes, merges, deletes or reads a two-level list under `/test-exec`
//!   in the config store, the operational store or both, using either independent transactions
//!   awaited one at a time (`SIMPLE-TX`) or a pipelined transaction chain (`TX-CHAINING`).
//! - [Service::shard_test] creates a fresh store with the requested number of shards and writes
//!   items to every shard either from a single producer in round-robin order or from one producer
//!   per shard.
//! - [Service::cleanup_store] clears the test data.
//! - [Service::test_status] reports whether a test is running and how many have completed.
//!
//! Only one test runs at a time. A request that arrives while another test is executing returns
//! [Status::TestInProgress] immediately instead of queuing. Transaction failures never surface as
//! errors: they are counted in `tx_error`.

use crate::{
    tree::{Node, Path},
    Config as StoreConfig, Datastore, Error,
};
use commonware_runtime::{Clock, Metrics, Spawner};
use std::{
    num::NonZeroUsize,
    sync::{atomic::AtomicU64, Arc},
    time::{Duration, SystemTime},
};
use tracing::warn;

mod batch;
pub use batch::{Batcher, Tally};
mod dsbench;
mod guard;
pub use guard::{Run, RunGuard};
mod listener;
pub use listener::Counter;
mod metrics;
mod sharding;
mod types;
pub use types::{
    DataStore, ExecState, Operation, ParseError, ShardTestInput, ShardTestOutput, ShardTestType,
    StartTestInput, StartTestOutput, Status, TestStatus, TransactionType,
};

/// Top-level segment holding the data written by [Service::start_test].
pub const TEST_ROOT: &str = "test-exec";

/// Configuration for the [Service].
#[derive(Clone, Debug)]
pub struct Config {
    /// The maximum number of transactions queued on each shard's sequencer.
    pub mailbox_size: usize,

    /// The maximum number of notifications queued per listener before new ones are dropped.
    pub listener_queue_size: usize,
}

/// Benchmark operations over a config and an operational store.
pub struct Service<E: Spawner + Metrics + Clock> {
    context: E,
    cfg: Config,

    config: Datastore<E>,
    operational: Datastore<E>,

    guard: RunGuard,
    /// Number of shard tests started (used to label their stores).
    shard_runs: Arc<AtomicU64>,
    metrics: Arc<metrics::Metrics>,
}

impl<E: Spawner + Metrics + Clock> Clone for Service<E> {
    fn clone(&self) -> Self {
        Self {
            context: self.context.clone(),
            cfg: self.cfg.clone(),
            config: self.config.clone(),
            operational: self.operational.clone(),
            guard: self.guard.clone(),
            shard_runs: self.shard_runs.clone(),
            metrics: self.metrics.clone(),
        }
    }
}

impl<E: Spawner + Metrics + Clock> Service<E> {
    /// Create the config and operational stores (one shard each).
    pub fn new(context: E, cfg: Config) -> Result<Self, Error> {
        let store_config = StoreConfig {
            shards: NonZeroUsize::MIN,
            namespace: vec![TEST_ROOT.to_string()],
            mailbox_size: cfg.mailbox_size,
            listener_queue_size: cfg.listener_queue_size,
        };
        let config = Datastore::init(context.with_label("config"), store_config.clone())?;
        let operational = Datastore::init(context.with_label("operational"), store_config)?;
        let metrics = Arc::new(metrics::Metrics::init(context.with_label("benchmark")));
        Ok(Self {
            context,
            cfg,
            config,
            operational,
            guard: RunGuard::default(),
            shard_runs: Arc::new(AtomicU64::new(0)),
            metrics,
        })
    }

    /// The stores targeted by `data_store`.
    pub fn stores(&self, data_store: DataStore) -> Vec<Datastore<E>> {
        match data_store {
            DataStore::Config => vec![self.config.clone()],
            DataStore::Operational => vec![self.operational.clone()],
            DataStore::Both => vec![self.config.clone(), self.operational.clone()],
        }
    }

    /// Whether a test is running and how many have completed.
    pub fn test_status(&self) -> TestStatus {
        self.guard.status()
    }

    /// Remove all test data from both stores.
    ///
    /// Fails with [Status::TestInProgress] while a test is executing.
    pub async fn cleanup_store(&self) -> Status {
        let Some(_run) = self.guard.try_acquire() else {
            self.metrics.busy.inc();
            return Status::TestInProgress;
        };
        for store in self.stores(DataStore::Both) {
            if let Err(err) = reset(&store).await {
                warn!(?err, "failed to clean up store");
                return Status::Failed;
            }
        }
        Status::Ok
    }

    /// Time elapsed since `start` on the runtime clock.
    fn elapsed(&self, start: SystemTime) -> Duration {
        self.context
            .current()
            .duration_since(start)
            .unwrap_or_default()
    }
}

/// Replace the test subtree of `store` with an empty container.
async fn reset<E: Spawner + Metrics>(store: &Datastore<E>) -> Result<(), Error> {
    let mut tx = store.begin();
    tx.put(Path::root().child(TEST_ROOT), Node::container())?;
    tx.submit().await?.await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use commonware_macros::test_traced;
    use commonware_runtime::{deterministic, Runner};

    pub(super) fn service<E: Spawner + Metrics + Clock>(context: E) -> Service<E> {
        Service::new(
            context,
            Config {
                mailbox_size: 1024,
                listener_queue_size: 1024,
            },
        )
        .unwrap()
    }

    #[test_traced]
    fn test_cleanup_store() {
        let executor = deterministic::Runner::default();
        executor.start(|context| async move {
            let service = service(context);
            let stale = Path::parse("/test-exec/outer-list[0]").unwrap();
            for store in service.stores(DataStore::Both) {
                let mut tx = store.begin();
                tx.put(stale.clone(), 1).unwrap();
                tx.submit().await.unwrap().await.unwrap();
            }

            assert_eq!(service.cleanup_store().await, Status::Ok);
            for store in service.stores(DataStore::Both) {
                assert!(store.read(&stale).unwrap().is_none());
                let root = store.read(&Path::root().child(TEST_ROOT)).unwrap().unwrap();
                assert!(root.is_container());
            }

            // Cleaning up is not a test
            assert_eq!(service.test_status().tests_completed, 0);
        });
    }

    #[test_traced]
    fn test_cleanup_rejected_while_running() {
        let executor = deterministic::Runner::default();
        executor.start(|context| async move {
            let service = service(context);
            let run = service.guard.try_acquire().unwrap();
            assert_eq!(service.test_status().state, ExecState::Executing);
            assert_eq!(service.cleanup_store().await, Status::TestInProgress);
            drop(run);
            assert_eq!(service.cleanup_store().await, Status::Ok);
        });
    }
}
