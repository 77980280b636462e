use super::{State, StateCell, Transaction};
use crate::{
    shard::{Router, Shard, ShardId},
    tree::Snapshot,
};
use parking_lot::Mutex;
use std::{
    collections::BTreeMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

/// Speculative result of the last submitted transaction of a chain on one shard.
struct Pending {
    snapshot: Arc<Snapshot>,
    state: Arc<StateCell>,
}

/// A sequence of transactions that commit in the order they are submitted.
///
/// Each transaction begun from a chain reads the speculative result of the chain's previous
/// transaction on the same shard while that transaction is still in flight.
#[derive(Clone)]
pub struct Chain {
    router: Arc<Router>,
    ids: Arc<AtomicU64>,
    pending: Arc<Mutex<BTreeMap<ShardId, Pending>>>,
}

impl Chain {
    pub(crate) fn new(router: Arc<Router>, ids: Arc<AtomicU64>) -> Self {
        Self {
            router,
            ids,
            pending: Arc::new(Mutex::new(BTreeMap::new())),
        }
    }

    /// Begin a new chained transaction.
    pub fn begin(&self) -> Transaction {
        let id = self.ids.fetch_add(1, Ordering::Relaxed);
        Transaction::new(id, self.router.clone(), Some(self.clone()))
    }

    /// Snapshot a new transaction on `shard` should build on.
    pub(super) fn base(&self, shard: &Shard) -> Arc<Snapshot> {
        let pending = self.pending.lock();
        match pending.get(&shard.id()) {
            Some(last) if last.state.get() == State::Submitted => last.snapshot.clone(),
            _ => shard.current(),
        }
    }

    /// Record the speculative result of a transaction that is about to be submitted.
    pub(super) fn record(&self, shard: ShardId, snapshot: Arc<Snapshot>, state: Arc<StateCell>) {
        self.pending
            .lock()
            .insert(shard, Pending { snapshot, state });
    }
}
